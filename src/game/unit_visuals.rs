//! Unit presentation: spawn-time visual setup and the interpolated transform
//! sync. Reads only the prev/curr pose snapshots; there is no back-channel
//! from rendering into simulation state.

use bevy::prelude::*;

use crate::game::simulation::{
    SelectedUnit, SimHeading, SimHeadingPrev, SimPosition, SimPositionPrev, UnitId,
};
use crate::game::GameState;

#[derive(Resource)]
pub struct UnitVisualAssets {
    pub body: Handle<Mesh>,
    pub normal: Handle<StandardMaterial>,
    pub selected: Handle<StandardMaterial>,
}

fn setup_unit_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.insert_resource(UnitVisualAssets {
        body: meshes.add(Capsule3d::new(0.35, 0.7)),
        normal: materials.add(Color::srgb(0.75, 0.65, 0.35)),
        selected: materials.add(Color::srgb(0.95, 0.85, 0.3)),
    });
}

/// Attach meshes to freshly spawned units. Not a hot path.
fn spawn_unit_visuals(
    mut commands: Commands,
    query: Query<(Entity, &SimPosition, &SimHeading), Added<UnitId>>,
    assets: Option<Res<UnitVisualAssets>>,
) {
    let Some(assets) = assets else { return };
    for (entity, pos, heading) in query.iter() {
        commands.entity(entity).insert((
            Mesh3d(assets.body.clone()),
            MeshMaterial3d(assets.normal.clone()),
            Transform::from_translation(pos.0).with_rotation(heading.0),
        ));
    }
}

/// Blend the render pose between the tick snapshots. The fixed-update
/// overstep fraction is the interpolation alpha.
fn sync_visuals(
    fixed_time: Res<Time<Fixed>>,
    mut query: Query<(
        &mut Transform,
        &SimPosition,
        &SimPositionPrev,
        &SimHeading,
        &SimHeadingPrev,
    )>,
) {
    let alpha = fixed_time.overstep_fraction();
    for (mut transform, pos, prev_pos, heading, prev_heading) in query.iter_mut() {
        transform.translation = prev_pos.0.lerp(pos.0, alpha);
        transform.rotation = prev_heading.0.slerp(heading.0, alpha);
    }
}

/// Highlight the locally selected unit.
fn update_selection_visuals(
    selected: Res<SelectedUnit>,
    assets: Option<Res<UnitVisualAssets>>,
    mut query: Query<(&UnitId, &mut MeshMaterial3d<StandardMaterial>)>,
) {
    if !selected.is_changed() {
        return;
    }
    let Some(assets) = assets else { return };
    for (id, mut material) in query.iter_mut() {
        material.0 = if selected.0 == Some(id.0) {
            assets.selected.clone()
        } else {
            assets.normal.clone()
        };
    }
}

pub struct UnitVisualsPlugin;

impl Plugin for UnitVisualsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_unit_assets).add_systems(
            Update,
            (spawn_unit_visuals, sync_visuals, update_selection_visuals)
                .run_if(in_state(GameState::InGame)),
        );
    }
}
