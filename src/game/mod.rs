use bevy::prelude::*;

pub mod config;
pub mod interact;
pub mod path;
pub mod rng;
pub mod rocks;
pub mod seat;
pub mod simulation;
pub mod sphere;
pub mod terrain;
pub mod unit_visuals;

use config::GameConfigPlugin;
use interact::InteractionPlugin;
use seat::SeatPlugin;
use simulation::SimulationPlugin;
use unit_visuals::UnitVisualsPlugin;

/// Marker component for entities belonging to the running session.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct GameEntity;

/// Top-level application state. Simulation systems are intentionally not
/// gated on this so headless tests can drive `FixedUpdate` directly;
/// presentation systems run only in `InGame`.
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    #[default]
    InGame,
    Menu,
}

pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            .add_plugins((
                GameConfigPlugin,
                SimulationPlugin,
                SeatPlugin,
                InteractionPlugin,
                UnitVisualsPlugin,
            ))
            .add_systems(Startup, setup_scene);
    }
}

/// Static presentation scaffolding: light and an overview camera. The planet
/// surface itself is drawn by the external terrain renderer; a plain sphere
/// stands in for it here.
fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    info!("Scene setup started");

    commands.spawn((
        Mesh3d(meshes.add(Sphere::new(10.0).mesh().uv(64, 48))),
        MeshMaterial3d(materials.add(Color::srgb(0.35, 0.45, 0.3))),
    ));

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 12_000.0,
            ..default()
        },
        Transform::from_xyz(20.0, 30.0, 20.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 8.0, 28.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}
