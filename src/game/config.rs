use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use serde::Deserialize;

/// User-facing configuration, loaded from `assets/game_config.ron`.
///
/// Values here are presentation-layer knobs plus the initial values copied
/// once into the deterministic simulation configuration at session start.
/// Hot-reloading the file affects presentation only; simulation parameters
/// are frozen when the session begins.
#[derive(Deserialize, Asset, TypePath, Clone, Debug)]
pub struct GameConfig {
    pub tick_rate: f64,
    pub session_seed: u64,

    // World generation
    pub terrain_seed: u32,
    pub base_radius: f32,
    pub terrain_amplitude: f32,
    pub terrain_frequency: f64,
    pub terrain_octaves: u8,
    pub water_level: f32,
    pub rock_count: usize,
    pub rock_min_radius: f32,
    pub rock_max_radius: f32,

    // Units
    pub unit_speed: f32,
    pub ground_offset: f32,
    pub turn_rate: f32,

    // Controls
    pub key_forward: KeyCode,
    pub key_backward: KeyCode,
    pub key_left: KeyCode,
    pub key_right: KeyCode,
    pub key_play: KeyCode,
    pub key_pause: KeyCode,

    // Interaction
    pub drag_threshold_px: f32,
    pub click_radius: f32,
    pub toast_seconds: f32,
}

#[derive(Resource)]
pub struct GameConfigHandle(pub Handle<GameConfig>);

/// Startup configuration for the deterministic session.
///
/// This is the single conversion point between the user-facing config layer
/// and the simulation layer: it may be pre-inserted (tests, CLI, network
/// match setup) and then wins over the defaults. All values that influence
/// simulation outcomes live here; changing them mid-session desyncs peers.
#[derive(Resource, Clone, Debug)]
pub struct InitialConfig {
    pub tick_rate: f64,
    pub session_seed: u64,
    pub terrain_seed: u32,
    pub base_radius: f32,
    pub terrain_amplitude: f32,
    pub terrain_frequency: f64,
    pub terrain_octaves: u8,
    pub water_level: f32,
    pub rock_count: usize,
    pub rock_min_radius: f32,
    pub rock_max_radius: f32,
    pub unit_speed: f32,
    pub ground_offset: f32,
    pub turn_rate: f32,
}

impl Default for InitialConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            session_seed: 0x6D65_7269_6469_616E,
            terrain_seed: 1337,
            base_radius: 100.0,
            terrain_amplitude: 4.0,
            terrain_frequency: 2.4,
            terrain_octaves: 4,
            water_level: -0.8,
            rock_count: 120,
            rock_min_radius: 1.0,
            rock_max_radius: 3.0,
            unit_speed: 5.0,
            ground_offset: 0.5,
            turn_rate: 2.2,
        }
    }
}

impl InitialConfig {
    /// Session values from the loaded RON asset.
    pub fn from_game_config(config: &GameConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            session_seed: config.session_seed,
            terrain_seed: config.terrain_seed,
            base_radius: config.base_radius,
            terrain_amplitude: config.terrain_amplitude,
            terrain_frequency: config.terrain_frequency,
            terrain_octaves: config.terrain_octaves,
            water_level: config.water_level,
            rock_count: config.rock_count,
            rock_min_radius: config.rock_min_radius,
            rock_max_radius: config.rock_max_radius,
            unit_speed: config.unit_speed,
            ground_offset: config.ground_offset,
            turn_rate: config.turn_rate,
        }
    }
}

pub struct GameConfigPlugin;

impl Plugin for GameConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<GameConfig>::new(&["game_config.ron"]))
            .add_systems(Startup, setup_config);
    }
}

fn setup_config(mut commands: Commands, asset_server: Res<AssetServer>) {
    let handle = asset_server.load("game_config.ron");
    commands.insert_resource(GameConfigHandle(handle));
}
