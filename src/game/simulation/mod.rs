/// Simulation layer - deterministic game logic.
///
/// This module is organized into:
/// - **components**: Per-unit authoritative state (pose, motion, navigation,
///   sub-state machines)
/// - **resources**: Tick counter, configuration, id allocation, input routing
/// - **commands**: The canonical command queue and its deterministic drain
/// - **steering**: Path following, look-ahead, arrival crossings, replans
/// - **movement**: Slope response, bounce carry, manual drive, move commits
/// - **water**: The water sub-state machine
/// - **systems**: Tick driver and pose snapshotting

use bevy::prelude::*;

pub mod commands;
pub mod components;
pub mod resources;

mod movement;
mod steering;
mod systems;
mod water;

pub use commands::{Command, CommandKind, CommandQueue, CommandRejected, RejectReason, WireCommand, WireOp};
pub use components::*;
pub use resources::*;

pub use systems::init_sim_config_from_initial;

/// System sets ordering one fixed-update tick: the command drain is a
/// synchronous prelude to the unit updates.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum SimSet {
    /// Snapshot poses, arbitrate seats, drain the command queue.
    Commands,
    /// Advance every unit in stable id order.
    UnitTick,
}

/// Main simulation plugin.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // Fixed 20 Hz timestep; re-asserted at startup from InitialConfig.
        app.insert_resource(Time::<Fixed>::from_seconds(1.0 / 20.0));

        app.init_resource::<SimTick>();
        app.init_resource::<SimConfig>();
        app.init_resource::<CommandQueue>();
        app.init_resource::<UnitIdCounter>();
        app.init_resource::<UnitIndex>();
        app.init_resource::<SelectedUnit>();
        app.init_resource::<HoveredUnit>();
        app.init_resource::<DriveInputs>();

        app.add_message::<CommandRejected>();

        app.configure_sets(FixedUpdate, (SimSet::Commands, SimSet::UnitTick).chain());

        app.add_systems(Startup, systems::init_sim_config_from_initial);

        app.add_systems(
            FixedUpdate,
            (
                systems::increment_sim_tick.before(SimSet::Commands),
                systems::cache_previous_state
                    .in_set(SimSet::Commands)
                    .before(commands::drain_commands),
                commands::drain_commands.in_set(SimSet::Commands),
                systems::tick_units.in_set(SimSet::UnitTick),
            ),
        );
    }
}
