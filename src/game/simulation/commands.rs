/// Canonical command log and its deterministic application point.
///
/// Every simulation-mutating intent is stamped `(tick, slot)` by the factory
/// and enqueued; the queue is drained once at the start of each tick in
/// `(tick, slot, unit_id, kind)` order, which is the sole ordering source of
/// cross-peer determinism. Effects applied earlier in a drain are visible to
/// later commands of the same drain.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::game::rng::{unit_stream, SessionSeed};
use crate::game::rocks::RockField;
use crate::game::seat::{SeatState, Session};
use crate::game::sphere;
use crate::game::terrain::{TerrainOracle, Zone};
use crate::game::GameEntity;

use super::components::*;
use super::resources::*;
use super::steering;

// ============================================================================
// Command records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Create a unit owned by `slot`. Host-issued; not part of the peer wire
    /// format.
    Spawn {
        position: Vec3,
        slot: u8,
        can_swim: bool,
    },
    /// Local presentation: focus a unit. No simulation-state change.
    Select { skip_camera: bool },
    Deselect,
    /// Append a destination waypoint and rebuild the path.
    Move { point: Vec3 },
    ClosePath,
    /// Replace the whole waypoint list.
    SetPath { points: Vec<Vec3> },
    Clear,
    Play,
    Pause,
}

impl CommandKind {
    /// Ordinal used as the final tie-breaker of the drain sort.
    pub fn order(&self) -> u8 {
        match self {
            Self::Spawn { .. } => 0,
            Self::Select { .. } => 1,
            Self::Deselect => 2,
            Self::Move { .. } => 3,
            Self::ClosePath => 4,
            Self::SetPath { .. } => 5,
            Self::Clear => 6,
            Self::Play => 7,
            Self::Pause => 8,
        }
    }

    /// Whether this command mutates unit state and therefore requires the
    /// issuer to hold the unit's seat.
    pub fn needs_seat(&self) -> bool {
        matches!(
            self,
            Self::Move { .. }
                | Self::ClosePath
                | Self::SetPath { .. }
                | Self::Clear
                | Self::Play
                | Self::Pause
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub tick: u64,
    pub slot: u8,
    pub unit_id: u32,
    pub kind: CommandKind,
}

/// Pending commands plus the canonical log of everything applied, in
/// application order. Replaying the log against a fresh session with the
/// same seeds reproduces the run exactly.
#[derive(Resource, Default, Debug)]
pub struct CommandQueue {
    pending: Vec<Command>,
    pub applied: Vec<Command>,
}

impl CommandQueue {
    /// Factory entry point: stamp and enqueue an intent.
    pub fn submit(&mut self, tick: u64, slot: u8, unit_id: u32, kind: CommandKind) {
        self.pending.push(Command {
            tick,
            slot,
            unit_id,
            kind,
        });
    }

    pub fn submit_command(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return the commands due at `tick`, in stable
    /// `(tick, slot, unit_id, kind)` order. Stable sorting preserves issue
    /// order between otherwise identical records.
    fn take_due(&mut self, tick: u64) -> Vec<Command> {
        let mut due = Vec::new();
        let mut rest = Vec::with_capacity(self.pending.len());
        for command in self.pending.drain(..) {
            if command.tick <= tick {
                due.push(command);
            } else {
                rest.push(command);
            }
        }
        self.pending = rest;
        due.sort_by_key(|c| (c.tick, c.slot, c.unit_id, c.kind.order()));
        due
    }
}

/// Advisory emitted when a command is refused. Surfaced only to the issuer.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRejected {
    pub slot: u8,
    pub unit_id: u32,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotSeated,
    InvalidDestination,
    UnknownUnit,
}

// ============================================================================
// Queue drain
// ============================================================================

type UnitStateQuery<'w, 's> = Query<
    'w,
    's,
    (
        (
            &'static UnitId,
            &'static SimPosition,
            &'static SimHeading,
            &'static mut Motion,
        ),
        (
            &'static mut Navigator,
            &'static mut Transition,
            &'static mut DriveOverride,
            &'static mut SeatState,
            &'static Capabilities,
        ),
    ),
>;

/// Apply all due commands against live unit state.
pub fn drain_commands(
    mut commands: Commands,
    mut queue: ResMut<CommandQueue>,
    tick: Res<SimTick>,
    cfg: Res<SimConfig>,
    terrain: Res<TerrainOracle>,
    rocks: Res<RockField>,
    seed: Res<SessionSeed>,
    session: Res<Session>,
    mut counter: ResMut<UnitIdCounter>,
    mut index: ResMut<UnitIndex>,
    mut selected: ResMut<SelectedUnit>,
    mut rejected: MessageWriter<CommandRejected>,
    mut units: UnitStateQuery,
) {
    for command in queue.take_due(tick.0) {
        let applied = apply_command(
            &command,
            &mut commands,
            &tick,
            &cfg,
            &terrain,
            &rocks,
            &seed,
            &session,
            &mut counter,
            &mut index,
            &mut selected,
            &mut rejected,
            &mut units,
        );
        if applied {
            queue.applied.push(command);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_command(
    command: &Command,
    commands: &mut Commands,
    tick: &SimTick,
    cfg: &SimConfig,
    terrain: &TerrainOracle,
    rocks: &RockField,
    seed: &SessionSeed,
    session: &Session,
    counter: &mut UnitIdCounter,
    index: &mut UnitIndex,
    selected: &mut SelectedUnit,
    rejected: &mut MessageWriter<CommandRejected>,
    units: &mut UnitStateQuery,
) -> bool {
    if let CommandKind::Spawn {
        position,
        slot,
        can_swim,
    } = &command.kind
    {
        spawn_unit(
            commands, counter, index, tick, cfg, terrain, seed, *position, *slot, *can_swim,
        );
        return true;
    }

    let Some(entity) = index.get(command.unit_id) else {
        rejected.write(CommandRejected {
            slot: command.slot,
            unit_id: command.unit_id,
            reason: RejectReason::UnknownUnit,
        });
        return false;
    };
    let Ok(((unit_id, pos, heading, mut motion), (mut nav, mut transition, mut overdrive, mut seat, caps))) =
        units.get_mut(entity)
    else {
        return false;
    };

    if command.kind.needs_seat() && !seat.admits(command.slot) {
        rejected.write(CommandRejected {
            slot: command.slot,
            unit_id: command.unit_id,
            reason: RejectReason::NotSeated,
        });
        return false;
    }

    let moving = nav.is_following && motion.speed_factor > cfg.min_speed;
    let travel_dir = if moving && motion.velocity_dir.length_squared() > 1e-6 {
        motion.velocity_dir
    } else {
        heading.0 * Vec3::Z
    };

    match &command.kind {
        CommandKind::Spawn { .. } => unreachable!("handled above"),
        CommandKind::Select { skip_camera: _ } => {
            if command.slot == session.local_slot {
                selected.0 = Some(command.unit_id);
            }
        }
        CommandKind::Deselect => {
            if command.slot == session.local_slot && selected.0 == Some(command.unit_id) {
                selected.0 = None;
            }
            if seat.selected_by == Some(command.slot) {
                seat.release();
            }
        }
        CommandKind::Move { point } => {
            let destination = terrain.surface_point(*point, cfg.ground_offset);
            if terrain.classify(rocks, destination, caps.can_swim) == Zone::Forbidden {
                rejected.write(CommandRejected {
                    slot: command.slot,
                    unit_id: command.unit_id,
                    reason: RejectReason::InvalidDestination,
                });
                return false;
            }
            let id = nav.next_waypoint_id(*unit_id);
            nav.waypoints.push(Waypoint {
                id: id.clone(),
                position: *point,
            });
            if nav.target_waypoint_id.is_none() {
                nav.target_waypoint_id = Some(id);
            }
            steering::rebuild_and_rejoin(
                &mut nav,
                &mut transition,
                pos.0,
                travel_dir,
                caps.can_swim,
                terrain,
                cfg,
            );
            if !nav.paused_by_command && overdrive.phase == OverridePhase::Inactive {
                nav.is_following = nav.has_path();
            }
        }
        CommandKind::ClosePath => {
            nav.is_closed = true;
            nav.looping = true;
            steering::rebuild_and_rejoin(
                &mut nav,
                &mut transition,
                pos.0,
                travel_dir,
                caps.can_swim,
                terrain,
                cfg,
            );
        }
        CommandKind::SetPath { points } => {
            for point in points {
                let destination = terrain.surface_point(*point, cfg.ground_offset);
                if terrain.classify(rocks, destination, caps.can_swim) == Zone::Forbidden {
                    rejected.write(CommandRejected {
                        slot: command.slot,
                        unit_id: command.unit_id,
                        reason: RejectReason::InvalidDestination,
                    });
                    return false;
                }
            }
            let mut replaced = Vec::with_capacity(points.len());
            for point in points {
                let id = nav.next_waypoint_id(*unit_id);
                replaced.push(Waypoint {
                    id,
                    position: *point,
                });
            }
            nav.waypoints = replaced;
            steering::rebuild_and_rejoin(
                &mut nav,
                &mut transition,
                pos.0,
                travel_dir,
                caps.can_swim,
                terrain,
                cfg,
            );
        }
        CommandKind::Clear => {
            nav.waypoints.clear();
            nav.path.clear();
            nav.segment_indices.clear();
            nav.path_index = 0;
            nav.is_following = false;
            nav.last_waypoint_id = None;
            nav.target_waypoint_id = None;
            transition.arc = None;
            motion.curve_dot = 1.0;
        }
        CommandKind::Play => {
            nav.paused_by_command = false;
            overdrive.phase = OverridePhase::Inactive;
            overdrive.timer = 0.0;
            nav.is_following = nav.has_path();
        }
        CommandKind::Pause => {
            nav.paused_by_command = true;
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn spawn_unit(
    commands: &mut Commands,
    counter: &mut UnitIdCounter,
    index: &mut UnitIndex,
    tick: &SimTick,
    cfg: &SimConfig,
    terrain: &TerrainOracle,
    seed: &SessionSeed,
    position: Vec3,
    slot: u8,
    can_swim: bool,
) {
    use rand::Rng;

    let id = counter.next();
    let snapped = terrain.surface_point(position, cfg.ground_offset);
    let normal = snapped.normalize_or(Vec3::Y);
    let heading = sphere::surface_alignment(normal.any_orthonormal_vector(), normal);

    let mut rng = unit_stream(*seed, id);
    let mut nav = Navigator::default();
    // Stagger the periodic obstacle scan across units.
    nav.scan_timer = rng.random_range(cfg.scan_interval_min..cfg.scan_interval_max);

    let entity = commands
        .spawn((
            (
                GameEntity,
                UnitId(id),
                SimPosition(snapped),
                SimPositionPrev(snapped),
                SimHeading(heading),
                SimHeadingPrev(heading),
                Motion::default(),
                Capabilities { can_swim },
            ),
            (
                nav,
                WaterMachine::default(),
                Bounce::default(),
                Transition::default(),
                DriveOverride::default(),
                StuckDetector {
                    last_pos: snapped,
                    ..Default::default()
                },
                SeatState::new(slot, tick.0),
                UnitRng(rng),
            ),
        ))
        .id();
    index.insert(id, entity);
    info!("Spawned unit {} for slot {} at {:?}", id, slot, snapped);
}

// ============================================================================
// Wire format
// ============================================================================

/// Peer-visible command record. Only player intents travel the wire; spawn
/// and selection stay local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    pub tick: u32,
    pub slot: u8,
    #[serde(rename = "unitId")]
    pub unit_id: u32,
    #[serde(flatten)]
    pub op: WireOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum WireOp {
    #[serde(rename = "MOVE")]
    Move { point: [f32; 3] },
    #[serde(rename = "CLOSE_PATH")]
    ClosePath {},
    #[serde(rename = "SET_PATH")]
    SetPath { waypoints: Vec<[f32; 3]> },
    #[serde(rename = "CLEAR")]
    Clear {},
    #[serde(rename = "PLAY")]
    Play {},
    #[serde(rename = "PAUSE")]
    Pause {},
}

impl Command {
    /// Wire encoding, when this command kind is part of the peer protocol.
    pub fn to_wire(&self) -> Option<WireCommand> {
        let op = match &self.kind {
            CommandKind::Move { point } => WireOp::Move {
                point: point.to_array(),
            },
            CommandKind::ClosePath => WireOp::ClosePath {},
            CommandKind::SetPath { points } => WireOp::SetPath {
                waypoints: points.iter().map(|p| p.to_array()).collect(),
            },
            CommandKind::Clear => WireOp::Clear {},
            CommandKind::Play => WireOp::Play {},
            CommandKind::Pause => WireOp::Pause {},
            _ => return None,
        };
        Some(WireCommand {
            tick: self.tick as u32,
            slot: self.slot,
            unit_id: self.unit_id,
            op,
        })
    }

    pub fn from_wire(wire: &WireCommand) -> Self {
        let kind = match &wire.op {
            WireOp::Move { point } => CommandKind::Move {
                point: Vec3::from_array(*point),
            },
            WireOp::ClosePath {} => CommandKind::ClosePath,
            WireOp::SetPath { waypoints } => CommandKind::SetPath {
                points: waypoints.iter().map(|p| Vec3::from_array(*p)).collect(),
            },
            WireOp::Clear {} => CommandKind::Clear,
            WireOp::Play {} => CommandKind::Play,
            WireOp::Pause {} => CommandKind::Pause,
        };
        Self {
            tick: u64::from(wire.tick),
            slot: wire.slot,
            unit_id: wire.unit_id,
            kind,
        }
    }
}
