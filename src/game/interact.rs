//! Interaction arbitration: pointer and keyboard events become commands.
//!
//! A single press-release cycle yields at most one command. A small pixel
//! threshold separates clicks from drags; marker drags commit only on a
//! valid release and otherwise revert without touching unit state. All
//! mutations flow through the command factory - the UI never writes into
//! units directly.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::game::config::{GameConfig, GameConfigHandle};
use crate::game::rocks::RockField;
use crate::game::seat::{SeatDeny, SeatPolicy, SeatRequest, SeatState, Session};
use crate::game::simulation::{
    Capabilities, CommandKind, CommandQueue, CommandRejected, DriveInput, DriveInputs,
    HoveredUnit, Navigator, RejectReason, SelectedUnit, SimConfig, SimPosition, SimTick, UnitId,
    UnitIndex,
};
use crate::game::terrain::{TerrainOracle, Zone};
use crate::game::GameState;

// ============================================================================
// Pure intent model
// ============================================================================

/// What the pointer was over when an event fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTarget {
    Unit(u32),
    Marker { unit: u32, index: usize },
    Terrain(Vec3),
    Sky,
}

/// Recognized gesture outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Select { unit: u32 },
    Deselect,
    Move { unit: u32, point: Vec3 },
    ClosePath { unit: u32 },
    PathDraw { unit: u32, points: Vec<Vec3> },
    TerrainPan,
    MarkerDrag { unit: u32, index: usize, to: Vec3 },
}

/// Classify one completed press-release cycle.
///
/// `drag_px` is the pointer travel since the press; `draw_points` are the
/// terrain samples collected while dragging. Marker drags dominate every
/// other gesture; an invalid marker release classifies as nothing (revert).
pub fn classify_release(
    press: HitTarget,
    release: HitTarget,
    drag_px: f32,
    threshold_px: f32,
    selected: Option<u32>,
    draw_points: &[Vec3],
    dragging_marker: Option<(u32, usize)>,
) -> Option<Intent> {
    if let Some((unit, index)) = dragging_marker {
        if let HitTarget::Terrain(to) = release {
            return Some(Intent::MarkerDrag { unit, index, to });
        }
        return None;
    }

    let dragged = drag_px > threshold_px;
    if dragged {
        return match (press, selected) {
            (HitTarget::Terrain(_), Some(unit)) if draw_points.len() >= 2 => {
                Some(Intent::PathDraw {
                    unit,
                    points: draw_points.to_vec(),
                })
            }
            (HitTarget::Terrain(_) | HitTarget::Sky, _) => Some(Intent::TerrainPan),
            _ => None,
        };
    }

    match press {
        HitTarget::Unit(unit) => Some(Intent::Select { unit }),
        // Clicking the loop start of the selected unit closes its path.
        HitTarget::Marker { unit, index: 0 } if selected == Some(unit) => {
            Some(Intent::ClosePath { unit })
        }
        HitTarget::Marker { .. } => None,
        HitTarget::Terrain(point) => selected.map(|unit| Intent::Move { unit, point }),
        HitTarget::Sky => Some(Intent::Deselect),
    }
}

// ============================================================================
// Presentation state
// ============================================================================

/// In-flight pointer gesture.
#[derive(Resource, Default)]
pub struct DragState {
    pub press_screen: Option<Vec2>,
    pub press_target: Option<HitTarget>,
    pub max_drag_px: f32,
    pub draw_points: Vec<Vec3>,
    /// Marker being dragged: unit, waypoint index, original position.
    pub marker: Option<(u32, usize, Vec3)>,
}

impl DragState {
    fn clear(&mut self) {
        self.press_screen = None;
        self.press_target = None;
        self.max_drag_px = 0.0;
        self.draw_points.clear();
        self.marker = None;
    }
}

/// PIN keypad target: a unit whose seat wants a digit from us.
#[derive(Resource, Default)]
pub struct PendingPin(pub Option<u32>);

/// Short-lived advisory messages for the local operator.
#[derive(Resource, Default)]
pub struct Toasts {
    pub entries: Vec<(String, f32)>,
}

impl Toasts {
    pub fn push(&mut self, text: impl Into<String>, ttl: f32) {
        self.entries.push((text.into(), ttl));
    }
}

// ============================================================================
// Picking
// ============================================================================

/// Ray-sphere intersection against the base planet sphere; the hit direction
/// is then re-projected onto the terrain surface.
fn pick_terrain(ray: Ray3d, terrain: &TerrainOracle) -> Option<Vec3> {
    let origin = ray.origin;
    let dir = *ray.direction;
    let radius = terrain.base_radius();
    let b = origin.dot(dir);
    let c = origin.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 {
        return None;
    }
    let hit = origin + dir * t;
    Some(terrain.surface_point(hit, 0.0))
}

fn distance_to_ray(point: Vec3, ray: Ray3d) -> f32 {
    let to_point = point - ray.origin;
    let along = to_point.dot(*ray.direction);
    if along < 0.0 {
        return to_point.length();
    }
    (to_point - *ray.direction * along).length()
}

#[allow(clippy::too_many_arguments)]
fn pick(
    ray: Ray3d,
    terrain: &TerrainOracle,
    click_radius: f32,
    units: &Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
    selected: Option<u32>,
) -> HitTarget {
    // Units first, nearest to the camera wins.
    let mut best: Option<(f32, HitTarget)> = None;
    for (id, pos, nav, _) in units.iter() {
        let d = distance_to_ray(pos.0, ray);
        if d < click_radius {
            let along = (pos.0 - ray.origin).length();
            if best.as_ref().map_or(true, |(b, _)| along < *b) {
                best = Some((along, HitTarget::Unit(id.0)));
            }
        }
        // Waypoint markers are pickable only on the selected unit.
        if selected == Some(id.0) {
            for (index, waypoint) in nav.waypoints.iter().enumerate() {
                let marker_pos = terrain.surface_point(waypoint.position, 0.0);
                if distance_to_ray(marker_pos, ray) < click_radius * 0.75 {
                    let along = (marker_pos - ray.origin).length();
                    if best.as_ref().map_or(true, |(b, _)| along < *b) {
                        best = Some((
                            along,
                            HitTarget::Marker {
                                unit: id.0,
                                index,
                            },
                        ));
                    }
                }
            }
        }
    }
    if let Some((_, target)) = best {
        return target;
    }
    match pick_terrain(ray, terrain) {
        Some(point) => HitTarget::Terrain(point),
        None => HitTarget::Sky,
    }
}

// ============================================================================
// Systems
// ============================================================================

/// Translate held keys into the local slot's drive input, and the transport
/// keys into play/pause commands for the selected unit.
fn collect_keyboard_input(
    keys: Res<ButtonInput<KeyCode>>,
    config_handle: Option<Res<GameConfigHandle>>,
    game_configs: Option<Res<Assets<GameConfig>>>,
    session: Res<Session>,
    selected: Res<SelectedUnit>,
    tick: Res<SimTick>,
    mut inputs: ResMut<DriveInputs>,
    mut queue: ResMut<CommandQueue>,
    mut pending_pin: ResMut<PendingPin>,
    mut seat_requests: MessageWriter<SeatRequest>,
) {
    let (forward_key, backward_key, left_key, right_key, play_key, pause_key) =
        match (&config_handle, &game_configs) {
            (Some(handle), Some(configs)) => match configs.get(&handle.0) {
                Some(config) => (
                    config.key_forward,
                    config.key_backward,
                    config.key_left,
                    config.key_right,
                    config.key_play,
                    config.key_pause,
                ),
                None => default_keys(),
            },
            _ => default_keys(),
        };

    let mut input = DriveInput::default();
    if keys.pressed(forward_key) {
        input.forward += 1.0;
    }
    if keys.pressed(backward_key) {
        input.forward -= 1.0;
    }
    if keys.pressed(left_key) {
        input.turn -= 1.0;
    }
    if keys.pressed(right_key) {
        input.turn += 1.0;
    }
    inputs.0.insert(session.local_slot, input);

    if let Some(unit) = selected.0 {
        if keys.just_pressed(play_key) {
            queue.submit(tick.0 + 1, session.local_slot, unit, CommandKind::Play);
        }
        if keys.just_pressed(pause_key) {
            queue.submit(tick.0 + 1, session.local_slot, unit, CommandKind::Pause);
        }
    }

    // PIN keypad: digits answer an outstanding seat challenge.
    if let Some(unit) = pending_pin.0 {
        const DIGITS: [(KeyCode, u8); 9] = [
            (KeyCode::Digit1, 1),
            (KeyCode::Digit2, 2),
            (KeyCode::Digit3, 3),
            (KeyCode::Digit4, 4),
            (KeyCode::Digit5, 5),
            (KeyCode::Digit6, 6),
            (KeyCode::Digit7, 7),
            (KeyCode::Digit8, 8),
            (KeyCode::Digit9, 9),
        ];
        for (key, digit) in DIGITS {
            if keys.just_pressed(key) {
                seat_requests.write(SeatRequest {
                    unit_id: unit,
                    slot: session.local_slot,
                    pin_guess: Some(digit),
                });
                pending_pin.0 = None;
                break;
            }
        }
    }
}

fn default_keys() -> (KeyCode, KeyCode, KeyCode, KeyCode, KeyCode, KeyCode) {
    (
        KeyCode::KeyW,
        KeyCode::KeyS,
        KeyCode::KeyA,
        KeyCode::KeyD,
        KeyCode::KeyP,
        KeyCode::KeyO,
    )
}

/// Pointer tracking: press starts a gesture, motion accumulates drag
/// distance and draw points, release classifies and issues the command.
fn handle_pointer(
    mouse: Res<ButtonInput<MouseButton>>,
    q_window: Query<&Window, With<PrimaryWindow>>,
    q_camera: Query<(&Camera, &GlobalTransform), With<Camera3d>>,
    units: Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
    seats: Query<&SeatState>,
    oracles: (
        Option<Res<TerrainOracle>>,
        Option<Res<RockField>>,
        Option<Res<SimConfig>>,
    ),
    ui_config: (Option<Res<GameConfigHandle>>, Option<Res<Assets<GameConfig>>>),
    session_state: (Res<Session>, Res<SimTick>, Res<UnitIndex>, Res<SelectedUnit>),
    gesture: (
        ResMut<HoveredUnit>,
        ResMut<DragState>,
        ResMut<CommandQueue>,
        ResMut<PendingPin>,
    ),
    mut seat_requests: MessageWriter<SeatRequest>,
) {
    let (terrain, rocks, cfg) = oracles;
    let (Some(terrain), Some(rocks), Some(cfg)) = (terrain, rocks, cfg) else {
        return;
    };
    let (config_handle, game_configs) = ui_config;
    let (session, tick, index, selected) = session_state;
    let (mut hovered, mut drag, mut queue, mut pending_pin) = gesture;
    let Some((camera, camera_transform)) = q_camera.iter().next() else {
        return;
    };
    let Some(window) = q_window.iter().next() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, cursor) else {
        return;
    };

    let (drag_threshold, click_radius) = match (&config_handle, &game_configs) {
        (Some(handle), Some(configs)) => configs
            .get(&handle.0)
            .map(|c| (c.drag_threshold_px, c.click_radius))
            .unwrap_or((3.0, 1.5)),
        _ => (3.0, 1.5),
    };

    let target = pick(ray, &terrain, click_radius, &units, selected.0);

    hovered.0 = match target {
        HitTarget::Unit(unit) => Some(unit),
        _ => None,
    };

    if mouse.just_pressed(MouseButton::Left) {
        drag.clear();
        drag.press_screen = Some(cursor);
        drag.press_target = Some(target);
        if let HitTarget::Marker {
            unit,
            index: marker_index,
        } = target
        {
            let original = unit_nav(unit, &units)
                .and_then(|nav| nav.waypoints.get(marker_index))
                .map(|w| w.position);
            if let Some(original) = original {
                drag.marker = Some((unit, marker_index, original));
            }
        }
    }

    if mouse.pressed(MouseButton::Left) {
        if let Some(press) = drag.press_screen {
            drag.max_drag_px = drag.max_drag_px.max(press.distance(cursor));
        }
        // Collect draw samples while sweeping over terrain.
        if let (HitTarget::Terrain(point), Some(HitTarget::Terrain(_))) =
            (target, drag.press_target)
        {
            if drag
                .draw_points
                .last()
                .map_or(true, |last| last.distance(point) > 1.0)
            {
                drag.draw_points.push(point);
            }
        }
    }

    if mouse.just_released(MouseButton::Left) {
        let Some(press_target) = drag.press_target else {
            return;
        };
        let intent = classify_release(
            press_target,
            target,
            drag.max_drag_px,
            drag_threshold,
            selected.0,
            &drag.draw_points,
            drag.marker.map(|(unit, idx, _)| (unit, idx)),
        );
        if let Some(intent) = intent {
            issue_intent(
                intent,
                &session,
                &tick,
                &cfg,
                &terrain,
                &rocks,
                &index,
                &seats,
                &units,
                &mut queue,
                &mut pending_pin,
                &mut seat_requests,
            );
        }
        drag.clear();
    }
}

fn unit_nav<'a>(
    unit: u32,
    units: &'a Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
) -> Option<&'a Navigator> {
    units
        .iter()
        .find(|(id, _, _, _)| id.0 == unit)
        .map(|(_, _, nav, _)| nav)
}

fn unit_caps(
    unit: u32,
    units: &Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
) -> Option<Capabilities> {
    units
        .iter()
        .find(|(id, _, _, _)| id.0 == unit)
        .map(|(_, _, _, caps)| *caps)
}

/// Turn a recognized intent into commands and seat traffic.
#[allow(clippy::too_many_arguments)]
fn issue_intent(
    intent: Intent,
    session: &Session,
    tick: &SimTick,
    cfg: &SimConfig,
    terrain: &TerrainOracle,
    rocks: &RockField,
    index: &UnitIndex,
    seats: &Query<&SeatState>,
    units: &Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
    queue: &mut CommandQueue,
    pending_pin: &mut PendingPin,
    seat_requests: &mut MessageWriter<SeatRequest>,
) {
    let slot = session.local_slot;
    let next_tick = tick.0 + 1;
    match intent {
        Intent::Select { unit } => {
            queue.submit(
                next_tick,
                slot,
                unit,
                CommandKind::Select { skip_camera: false },
            );
            // Selecting is also an attempt to control: start the seat flow.
            if let Some(entity) = index.get(unit) {
                if let Ok(seat) = seats.get(entity) {
                    if !seat.admits(slot) {
                        if seat.selected_by.is_none()
                            && seat.policy == SeatPolicy::PinOneDigit
                            && slot != 0
                            && seat.owner_slot != slot
                        {
                            pending_pin.0 = Some(unit);
                        } else {
                            seat_requests.write(SeatRequest {
                                unit_id: unit,
                                slot,
                                pin_guess: None,
                            });
                        }
                    }
                }
            }
        }
        Intent::Deselect => {
            if let Some(unit) = current_selection(units, seats, index, slot) {
                queue.submit(next_tick, slot, unit, CommandKind::Deselect);
            }
            pending_pin.0 = None;
        }
        Intent::Move { unit, point } => {
            queue.submit(next_tick, slot, unit, CommandKind::Move { point });
        }
        Intent::ClosePath { unit } => {
            queue.submit(next_tick, slot, unit, CommandKind::ClosePath);
        }
        Intent::PathDraw { unit, points } => {
            queue.submit(next_tick, slot, unit, CommandKind::SetPath { points });
        }
        Intent::MarkerDrag { unit, index: marker_index, to } => {
            // Commit only when the terminal position is permitted; an
            // invalid release reverts by issuing nothing.
            let can_swim = unit_caps(unit, units).is_some_and(|caps| caps.can_swim);
            let destination = terrain.surface_point(to, cfg.ground_offset);
            if terrain.classify(rocks, destination, can_swim) == Zone::Forbidden {
                return;
            }
            if let Some(nav) = unit_nav(unit, units) {
                let mut points: Vec<Vec3> = nav.waypoints.iter().map(|w| w.position).collect();
                if marker_index < points.len() {
                    points[marker_index] = to;
                    queue.submit(next_tick, slot, unit, CommandKind::SetPath { points });
                }
            }
        }
        Intent::TerrainPan => {
            // Camera motion is the camera controller's business.
        }
    }
}

fn current_selection(
    units: &Query<(&UnitId, &SimPosition, &Navigator, &Capabilities)>,
    seats: &Query<&SeatState>,
    index: &UnitIndex,
    slot: u8,
) -> Option<u32> {
    units
        .iter()
        .map(|(id, _, _, _)| id.0)
        .find(|id| {
            index
                .get(*id)
                .and_then(|e| seats.get(e).ok())
                .is_some_and(|seat| seat.selected_by == Some(slot))
        })
}

/// Surface command rejections and seat denials to the local operator.
fn surface_advisories(
    mut rejections: MessageReader<CommandRejected>,
    mut denies: MessageReader<SeatDeny>,
    session: Res<Session>,
    config_handle: Option<Res<GameConfigHandle>>,
    game_configs: Option<Res<Assets<GameConfig>>>,
    mut toasts: ResMut<Toasts>,
) {
    let ttl = match (&config_handle, &game_configs) {
        (Some(handle), Some(configs)) => configs
            .get(&handle.0)
            .map(|c| c.toast_seconds)
            .unwrap_or(1.5),
        _ => 1.5,
    };

    for rejection in rejections.read() {
        if rejection.slot != session.local_slot {
            continue;
        }
        let text = match rejection.reason {
            RejectReason::NotSeated => format!("Unit {}: not in the seat", rejection.unit_id),
            RejectReason::InvalidDestination => "Destination is blocked".to_string(),
            RejectReason::UnknownUnit => format!("Unit {} does not exist", rejection.unit_id),
        };
        toasts.push(text, ttl);
    }
    for deny in denies.read() {
        if deny.slot != session.local_slot {
            continue;
        }
        let text = match deny.reason {
            crate::game::seat::SeatDenyReason::Occupied(by) => {
                format!("Seat taken by operator {}", by)
            }
            crate::game::seat::SeatDenyReason::PinWrong => "Wrong PIN".to_string(),
            crate::game::seat::SeatDenyReason::Locked => "Seat is locked".to_string(),
        };
        toasts.push(text, ttl);
    }
}

fn expire_toasts(time: Res<Time>, mut toasts: ResMut<Toasts>) {
    let dt = time.delta_secs();
    for entry in toasts.entries.iter_mut() {
        entry.1 -= dt;
    }
    toasts.entries.retain(|(_, ttl)| *ttl > 0.0);
}

pub struct InteractionPlugin;

impl Plugin for InteractionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DragState>()
            .init_resource::<PendingPin>()
            .init_resource::<Toasts>()
            .add_systems(
                Update,
                (
                    collect_keyboard_input,
                    handle_pointer,
                    surface_advisories,
                    expire_toasts,
                )
                    .run_if(in_state(GameState::InGame)),
            );
    }
}
