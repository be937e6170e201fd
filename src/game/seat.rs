//! Seat and ownership arbitration.
//!
//! A seat is an exclusive per-unit lock: only the seated operator may issue
//! simulation-mutating commands for that unit. The host (slot 0) arbitrates
//! seat requests; grants append to an auditable ownership history.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::game::simulation::resources::{SimTick, UnitIndex};
use crate::game::GameState;

/// Who may take a free seat on a foreign unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeatPolicy {
    #[default]
    Open,
    PinOneDigit,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquireMethod {
    Spawn,
    PinCapture,
    SeatClaim,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatDenyReason {
    Occupied(u8),
    PinWrong,
    Locked,
}

/// One entry of the ownership audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerRecord {
    pub slot: u8,
    pub previous_slot: Option<u8>,
    pub acquired_at: u64,
    pub method: AcquireMethod,
}

/// Per-unit seat state.
#[derive(Component, Debug, Clone)]
pub struct SeatState {
    pub owner_slot: u8,
    pub selected_by: Option<u8>,
    pub policy: SeatPolicy,
    /// Known to the host only; never put on the wire.
    pub pin_digit: Option<u8>,
    pub history: Vec<OwnerRecord>,
}

impl SeatState {
    pub fn new(owner_slot: u8, spawn_tick: u64) -> Self {
        Self {
            owner_slot,
            selected_by: None,
            policy: SeatPolicy::Open,
            pin_digit: None,
            history: vec![OwnerRecord {
                slot: owner_slot,
                previous_slot: None,
                acquired_at: spawn_tick,
                method: AcquireMethod::Spawn,
            }],
        }
    }

    /// Whether `slot` currently holds the seat.
    pub fn admits(&self, slot: u8) -> bool {
        self.selected_by == Some(slot)
    }

    pub fn release(&mut self) {
        self.selected_by = None;
    }

    /// Host-initiated ownership transfer.
    pub fn transfer(&mut self, new_owner: u8, tick: u64) {
        let previous = Some(self.owner_slot);
        self.owner_slot = new_owner;
        self.history.push(OwnerRecord {
            slot: new_owner,
            previous_slot: previous,
            acquired_at: tick,
            method: AcquireMethod::Transfer,
        });
    }
}

/// Role of this process within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    #[default]
    Offline,
    Host,
    Guest,
}

/// Session identity: role plus the local operator slot (host is slot 0).
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct Session {
    pub role: SessionRole,
    pub local_slot: u8,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
pub struct SeatRequest {
    pub unit_id: u32,
    pub slot: u8,
    /// Single-digit PIN guess, when the seat policy demands one.
    pub pin_guess: Option<u8>,
}

#[derive(Message, Debug, Clone)]
pub struct SeatGrant {
    pub unit_id: u32,
    pub slot: u8,
    pub method: AcquireMethod,
    pub at_tick: u64,
}

#[derive(Message, Debug, Clone)]
pub struct SeatDeny {
    pub unit_id: u32,
    pub slot: u8,
    pub reason: SeatDenyReason,
}

#[derive(Message, Debug, Clone)]
pub struct SeatRelease {
    pub unit_id: u32,
    pub slot: u8,
}

// ============================================================================
// Arbitration
// ============================================================================

/// Decide a seat request against the current seat state.
///
/// `offline` short-circuits all checks (single-operator session). Host and
/// the unit's owner claim free seats directly; everyone else goes through
/// the seat policy. A successful PIN challenge also captures ownership.
pub fn arbitrate(
    seat: &SeatState,
    requester_slot: u8,
    offline: bool,
    pin_guess: Option<u8>,
) -> Result<AcquireMethod, SeatDenyReason> {
    if let Some(holder) = seat.selected_by {
        if holder != requester_slot {
            return Err(SeatDenyReason::Occupied(holder));
        }
        // Idempotent re-request from the current holder.
        return Ok(AcquireMethod::SeatClaim);
    }
    if offline || requester_slot == 0 || seat.owner_slot == requester_slot {
        return Ok(AcquireMethod::SeatClaim);
    }
    match seat.policy {
        SeatPolicy::Open => Ok(AcquireMethod::SeatClaim),
        SeatPolicy::PinOneDigit => match (pin_guess, seat.pin_digit) {
            (Some(guess), Some(digit)) if guess == digit => Ok(AcquireMethod::PinCapture),
            _ => Err(SeatDenyReason::PinWrong),
        },
        SeatPolicy::Locked => Err(SeatDenyReason::Locked),
    }
}

/// Apply pending seat requests in deterministic `(slot, unit_id)` order.
pub fn process_seat_requests(
    mut requests: MessageReader<SeatRequest>,
    mut grants: MessageWriter<SeatGrant>,
    mut denies: MessageWriter<SeatDeny>,
    index: Res<UnitIndex>,
    session: Res<Session>,
    tick: Res<SimTick>,
    mut seats: Query<&mut SeatState>,
) {
    let mut pending: Vec<&SeatRequest> = requests.read().collect();
    pending.sort_by_key(|r| (r.slot, r.unit_id));

    for request in pending {
        let Some(entity) = index.get(request.unit_id) else {
            continue;
        };
        let Ok(mut seat) = seats.get_mut(entity) else {
            continue;
        };
        if seat.admits(request.slot) {
            continue;
        }
        let offline = session.role == SessionRole::Offline;
        match arbitrate(&seat, request.slot, offline, request.pin_guess) {
            Ok(method) => {
                let previous = seat.selected_by;
                seat.selected_by = Some(request.slot);
                if method == AcquireMethod::PinCapture {
                    seat.owner_slot = request.slot;
                }
                seat.history.push(OwnerRecord {
                    slot: request.slot,
                    previous_slot: previous,
                    acquired_at: tick.0,
                    method,
                });
                grants.write(SeatGrant {
                    unit_id: request.unit_id,
                    slot: request.slot,
                    method,
                    at_tick: tick.0,
                });
            }
            Err(reason) => {
                denies.write(SeatDeny {
                    unit_id: request.unit_id,
                    slot: request.slot,
                    reason,
                });
            }
        }
    }
}

/// Apply explicit releases (deselect from a peer, host override).
pub fn process_seat_releases(
    mut releases: MessageReader<SeatRelease>,
    index: Res<UnitIndex>,
    mut seats: Query<&mut SeatState>,
) {
    let mut pending: Vec<&SeatRelease> = releases.read().collect();
    pending.sort_by_key(|r| (r.slot, r.unit_id));

    for release in pending {
        let Some(entity) = index.get(release.unit_id) else {
            continue;
        };
        let Ok(mut seat) = seats.get_mut(entity) else {
            continue;
        };
        // Host override may evict anyone; otherwise only the holder releases.
        if release.slot == 0 || seat.selected_by == Some(release.slot) {
            seat.release();
        }
    }
}

fn log_seat_outcomes(mut grants: MessageReader<SeatGrant>, mut denies: MessageReader<SeatDeny>) {
    for grant in grants.read() {
        info!(
            "Seat granted: unit {} to slot {} ({:?}) at tick {}",
            grant.unit_id, grant.slot, grant.method, grant.at_tick
        );
    }
    for deny in denies.read() {
        debug!(
            "Seat denied: unit {} to slot {} ({:?})",
            deny.unit_id, deny.slot, deny.reason
        );
    }
}

// ============================================================================
// Wire messages
// ============================================================================

/// Seat protocol records as they travel between peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SeatWire {
    #[serde(rename = "SEAT_REQ")]
    Request {
        #[serde(rename = "unitId")]
        unit_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<SeatAuth>,
    },
    #[serde(rename = "SEAT_GRANT")]
    Grant {
        #[serde(rename = "unitId")]
        unit_id: u32,
        slot: u8,
        method: AcquireMethod,
        #[serde(rename = "atTick")]
        at_tick: u64,
    },
    #[serde(rename = "SEAT_DENY")]
    Deny {
        #[serde(rename = "unitId")]
        unit_id: u32,
        reason: WireDenyReason,
    },
    #[serde(rename = "SEAT_RELEASE")]
    Release {
        #[serde(rename = "unitId")]
        unit_id: u32,
        slot: u8,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatAuth {
    pub method: AuthMethod,
    pub guess: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthMethod {
    #[serde(rename = "PIN_1DIGIT")]
    PinOneDigit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireDenyReason {
    #[serde(rename = "OCCUPIED")]
    Occupied,
    #[serde(rename = "PIN_WRONG")]
    PinWrong,
    #[serde(rename = "LOCKED")]
    Locked,
}

impl From<SeatDenyReason> for WireDenyReason {
    fn from(reason: SeatDenyReason) -> Self {
        match reason {
            SeatDenyReason::Occupied(_) => Self::Occupied,
            SeatDenyReason::PinWrong => Self::PinWrong,
            SeatDenyReason::Locked => Self::Locked,
        }
    }
}

// ============================================================================
// Plugin
// ============================================================================

pub struct SeatPlugin;

impl Plugin for SeatPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Session>()
            .add_message::<SeatRequest>()
            .add_message::<SeatGrant>()
            .add_message::<SeatDeny>()
            .add_message::<SeatRelease>()
            .add_systems(
                FixedUpdate,
                (process_seat_requests, process_seat_releases)
                    .chain()
                    .in_set(crate::game::simulation::SimSet::Commands)
                    .before(crate::game::simulation::commands::drain_commands),
            )
            .add_systems(Update, log_seat_outcomes.run_if(in_state(GameState::InGame)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat_with(policy: SeatPolicy, pin: Option<u8>) -> SeatState {
        let mut seat = SeatState::new(0, 0);
        seat.policy = policy;
        seat.pin_digit = pin;
        seat
    }

    #[test]
    fn occupied_seat_rejects_other_slots() {
        let mut seat = seat_with(SeatPolicy::Open, None);
        seat.selected_by = Some(2);
        assert_eq!(
            arbitrate(&seat, 1, false, None),
            Err(SeatDenyReason::Occupied(2))
        );
    }

    #[test]
    fn offline_always_grants_free_seat() {
        let seat = seat_with(SeatPolicy::Locked, None);
        assert_eq!(arbitrate(&seat, 3, true, None), Ok(AcquireMethod::SeatClaim));
    }

    #[test]
    fn host_claims_free_seat_on_any_unit() {
        let mut seat = seat_with(SeatPolicy::Locked, None);
        seat.owner_slot = 2;
        assert_eq!(arbitrate(&seat, 0, false, None), Ok(AcquireMethod::SeatClaim));
    }

    #[test]
    fn guest_claims_own_unit_past_lock() {
        let mut seat = seat_with(SeatPolicy::Locked, None);
        seat.owner_slot = 1;
        assert_eq!(arbitrate(&seat, 1, false, None), Ok(AcquireMethod::SeatClaim));
    }

    #[test]
    fn pin_challenge_grants_only_on_match() {
        let seat = seat_with(SeatPolicy::PinOneDigit, Some(7));
        assert_eq!(
            arbitrate(&seat, 1, false, Some(3)),
            Err(SeatDenyReason::PinWrong)
        );
        assert_eq!(
            arbitrate(&seat, 1, false, None),
            Err(SeatDenyReason::PinWrong)
        );
        assert_eq!(
            arbitrate(&seat, 1, false, Some(7)),
            Ok(AcquireMethod::PinCapture)
        );
    }

    #[test]
    fn locked_seat_rejects_foreign_guests() {
        let seat = seat_with(SeatPolicy::Locked, None);
        assert_eq!(arbitrate(&seat, 1, false, None), Err(SeatDenyReason::Locked));
    }

    #[test]
    fn wire_round_trip() {
        let msgs = vec![
            SeatWire::Request {
                unit_id: 4,
                auth: Some(SeatAuth {
                    method: AuthMethod::PinOneDigit,
                    guess: 7,
                }),
            },
            SeatWire::Grant {
                unit_id: 4,
                slot: 1,
                method: AcquireMethod::PinCapture,
                at_tick: 99,
            },
            SeatWire::Deny {
                unit_id: 4,
                reason: WireDenyReason::PinWrong,
            },
            SeatWire::Release { unit_id: 4, slot: 1 },
        ];
        for msg in msgs {
            let json = serde_json::to_string(&msg).unwrap();
            let back: SeatWire = serde_json::from_str(&json).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn deny_reason_names_match_protocol() {
        let json = serde_json::to_string(&SeatWire::Deny {
            unit_id: 1,
            reason: WireDenyReason::Locked,
        })
        .unwrap();
        assert!(json.contains("\"SEAT_DENY\""));
        assert!(json.contains("\"LOCKED\""));
    }
}
