//! The panel state model: a deterministic, synchronous fold of decoded
//! messages into zone state, arming state, and the notifications callers
//! actually care about.
//!
//! `Alarm` is deliberately not async and owns no I/O — it is a pure
//! function from `&DecodedMessage` to `Vec<Notification>`, so it is
//! trivially unit-testable without a runtime. [`crate::client::Client`]
//! is the async wrapper that owns one and fans its notifications out to
//! observers.

use crate::event::{AreaCode, DecodedMessage, EventKind, StatusUpdate};
use crate::types::{ArmingState, ZoneState};
use serde::{Deserialize, Serialize};

const DEFAULT_ZONE_CAPACITY: usize = 16;
const EXPANDED_ZONE_CAPACITY: usize = 32;

/// One observable consequence of applying a [`DecodedMessage`] to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    ZoneChange {
        zone: u8,
        state: ZoneState,
        previous: ZoneState,
    },
    StateChange {
        state: ArmingState,
        previous: ArmingState,
    },
    RawEvent(DecodedMessage),
    /// Emitted instead of guessing when the first zone change arrives
    /// while arming is still `Unknown` and inference is enabled. The
    /// `Client` turns this into an `update_status()` call.
    NeedsStatusRefresh,
}

fn armed_ish(state: ArmingState) -> bool {
    matches!(
        state,
        ArmingState::Arming | ArmingState::ExitDelay | ArmingState::EntryDelay | ArmingState::Armed
    )
}

/// The panel's arming and zone state, folded from every decoded message
/// a [`crate::client::Client`] observes.
#[derive(Debug, Clone)]
pub struct Alarm {
    arming: ArmingState,
    zones: Vec<ZoneState>,
    version: Option<crate::event::VersionReply>,
    infer_arming_state: bool,
    pending_initial_zone_change: bool,
    pre_trigger_arming: Option<ArmingState>,
}

impl Alarm {
    pub fn new(infer_arming_state: bool) -> Self {
        Alarm {
            arming: ArmingState::Unknown,
            zones: vec![ZoneState::Unknown; DEFAULT_ZONE_CAPACITY],
            version: None,
            infer_arming_state,
            pending_initial_zone_change: infer_arming_state,
            pre_trigger_arming: None,
        }
    }

    pub fn arming(&self) -> ArmingState {
        self.arming
    }

    pub fn zone_state(&self, zone: u8) -> ZoneState {
        let idx = zone.wrapping_sub(1) as usize;
        self.zones.get(idx).copied().unwrap_or(ZoneState::Unknown)
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn version(&self) -> Option<&crate::event::VersionReply> {
        self.version.as_ref()
    }

    /// Marks arming and every known zone `Unknown` after a reconnect,
    /// without shrinking a zone map that has already grown to 32 — the
    /// model remembers it once saw a 32-zone panel.
    pub fn reset(&mut self) -> Vec<Notification> {
        let mut notifications = Vec::new();
        let previous = self.arming;
        if previous != ArmingState::Unknown {
            self.arming = ArmingState::Unknown;
            notifications.push(Notification::StateChange {
                state: self.arming,
                previous,
            });
        }
        for (i, slot) in self.zones.iter_mut().enumerate() {
            if *slot != ZoneState::Unknown {
                notifications.push(Notification::ZoneChange {
                    zone: (i + 1) as u8,
                    state: ZoneState::Unknown,
                    previous: *slot,
                });
                *slot = ZoneState::Unknown;
            }
        }
        self.pre_trigger_arming = None;
        self.pending_initial_zone_change = self.infer_arming_state;
        notifications
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        if self.zones.len() < capacity {
            self.zones.resize(capacity, ZoneState::Unknown);
        }
    }

    fn set_arming(&mut self, new_state: ArmingState, notifications: &mut Vec<Notification>) {
        if new_state != self.arming {
            let previous = self.arming;
            self.arming = new_state;
            notifications.push(Notification::StateChange {
                state: new_state,
                previous,
            });
        }
    }

    fn set_zone(&mut self, zone: u8, new_state: ZoneState, notifications: &mut Vec<Notification>) {
        if zone == 0 {
            return;
        }
        let idx = (zone - 1) as usize;
        if idx >= self.zones.len() {
            self.ensure_capacity(idx + 1);
        }
        let previous = self.zones[idx];
        if previous != new_state {
            self.zones[idx] = new_state;
            notifications.push(Notification::ZoneChange {
                zone,
                state: new_state,
                previous,
            });
            if self.pending_initial_zone_change && self.arming == ArmingState::Unknown {
                self.pending_initial_zone_change = false;
                notifications.push(Notification::NeedsStatusRefresh);
            }
        }
    }

    fn apply_zone_snapshot(&mut self, base: u8, unsealed: &[bool; 16], notifications: &mut Vec<Notification>) {
        for (i, &is_unsealed) in unsealed.iter().enumerate() {
            let zone = base + i as u8;
            let state = if is_unsealed {
                ZoneState::Unsealed
            } else {
                ZoneState::Sealed
            };
            self.set_zone(zone, state, notifications);
        }
    }

    fn apply_arming_snapshot(&mut self, flags: crate::event::ArmingFlags, notifications: &mut Vec<Notification>) {
        let new_state = if flags.any_area_fully_armed() {
            ArmingState::Armed
        } else if flags.any_entry_delay_on() {
            ArmingState::EntryDelay
        } else if flags.any_area_armed() {
            ArmingState::ExitDelay
        } else {
            ArmingState::Disarmed
        };
        self.set_arming(new_state, notifications);
    }

    fn apply_event(&mut self, kind: EventKind, notifications: &mut Vec<Notification>) {
        match kind {
            EventKind::Unsealed { zone } => self.set_zone(zone, ZoneState::Unsealed, notifications),
            EventKind::Sealed { zone } => self.set_zone(zone, ZoneState::Sealed, notifications),
            EventKind::Alarm { area, .. } => {
                if matches!(area, AreaCode::Area(_)) && armed_ish(self.arming) {
                    self.pre_trigger_arming = Some(self.arming);
                    self.set_arming(ArmingState::Triggered, notifications);
                }
                // Special-cause alarms (duress, panic, medical, fire, ...)
                // are forwarded as raw events only — see the duress
                // worked example, which fires no arming transition.
            }
            EventKind::AlarmRestore { .. } => {
                let restored = self.pre_trigger_arming.take().unwrap_or(ArmingState::Unknown);
                self.set_arming(restored, notifications);
            }
            EventKind::Disarmed { .. } => {
                self.pre_trigger_arming = None;
                self.set_arming(ArmingState::Disarmed, notifications);
            }
            EventKind::ArmedAway { .. }
            | EventKind::ArmedHome { .. }
            | EventKind::ArmedDay { .. }
            | EventKind::ArmedNight { .. }
            | EventKind::ArmedVacation { .. }
            | EventKind::ArmedHighest { .. } => self.set_arming(ArmingState::Armed, notifications),
            EventKind::ExitDelayStart { .. } => self.set_arming(ArmingState::ExitDelay, notifications),
            EventKind::ExitDelayEnd { .. } => {
                if self.arming == ArmingState::ExitDelay {
                    self.set_arming(ArmingState::Armed, notifications);
                }
            }
            EventKind::EntryDelayStart { .. } => self.set_arming(ArmingState::EntryDelay, notifications),
            EventKind::EntryDelayEnd { .. } => self.set_arming(ArmingState::Armed, notifications),
            EventKind::ArmingDelayed { .. } => self.set_arming(ArmingState::Arming, notifications),
            EventKind::TamperUnsealed { .. }
            | EventKind::TamperSealed { .. }
            | EventKind::DoorOpenTooLong { .. }
            | EventKind::Unknown { .. } => {}
        }
    }

    /// Fold one decoded message into the model, returning every
    /// notification it produced, in emission order. A decode error never
    /// mutates state — it only appears as a [`Notification::RawEvent`].
    pub fn apply(&mut self, message: &DecodedMessage) -> Vec<Notification> {
        let mut notifications = vec![Notification::RawEvent(message.clone())];

        match message {
            DecodedMessage::SystemStatusEvent(event) => self.apply_event(event.kind, &mut notifications),
            DecodedMessage::StatusUpdate(update) => match update {
                StatusUpdate::ZonesLow { unsealed } => {
                    self.apply_zone_snapshot(1, unsealed, &mut notifications)
                }
                StatusUpdate::ZonesHigh { unsealed } => {
                    self.ensure_capacity(EXPANDED_ZONE_CAPACITY);
                    self.apply_zone_snapshot(17, unsealed, &mut notifications)
                }
                StatusUpdate::Arming(flags) => self.apply_arming_snapshot(*flags, &mut notifications),
                StatusUpdate::MiscAlarms(_)
                | StatusUpdate::Outputs(_)
                | StatusUpdate::ViewState(_)
                | StatusUpdate::AuxOutputs(_)
                | StatusUpdate::Unknown { .. } => {}
                // The decoder always routes version replies through
                // `DecodedMessage::VersionReply` directly; this arm only
                // guards against a hand-built `DecodedMessage`.
                StatusUpdate::Version(_) => {}
            },
            DecodedMessage::VersionReply(version) => {
                if version.model.max_zones() == 32 {
                    self.ensure_capacity(EXPANDED_ZONE_CAPACITY);
                }
                self.version = Some(version.clone());
            }
            DecodedMessage::UserInterfaceCommand(_) | DecodedMessage::DecodeError(_) => {}
        }

        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{decode_message, ArmingFlags, VersionReply};
    use crate::packet::Packet;
    use crate::types::{ChecksumMode, Model};

    fn zone_word(bits: &[usize]) -> [bool; 16] {
        let mut zones = [false; 16];
        for &b in bits {
            zones[b] = true;
        }
        zones
    }

    #[test]
    fn zone_7_unseal_transitions_from_unknown() {
        let mut alarm = Alarm::new(false);
        let packet = Packet::decode("83070360004000D3", ChecksumMode::Strict).unwrap();
        let msg = decode_message(&packet);
        let notifications = alarm.apply(&msg);
        assert_eq!(alarm.zone_state(7), ZoneState::Unsealed);
        let zone_changes: Vec<_> = notifications
            .iter()
            .filter(|n| matches!(n, Notification::ZoneChange { .. }))
            .collect();
        assert_eq!(zone_changes.len(), 1);
        assert_eq!(
            zone_changes[0],
            &Notification::ZoneChange {
                zone: 7,
                state: ZoneState::Unsealed,
                previous: ZoneState::Unknown
            }
        );
    }

    #[test]
    fn snapshot_then_sealed_event_converges_regardless_of_snapshot_bit() {
        let mut alarm = Alarm::new(false);
        let snapshot = DecodedMessage::StatusUpdate(StatusUpdate::ZonesLow {
            unsealed: zone_word(&[6]), // zone 7 unsealed in the snapshot
        });
        alarm.apply(&snapshot);
        assert_eq!(alarm.zone_state(7), ZoneState::Unsealed);

        let sealed = DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Sealed { zone: 7 },
            timestamp: None,
        });
        alarm.apply(&sealed);
        assert_eq!(alarm.zone_state(7), ZoneState::Sealed);
    }

    #[test]
    fn duress_event_delivers_raw_event_without_arming_transition() {
        let mut alarm = Alarm::new(false);
        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::ArmedAway { user: 1, area: 1 },
            timestamp: None,
        }));
        assert_eq!(alarm.arming(), ArmingState::Armed);

        let packet = Packet::decode("8702036102018406120107430029", ChecksumMode::Strict).unwrap();
        let msg = decode_message(&packet);
        let notifications = alarm.apply(&msg);
        assert_eq!(alarm.arming(), ArmingState::Armed, "duress must not change arming");
        assert!(notifications
            .iter()
            .any(|n| matches!(n, Notification::RawEvent(DecodedMessage::SystemStatusEvent(_)))));
        assert!(!notifications
            .iter()
            .any(|n| matches!(n, Notification::StateChange { .. })));
    }

    #[test]
    fn arming_fold_armed_then_disarmed() {
        let mut alarm = Alarm::new(false);
        let armed = alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::ArmedAway { user: 1, area: 1 },
            timestamp: None,
        }));
        assert!(armed.contains(&Notification::StateChange {
            state: ArmingState::Armed,
            previous: ArmingState::Unknown
        }));

        let disarmed = alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Disarmed { user: 1, area: 1 },
            timestamp: None,
        }));
        let state_changes: Vec<_> = disarmed
            .iter()
            .filter(|n| matches!(n, Notification::StateChange { .. }))
            .collect();
        assert_eq!(state_changes.len(), 1);
        assert_eq!(
            state_changes[0],
            &Notification::StateChange {
                state: ArmingState::Disarmed,
                previous: ArmingState::Armed
            }
        );
    }

    #[test]
    fn alarm_triggers_and_restores() {
        let mut alarm = Alarm::new(false);
        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::ArmedAway { user: 1, area: 1 },
            timestamp: None,
        }));
        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Alarm {
                identifier: 3,
                area: AreaCode::Area(1),
            },
            timestamp: None,
        }));
        assert_eq!(alarm.arming(), ArmingState::Triggered);

        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::AlarmRestore {
                identifier: 3,
                area: AreaCode::Area(1),
            },
            timestamp: None,
        }));
        assert_eq!(alarm.arming(), ArmingState::Armed);
    }

    #[test]
    fn version_reply_with_32_zone_model_grows_zone_capacity() {
        let mut alarm = Alarm::new(false);
        assert_eq!(alarm.zone_count(), 16);
        alarm.apply(&DecodedMessage::VersionReply(VersionReply {
            model: Model::D32X,
            version: "1.0".into(),
        }));
        assert_eq!(alarm.zone_count(), 32);
    }

    #[test]
    fn reset_marks_known_zones_and_arming_unknown_without_shrinking() {
        let mut alarm = Alarm::new(false);
        alarm.apply(&DecodedMessage::VersionReply(VersionReply {
            model: Model::D32X,
            version: "1.0".into(),
        }));
        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Unsealed { zone: 20 },
            timestamp: None,
        }));
        alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::ArmedAway { user: 1, area: 1 },
            timestamp: None,
        }));

        alarm.reset();
        assert_eq!(alarm.arming(), ArmingState::Unknown);
        assert_eq!(alarm.zone_state(20), ZoneState::Unknown);
        assert_eq!(alarm.zone_count(), 32, "zone map must not shrink back to 16");
    }

    #[test]
    fn infer_arming_state_requests_refresh_on_first_zone_change_only() {
        let mut alarm = Alarm::new(true);
        let first = alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Unsealed { zone: 1 },
            timestamp: None,
        }));
        assert!(first.contains(&Notification::NeedsStatusRefresh));

        let second = alarm.apply(&DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
            kind: EventKind::Unsealed { zone: 2 },
            timestamp: None,
        }));
        assert!(!second.contains(&Notification::NeedsStatusRefresh));
    }

    #[test]
    fn replaying_the_same_event_sequence_is_deterministic() {
        let events = vec![
            DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
                kind: EventKind::Unsealed { zone: 3 },
                timestamp: None,
            }),
            DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
                kind: EventKind::ArmedAway { user: 1, area: 1 },
                timestamp: None,
            }),
            DecodedMessage::SystemStatusEvent(crate::event::SystemStatusEvent {
                kind: EventKind::Sealed { zone: 3 },
                timestamp: None,
            }),
        ];

        let mut a = Alarm::new(false);
        let mut b = Alarm::new(false);
        for e in &events {
            a.apply(e);
        }
        for e in &events {
            b.apply(e);
        }
        assert_eq!(a.arming(), b.arming());
        for zone in 1..=16 {
            assert_eq!(a.zone_state(zone), b.zone_state(zone));
        }
    }

    #[test]
    fn decode_error_does_not_mutate_state() {
        let mut alarm = Alarm::new(false);
        let before = alarm.arming();
        let err_msg = DecodedMessage::DecodeError(crate::event::DecodeErrorInfo {
            error: crate::error::DecodeError::TruncatedPacket {
                expected: 8,
                actual: 2,
            },
            raw_line: "82".into(),
        });
        let notifications = alarm.apply(&err_msg);
        assert_eq!(alarm.arming(), before);
        assert_eq!(notifications.len(), 1);
        assert!(matches!(notifications[0], Notification::RawEvent(_)));
    }

    #[test]
    fn arming_snapshot_fully_armed_wins_over_entry_delay() {
        let mut alarm = Alarm::new(false);
        let word: u16 = (1 << 4) | (1 << 8); // area1 fully armed + area1 entry delay on
        let flags = ArmingFlags::decode((word >> 8) as u8, (word & 0xFF) as u8);
        alarm.apply(&DecodedMessage::StatusUpdate(StatusUpdate::Arming(flags)));
        assert_eq!(alarm.arming(), ArmingState::Armed);
    }
}
