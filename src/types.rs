//! Shared enums used across the codec, event, and alarm layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overall arming state of the panel, as tracked by the [`crate::alarm::Alarm`] model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmingState {
    /// No arming snapshot or event has been observed yet (or the connection
    /// was just reset).
    Unknown,
    Disarmed,
    Arming,
    ExitDelay,
    EntryDelay,
    Armed,
    Triggered,
}

impl Default for ArmingState {
    fn default() -> Self {
        ArmingState::Unknown
    }
}

impl fmt::Display for ArmingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArmingState::Unknown => "unknown",
            ArmingState::Disarmed => "disarmed",
            ArmingState::Arming => "arming",
            ArmingState::ExitDelay => "exit_delay",
            ArmingState::EntryDelay => "entry_delay",
            ArmingState::Armed => "armed",
            ArmingState::Triggered => "triggered",
        };
        write!(f, "{s}")
    }
}

/// Per-zone sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneState {
    Unknown,
    Sealed,
    Unsealed,
}

impl Default for ZoneState {
    fn default() -> Self {
        ZoneState::Unknown
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneState::Unknown => "unknown",
            ZoneState::Sealed => "sealed",
            ZoneState::Unsealed => "unsealed",
        };
        write!(f, "{s}")
    }
}

/// Panel model, decoded from a version reply (status id 17).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    D8X,
    D8XCEL3G,
    D8XCEL4G,
    D16X,
    D16XCEL3G,
    D16XCEL4G,
    D32X,
    /// Reserved/unrecognized model byte — the panel documentation reserves
    /// values for future hardware, so this is never a decode error.
    Unknown(u8),
}

impl Model {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Model::D8X,
            0x04 => Model::D8XCEL3G,
            0x05 => Model::D8XCEL4G,
            0x10 => Model::D16X,
            0x14 => Model::D16XCEL3G,
            0x15 => Model::D16XCEL4G,
            0x06 => Model::D32X,
            other => Model::Unknown(other),
        }
    }

    /// Maximum zone count this model supports, used to decide whether to
    /// keep polling for zones 17-32.
    pub fn max_zones(&self) -> u8 {
        match self {
            Model::D32X => 32,
            Model::Unknown(_) => 16,
            _ => 16,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Model::D8X => "D8X".to_string(),
            Model::D8XCEL3G => "D8XCEL-3G".to_string(),
            Model::D8XCEL4G => "D8XCEL-4G".to_string(),
            Model::D16X => "D16X".to_string(),
            Model::D16XCEL3G => "D16XCEL-3G".to_string(),
            Model::D16XCEL4G => "D16XCEL-4G".to_string(),
            Model::D32X => "D32X".to_string(),
            Model::Unknown(b) => format!("unknown(0x{b:02X})"),
        };
        write!(f, "{s}")
    }
}

/// Whether the codec rejects or forwards packets with an invalid checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChecksumMode {
    /// Reject the packet; it never reaches the alarm model.
    #[default]
    Strict,
    /// Log the error, surface it on the raw event stream, but still decode
    /// and deliver the packet.
    Lenient,
}

/// Overflow behavior for the outbound command queue while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the oldest queued command to make room for the new one.
    #[default]
    DropOldest,
    /// Reject (return an error from) the enqueue call.
    Reject,
}
