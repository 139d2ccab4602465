//! The outer frame: start byte, address, length+seq, command, data,
//! optional BCD timestamp, and checksum.
//!
//! This module only deals in raw bytes — it has no idea whether `data`
//! spells a keystring or carries a binary event triple. That dialect
//! dispatch happens one layer up, in [`crate::event`].

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `USER_INTERFACE` packets carry keypad input going up, and status
/// replies / keystring echoes coming down. `SYSTEM_STATUS` packets carry
/// asynchronous panel events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    UserInterface,
    SystemStatus,
}

impl Command {
    const USER_INTERFACE: u8 = 0x60;
    const SYSTEM_STATUS: u8 = 0x61;

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            Self::USER_INTERFACE => Some(Command::UserInterface),
            Self::SYSTEM_STATUS => Some(Command::SystemStatus),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Command::UserInterface => Self::USER_INTERFACE,
            Command::SystemStatus => Self::SYSTEM_STATUS,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::UserInterface => write!(f, "user_interface"),
            Command::SystemStatus => write!(f, "system_status"),
        }
    }
}

/// The first frame byte, decomposed into its three flag bits.
///
/// Only `0x82`/`0x83`/`0x86`/`0x87` are valid in the ASCII-format family
/// this crate speaks; the non-ASCII "basic header" variants are out of
/// scope (see crate-level docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartByte {
    pub address_included: bool,
    pub timestamp_included: bool,
}

impl StartByte {
    const ASCII_FORMAT: u8 = 0x80;
    const BASIC_HEADER: u8 = 0x02;
    const ADDRESS_INCLUDED: u8 = 0x01;
    const TIMESTAMP_INCLUDED: u8 = 0x04;

    fn to_byte(self) -> u8 {
        let mut b = Self::ASCII_FORMAT | Self::BASIC_HEADER;
        if self.address_included {
            b |= Self::ADDRESS_INCLUDED;
        }
        if self.timestamp_included {
            b |= Self::TIMESTAMP_INCLUDED;
        }
        b
    }

    fn from_byte(b: u8) -> Option<Self> {
        if b & (Self::ASCII_FORMAT | Self::BASIC_HEADER) != Self::ASCII_FORMAT | Self::BASIC_HEADER
        {
            return None;
        }
        // Only bits 0, 1, 2, 7 may be set.
        if b & !(Self::ASCII_FORMAT | Self::BASIC_HEADER | Self::ADDRESS_INCLUDED | Self::TIMESTAMP_INCLUDED) != 0 {
            return None;
        }
        Some(StartByte {
            address_included: b & Self::ADDRESS_INCLUDED != 0,
            timestamp_included: b & Self::TIMESTAMP_INCLUDED != 0,
        })
    }
}

/// The optional 6-byte BCD timestamp block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: u8,   // 0-99, offset from 2000
    pub month: u8,  // 1-12
    pub day: u8,    // 1-31
    pub hour: u8,   // 0-23
    pub minute: u8, // 0-59
    pub second: u8, // 0-59
}

impl Timestamp {
    /// Decode the 6 raw bytes of a timestamp block.
    ///
    /// Day-of-month carries the day-of-week in its top 3 bits (ignored —
    /// the panel doesn't give us enough to reconstruct a calendar-correct
    /// day-of-week independent of the date itself) and hour carries a DST
    /// flag in its top 3 bits (also ignored: it does not affect the wall
    /// clock reading the panel reports).
    pub fn decode(bytes: &[u8; 6]) -> Self {
        Timestamp {
            year: bytes[0],
            month: bytes[1],
            day: bytes[2] & 0x1F,
            hour: bytes[3] & 0x1F,
            minute: bytes[4],
            second: bytes[5],
        }
    }

    pub fn encode(&self) -> [u8; 6] {
        [
            self.year,
            self.month,
            self.day & 0x1F,
            self.hour & 0x1F,
            self.minute,
            self.second,
        ]
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "20{:02}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// The framed unit on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub address: Option<u8>,
    pub seq: u8,
    pub command: Command,
    pub data: Vec<u8>,
    pub timestamp: Option<Timestamp>,
    /// The checksum byte as it appeared on (or was computed for) the wire.
    pub checksum: u8,
}

// `checksum` is derived from the other fields by `encode`/`decode`, not an
// independent part of a packet's identity, so it's excluded here. Otherwise
// a freshly-built `Packet { checksum: 0, .. }` would never equal the packet
// `decode` hands back after a round trip through `encode`.
impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.seq == other.seq
            && self.command == other.command
            && self.data == other.data
            && self.timestamp == other.timestamp
    }
}

impl Eq for Packet {}

fn hex_byte(s: &str, at: usize) -> Result<u8, DecodeError> {
    if s.len() < 2 {
        return Err(DecodeError::TruncatedPacket {
            expected: 2,
            actual: s.len(),
        });
    }
    u8::from_str_radix(&s[..2], 16).map_err(|_| DecodeError::MalformedHeader {
        span: at..at + 2,
        reason: format!("{:?} is not a valid hex byte", &s[..2]),
    })
}

/// Compute the checksum byte such that the sum of all frame bytes,
/// checksum included, is congruent to 0 mod 256.
fn compute_checksum(frame_bytes: &[u8]) -> u8 {
    let sum: u32 = frame_bytes.iter().map(|&b| b as u32).sum();
    (256 - (sum % 256)) as u8 % 256
}

impl Packet {
    /// Decode a single already-trimmed line (no CR/LF/`?`) into a [`Packet`].
    pub fn decode(line: &str, checksum_mode: crate::types::ChecksumMode) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']).trim_end_matches('?');

        if line.len() < 8 || !line.is_char_boundary(line.len()) {
            return Err(DecodeError::TruncatedPacket {
                expected: 8,
                actual: line.len(),
            });
        }

        let mut pos = 0usize;
        let mut frame_bytes: Vec<u8> = Vec::new();

        let start_raw = hex_byte(&line[pos..], pos)?;
        let start = StartByte::from_byte(start_raw).ok_or(DecodeError::BadStartByte {
            byte: start_raw,
            span: pos..pos + 2,
        })?;
        frame_bytes.push(start_raw);
        pos += 2;

        let address = if start.address_included {
            let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
                expected: pos + 2,
                actual: line.len(),
            })?;
            let a = hex_byte(rest, pos)?;
            frame_bytes.push(a);
            pos += 2;
            Some(a)
        } else {
            None
        };

        let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
            expected: pos + 2,
            actual: line.len(),
        })?;
        let len_byte = hex_byte(rest, pos)?;
        frame_bytes.push(len_byte);
        pos += 2;
        let data_len = (len_byte & 0x7F) as usize;
        let seq = len_byte >> 7;

        let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
            expected: pos + 2,
            actual: line.len(),
        })?;
        let command_byte = hex_byte(rest, pos)?;
        let command = Command::from_byte(command_byte).ok_or(DecodeError::UnknownCommand {
            command: command_byte,
            span: pos..pos + 2,
        })?;
        frame_bytes.push(command_byte);
        pos += 2;

        let mut data = Vec::with_capacity(data_len);
        for _ in 0..data_len {
            let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
                expected: pos + 2,
                actual: line.len(),
            })?;
            let b = hex_byte(rest, pos)?;
            data.push(b);
            frame_bytes.push(b);
            pos += 2;
        }

        let timestamp = if start.timestamp_included {
            let mut ts_bytes = [0u8; 6];
            for slot in ts_bytes.iter_mut() {
                let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
                    expected: pos + 2,
                    actual: line.len(),
                })?;
                let b = hex_byte(rest, pos)?;
                *slot = b;
                frame_bytes.push(b);
                pos += 2;
            }
            Some(Timestamp::decode(&ts_bytes))
        } else {
            None
        };

        let rest = line.get(pos..).ok_or(DecodeError::TruncatedPacket {
            expected: pos + 2,
            actual: line.len(),
        })?;
        let checksum_span = pos..pos + 2;
        let checksum = hex_byte(rest, pos)?;

        let expected = compute_checksum(&frame_bytes);
        if expected != checksum {
            let err = DecodeError::ChecksumError {
                span: checksum_span,
                actual: checksum,
            };
            if checksum_mode == crate::types::ChecksumMode::Strict {
                return Err(err);
            }
            tracing::warn!(error = %err, line, "checksum mismatch, forwarding in lenient mode");
        }

        Ok(Packet {
            address,
            seq,
            command,
            data,
            timestamp,
            checksum,
        })
    }

    /// Encode this packet to its canonical uppercase-hex wire form,
    /// without a trailing terminator.
    pub fn encode(&self) -> String {
        let start = StartByte {
            address_included: self.address.is_some(),
            timestamp_included: self.timestamp.is_some(),
        };

        let mut frame_bytes = Vec::with_capacity(8 + self.data.len());
        frame_bytes.push(start.to_byte());
        if let Some(addr) = self.address {
            frame_bytes.push(addr);
        }
        let len_byte = (self.data.len() as u8 & 0x7F) | (self.seq << 7);
        frame_bytes.push(len_byte);
        frame_bytes.push(self.command.to_byte());
        frame_bytes.extend_from_slice(&self.data);
        if let Some(ts) = self.timestamp {
            frame_bytes.extend_from_slice(&ts.encode());
        }

        let checksum = compute_checksum(&frame_bytes);

        let mut out = String::with_capacity(frame_bytes.len() * 2 + 2);
        for b in &frame_bytes {
            out.push_str(&format!("{b:02X}"));
        }
        out.push_str(&format!("{checksum:02X}"));
        out
    }

    /// Encode with the `\r\n` terminator appended, as sent on the wire.
    pub fn encode_terminated(&self) -> String {
        let mut s = self.encode();
        s.push_str("\r\n");
        s
    }
}
