//! Layered error taxonomy: frame/decode errors, transport errors, and the
//! top-level client error that wraps both plus the synchronous
//! caller-misuse cases.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Errors raised while decoding a single line into a [`crate::packet::Packet`].
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("truncated packet: expected at least {expected} chars, got {actual}")]
    TruncatedPacket { expected: usize, actual: usize },

    #[error("malformed header at {span:?}: {reason}")]
    MalformedHeader { span: Range<usize>, reason: String },

    #[error("bad start byte 0x{byte:02X} at {span:?}")]
    BadStartByte { byte: u8, span: Range<usize> },

    #[error("checksum mismatch: expected running sum 0, got {actual:#04x}")]
    ChecksumError { span: Range<usize>, actual: u8 },

    #[error("unknown command 0x{command:02X} at {span:?}")]
    UnknownCommand { command: u8, span: Range<usize> },

    #[error("unknown status request id {id}")]
    UnknownStatusId { id: u8 },
}

/// Errors raised by the connection manager's transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connection reset")]
    ConnectionReset,

    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

/// Top-level error returned by the public [`crate::client::Client`] API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("keystring contains a character outside the allowed keypad set: {0:?}")]
    InvalidKeystring(String),

    #[error("status request id {0} is out of range (must be 0..=33)")]
    InvalidStatusRequestId(u8),

    #[error("send_command called after close()")]
    ClosedClientUsed,

    #[error("outbound queue is full and its overflow policy is Reject")]
    QueueFull,
}
