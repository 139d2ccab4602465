//! Async client library for the Ness D8x/D16x/D32x alarm panel serial
//! protocol: a line-oriented ASCII framing over TCP or a local serial
//! port.
//!
//! [`client::Client`] owns the byte stream, [`packet`] and [`event`]
//! turn bytes into typed messages, [`alarm::Alarm`] folds those messages
//! into arming/zone state, and [`observer`] fans state changes out to
//! callbacks and cancellable subscriptions.

pub mod alarm;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod observer;
pub mod packet;
pub mod transport;
pub mod types;

pub use alarm::{Alarm, Notification};
pub use client::{Client, StateChangeEvent, ZoneChangeEvent};
pub use config::{ClientConfig, ClientConfigBuilder, Endpoint};
pub use error::{ClientError, DecodeError, TransportError};
pub use event::DecodedMessage;
pub use types::{ArmingState, ZoneState};
