//! Connection configuration. Since this crate is a library rather than
//! the CLI the protocol serves, this is a plain buildable struct with a
//! sane `Default` rather than a `clap`-derived argument parser.

use std::time::Duration;

use crate::types::{ChecksumMode, OverflowPolicy};

/// Which byte stream a [`crate::client::Client`] should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, for panels exposed over TCP (an IP/serial bridge).
    Tcp { host: String, port: u16 },
    /// A local serial device path, fixed at 9600 8-N-1.
    Serial { device_path: String },
}

/// Full configuration surface for a [`crate::client::Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// Cadence of the keep-alive status-refresh suite.
    pub update_interval: Duration,
    /// If true, the first zone-change notification while arming is
    /// still `Unknown` triggers an `update_status()` probe instead of
    /// guessing arming state.
    pub infer_arming_state: bool,
    pub validate_checksums: ChecksumMode,
    /// I/O timeout applied to each keep-alive round trip.
    pub keepalive_timeout: Duration,
    /// Cap on the exponential reconnect backoff.
    pub backoff_cap: Duration,
    /// Timeout for establishing the transport.
    pub connect_timeout: Duration,
    /// `None` means the outbound command queue is unbounded.
    pub queue_capacity: Option<usize>,
    pub queue_overflow: OverflowPolicy,
    /// How long `close()` waits for the writer queue to drain before
    /// forcing the transport shut.
    pub shutdown_drain_deadline: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoint: Endpoint::Tcp {
                host: "localhost".to_string(),
                port: 2401,
            },
            update_interval: Duration::from_secs(60),
            infer_arming_state: true,
            validate_checksums: ChecksumMode::Strict,
            keepalive_timeout: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            queue_capacity: None,
            queue_overflow: OverflowPolicy::DropOldest,
            shutdown_drain_deadline: Duration::from_secs(2),
        }
    }
}

/// Builder for [`ClientConfig`]. Every setter takes `self` by value so
/// calls chain: `ClientConfigBuilder::tcp("panel.lan", 2401).build()`.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        ClientConfigBuilder {
            config: ClientConfig {
                endpoint: Endpoint::Tcp {
                    host: host.into(),
                    port,
                },
                ..ClientConfig::default()
            },
        }
    }

    pub fn serial(device_path: impl Into<String>) -> Self {
        ClientConfigBuilder {
            config: ClientConfig {
                endpoint: Endpoint::Serial {
                    device_path: device_path.into(),
                },
                ..ClientConfig::default()
            },
        }
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.config.update_interval = interval;
        self
    }

    pub fn infer_arming_state(mut self, infer: bool) -> Self {
        self.config.infer_arming_state = infer;
        self
    }

    pub fn validate_checksums(mut self, mode: ChecksumMode) -> Self {
        self.config.validate_checksums = mode;
        self
    }

    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive_timeout = timeout;
        self
    }

    pub fn backoff_cap(mut self, cap: Duration) -> Self {
        self.config.backoff_cap = cap;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn queue_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.queue_overflow = policy;
        self
    }

    pub fn shutdown_drain_deadline(mut self, deadline: Duration) -> Self {
        self.config.shutdown_drain_deadline = deadline;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_tcp_and_sane_timeouts() {
        let config = ClientConfig::default();
        assert!(matches!(config.endpoint, Endpoint::Tcp { .. }));
        assert_eq!(config.update_interval, Duration::from_secs(60));
        assert!(config.infer_arming_state);
    }

    #[test]
    fn builder_overrides_compose() {
        let config = ClientConfigBuilder::serial("/dev/ttyUSB0")
            .infer_arming_state(false)
            .queue_capacity(Some(32))
            .queue_overflow(OverflowPolicy::Reject)
            .build();
        assert_eq!(
            config.endpoint,
            Endpoint::Serial {
                device_path: "/dev/ttyUSB0".to_string()
            }
        );
        assert!(!config.infer_arming_state);
        assert_eq!(config.queue_capacity, Some(32));
        assert_eq!(config.queue_overflow, OverflowPolicy::Reject);
    }
}
