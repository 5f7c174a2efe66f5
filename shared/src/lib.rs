//! Metrolink Shared Protocol Types
//!
//! This crate provides the wire schema, request identifiers, frame codec and
//! request lifecycle shared by the controller and the measurement device.

pub mod codec;
pub mod protocol;
pub mod request_id;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use protocol::{CommandType, Status, WireMessage};
pub use request_id::{readable_timestamp, RequestId, RequestIdGenerator};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters for the system
pub mod timing {
    /// Default port the device listens on
    pub const DEFAULT_DEVICE_PORT: u16 = 9002;

    /// Caller timeout for instantaneous commands
    pub const COMMAND_TIMEOUT_MS: u64 = 3000;

    /// Caller timeout for long-running commands
    pub const LONG_COMMAND_TIMEOUT_MS: u64 = 30_000;

    /// How often a running device operation checks its stop signal
    pub const STOP_POLL_INTERVAL_MS: u64 = 200;

    /// Window after which an injected device-side timeout fires
    pub const REMOTE_TIMEOUT_WINDOW_MS: u64 = 2000;

    /// Default share of measurements that end in an injected timeout
    pub const TIMEOUT_INJECTION_RATE: f64 = 0.05;
}
