//! Command handlers for different command types
//!
//! Handlers run with the device state locked and never await; anything
//! long-running is returned as a [`MeasurementJob`] for the processor to
//! spawn.

mod measurement;
mod mode;
mod status;
mod stream;
mod surface;

pub use measurement::{handle_execute_measurement, handle_stop_measurement, measurement_payload};
pub use mode::{handle_get_mode, handle_set_mode};
pub use status::handle_get_status;
pub use stream::{handle_start_stream, handle_stop_stream};
pub use surface::handle_get_surface_data;

use super::ProcessorConfig;
use crate::state::MeasurementMode;
use metrolink_shared::{RequestId, RequestIdGenerator, WireMessage};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Context passed to command handlers
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub config: &'a ProcessorConfig,
    pub started_at: Instant,
    pub session_id: u64,
    pub request_id: &'a RequestId,
    pub ids: &'a RequestIdGenerator,
}

/// Result of running a handler
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Terminal success with a payload
    Completed(Value),
    /// Terminal error; validation failures and business-rule rejections
    Rejected(String),
    /// Accepted; the job runs in the background and answers later
    Started(MeasurementJob),
}

/// Background measurement accepted by the handler
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementJob {
    pub request_id: RequestId,
    pub mode: MeasurementMode,
    pub precision: String,
    pub duration: Duration,
}

/// Required string parameter, rejecting with `missing` if absent
fn required_param<'m>(message: &'m WireMessage, key: &str, missing: &str) -> Result<&'m str, HandlerOutcome> {
    message
        .param_str(key)
        .ok_or_else(|| HandlerOutcome::Rejected(missing.to_string()))
}
