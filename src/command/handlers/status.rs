//! Status request command handler

use super::{HandlerContext, HandlerOutcome};
use crate::state::DeviceState;
use serde_json::json;

/// Handle getStatus
pub fn handle_get_status(ctx: &HandlerContext<'_>, state: &DeviceState) -> HandlerOutcome {
    HandlerOutcome::Completed(json!({
        "deviceId": ctx.config.device_id,
        "firmwareVersion": ctx.config.firmware_version,
        "uptimeMs": ctx.started_at.elapsed().as_millis() as u64,
        "mode": state.stream_mode.as_str(),
        "isStreaming": state.is_streaming,
        "isMeasuring": state.is_measuring,
        "isCalibrated": state.is_calibrated,
    }))
}
