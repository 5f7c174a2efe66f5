//! Stream mode handlers

use super::{required_param, HandlerOutcome};
use crate::state::{DeviceState, StreamMode};
use metrolink_shared::WireMessage;
use serde_json::json;
use tracing::info;

/// Handle setMode
pub fn handle_set_mode(state: &mut DeviceState, message: &WireMessage) -> HandlerOutcome {
    let raw = match required_param(message, "mode", "Missing mode parameter") {
        Ok(raw) => raw,
        Err(rejected) => return rejected,
    };

    let Some(mode) = StreamMode::parse(raw) else {
        return HandlerOutcome::Rejected(format!(
            "Invalid mode: {raw}. Valid modes are: {}",
            StreamMode::valid_names()
        ));
    };

    if state.stream_mode != mode {
        info!(from = %state.stream_mode, to = %mode, "stream mode changed");
    }
    state.stream_mode = mode;
    HandlerOutcome::Completed(json!({ "mode": mode.as_str() }))
}

/// Handle getMode
pub fn handle_get_mode(state: &DeviceState) -> HandlerOutcome {
    HandlerOutcome::Completed(json!({ "mode": state.stream_mode.as_str() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrolink_shared::{CommandType, RequestId};

    fn set_mode(params: serde_json::Value) -> WireMessage {
        WireMessage::request(CommandType::SetMode, RequestId::from("20240425123045123"), Some(params))
    }

    #[test]
    fn test_set_and_get_mode() {
        let mut state = DeviceState::default();
        assert_eq!(
            handle_set_mode(&mut state, &set_mode(json!({"mode": "snapshot"}))),
            HandlerOutcome::Completed(json!({"mode": "snapshot"}))
        );
        assert_eq!(
            handle_get_mode(&state),
            HandlerOutcome::Completed(json!({"mode": "snapshot"}))
        );
    }

    #[test]
    fn test_invalid_mode_lists_valid_modes() {
        let mut state = DeviceState::default();
        assert_eq!(
            handle_set_mode(&mut state, &set_mode(json!({"mode": "bogus"}))),
            HandlerOutcome::Rejected(
                "Invalid mode: bogus. Valid modes are: continuous, trigger, snapshot".into()
            )
        );
        assert_eq!(state.stream_mode, StreamMode::Continuous);
    }

    #[test]
    fn test_missing_mode() {
        let mut state = DeviceState::default();
        let message = WireMessage::request(CommandType::SetMode, RequestId::from("1"), None);
        assert_eq!(
            handle_set_mode(&mut state, &message),
            HandlerOutcome::Rejected("Missing mode parameter".into())
        );
    }
}
