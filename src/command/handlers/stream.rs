//! Streaming handlers

use super::{HandlerContext, HandlerOutcome};
use crate::state::DeviceState;
use metrolink_shared::WireMessage;
use serde_json::json;
use tracing::info;

const DEFAULT_FORMAT: &str = "raw";

/// Handle startStream
pub fn handle_start_stream(
    ctx: &HandlerContext<'_>,
    state: &mut DeviceState,
    message: &WireMessage,
) -> HandlerOutcome {
    if state.is_streaming {
        return HandlerOutcome::Rejected("Stream already running".into());
    }

    let format = message.param_str("format").unwrap_or(DEFAULT_FORMAT);
    let stream_id = ctx.ids.next();

    state.is_streaming = true;
    state.stream_id = Some(stream_id.clone());
    info!(stream_id = %stream_id, format, mode = %state.stream_mode, "stream started");

    HandlerOutcome::Completed(json!({
        "streamId": stream_id,
        "format": format,
        "mode": state.stream_mode.as_str(),
    }))
}

/// Handle stopStream
pub fn handle_stop_stream(state: &mut DeviceState) -> HandlerOutcome {
    if !state.is_streaming {
        return HandlerOutcome::Rejected("No active stream".into());
    }

    state.is_streaming = false;
    if let Some(stream_id) = state.stream_id.take() {
        info!(stream_id = %stream_id, "stream stopped");
    }
    HandlerOutcome::Completed(json!({ "streaming": false }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessorConfig;
    use metrolink_shared::{CommandType, RequestId, RequestIdGenerator};
    use std::time::Instant;

    #[test]
    fn test_stream_lifecycle() {
        let config = ProcessorConfig::default();
        let ids = RequestIdGenerator::new();
        let request_id = RequestId::from("20240425123045123");
        let ctx = HandlerContext {
            config: &config,
            started_at: Instant::now(),
            session_id: 1,
            request_id: &request_id,
            ids: &ids,
        };
        let mut state = DeviceState::default();
        let start = WireMessage::request(CommandType::StartStream, request_id.clone(), None);

        assert_eq!(
            handle_stop_stream(&mut state),
            HandlerOutcome::Rejected("No active stream".into())
        );

        match handle_start_stream(&ctx, &mut state, &start) {
            HandlerOutcome::Completed(data) => {
                assert_eq!(data["format"], "raw");
                assert_eq!(data["mode"], "continuous");
                assert_eq!(data["streamId"].as_str().map(str::len), Some(17));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(
            handle_start_stream(&ctx, &mut state, &start),
            HandlerOutcome::Rejected("Stream already running".into())
        );
        assert_eq!(
            handle_stop_stream(&mut state),
            HandlerOutcome::Completed(json!({"streaming": false}))
        );
    }
}
