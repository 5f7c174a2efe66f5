//! Measurement handlers

use super::{required_param, HandlerContext, HandlerOutcome, MeasurementJob};
use crate::state::{DeviceState, MeasurementMode};
use metrolink_shared::{now_ms, WireMessage};
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_PRECISION: &str = "normal";

/// Handle executeMeasurement
///
/// Marks the device as measuring and hands back the job to run; the
/// terminal reply is sent by the job itself.
pub fn handle_execute_measurement(
    ctx: &HandlerContext<'_>,
    state: &mut DeviceState,
    message: &WireMessage,
) -> HandlerOutcome {
    let raw = match required_param(message, "mode", "Missing mode parameter") {
        Ok(raw) => raw,
        Err(rejected) => return rejected,
    };

    let Some(mode) = MeasurementMode::parse(raw) else {
        return HandlerOutcome::Rejected(format!(
            "Invalid measurement mode: {raw}. Valid modes are: {}",
            MeasurementMode::valid_names()
        ));
    };

    if state.is_measuring {
        return HandlerOutcome::Rejected("Measurement already in progress".into());
    }

    let precision = message.param_str("precision").unwrap_or(DEFAULT_PRECISION);
    let duration = ctx.config.measurement_duration(mode, precision);

    state.begin_measurement(ctx.request_id.clone(), ctx.session_id);
    info!(
        request_id = %ctx.request_id,
        %mode,
        precision,
        duration_ms = duration.as_millis() as u64,
        "measurement started"
    );

    HandlerOutcome::Started(MeasurementJob {
        request_id: ctx.request_id.clone(),
        mode,
        precision: precision.to_string(),
        duration,
    })
}

/// Handle stopMeasurement
///
/// Only clears the flag; the interrupted job reports its own outcome.
pub fn handle_stop_measurement(state: &mut DeviceState) -> HandlerOutcome {
    match state.stop_measurement() {
        Some(active) => {
            info!(request_id = %active.request_id, "measurement stop requested");
            HandlerOutcome::Completed(json!({
                "stopped": true,
                "requestId": active.request_id,
            }))
        }
        None => HandlerOutcome::Rejected("No active measurement".into()),
    }
}

/// Result payload for a finished measurement, with its headline value
pub fn measurement_payload(job: &MeasurementJob) -> (f64, Value) {
    let value = match job.mode {
        MeasurementMode::Standard => 42.5,
        MeasurementMode::Quick => 37.2,
        MeasurementMode::Detailed => 42.567,
    };

    let mut data = json!({
        "value": value,
        "unit": "mm",
        "precision": job.precision,
        "mode": job.mode.as_str(),
        "timestamp": now_ms(),
    });
    if job.mode == MeasurementMode::Detailed {
        data["details"] = json!({
            "min": 42.1,
            "max": 43.0,
            "stdDev": 0.23,
        });
    }

    (value, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessorConfig;
    use metrolink_shared::{CommandType, RequestId, RequestIdGenerator};
    use std::time::{Duration, Instant};

    fn run(state: &mut DeviceState, params: Value) -> HandlerOutcome {
        let config = ProcessorConfig::default();
        let ids = RequestIdGenerator::new();
        let request_id = RequestId::from("20240425123045123");
        let ctx = HandlerContext {
            config: &config,
            started_at: Instant::now(),
            session_id: 3,
            request_id: &request_id,
            ids: &ids,
        };
        let message = WireMessage::request(CommandType::ExecuteMeasurement, request_id.clone(), Some(params));
        handle_execute_measurement(&ctx, state, &message)
    }

    #[test]
    fn test_measurement_validation() {
        let mut state = DeviceState::default();

        assert_eq!(
            run(&mut state, json!({})),
            HandlerOutcome::Rejected("Missing mode parameter".into())
        );
        assert_eq!(
            run(&mut state, json!({"mode": "slow"})),
            HandlerOutcome::Rejected(
                "Invalid measurement mode: slow. Valid modes are: standard, quick, detailed".into()
            )
        );
        assert!(!state.is_measuring);
    }

    #[test]
    fn test_measurement_starts_once() {
        let mut state = DeviceState::default();

        match run(&mut state, json!({"mode": "detailed", "precision": "high"})) {
            HandlerOutcome::Started(job) => {
                assert_eq!(job.mode, MeasurementMode::Detailed);
                assert_eq!(job.precision, "high");
                assert_eq!(job.duration, Duration::from_secs(6));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(state.is_measuring);

        assert_eq!(
            run(&mut state, json!({"mode": "quick"})),
            HandlerOutcome::Rejected("Measurement already in progress".into())
        );
    }

    #[test]
    fn test_stop_measurement() {
        let mut state = DeviceState::default();
        assert_eq!(
            handle_stop_measurement(&mut state),
            HandlerOutcome::Rejected("No active measurement".into())
        );

        run(&mut state, json!({"mode": "quick"}));
        assert_eq!(
            handle_stop_measurement(&mut state),
            HandlerOutcome::Completed(json!({"stopped": true, "requestId": "20240425123045123"}))
        );
        assert!(!state.is_measuring);
    }

    #[test]
    fn test_payload_shapes() {
        let job = MeasurementJob {
            request_id: RequestId::from("20240425123045123"),
            mode: MeasurementMode::Detailed,
            precision: "normal".into(),
            duration: Duration::from_secs(5),
        };
        let (value, data) = measurement_payload(&job);
        assert_eq!(value, 42.567);
        assert_eq!(data["unit"], "mm");
        assert_eq!(data["details"]["stdDev"], 0.23);

        let quick = MeasurementJob {
            mode: MeasurementMode::Quick,
            ..job
        };
        let (value, data) = measurement_payload(&quick);
        assert_eq!(value, 37.2);
        assert!(data.get("details").is_none());
    }
}
