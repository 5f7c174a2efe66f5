//! Command processor - validates inbound commands and runs them against the device

use super::handlers::{self, HandlerContext, HandlerOutcome, MeasurementJob};
use crate::session::SessionHandle;
use crate::state::{DeviceState, MeasurementMode, MeasurementRecord};
use metrolink_shared::{timing, CommandType, RequestIdGenerator, WireMessage};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info, warn};

const INTERRUPTED: &str = "Measurement was interrupted";
const REMOTE_TIMEOUT: &str = "Measurement operation timed out";

/// Configuration for the command processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Reported in getStatus
    pub device_id: String,
    pub firmware_version: String,
    /// How often a running measurement checks its stop signal
    pub poll_interval: Duration,
    pub quick_duration: Duration,
    pub standard_duration: Duration,
    pub detailed_duration: Duration,
    /// Added for `high` and `very-high` precision
    pub precision_extra: Duration,
    /// How long an injected timeout takes to surface
    pub remote_timeout_window: Duration,
    /// Probability in [0, 1] that a measurement ends in a device-side timeout
    pub timeout_injection_rate: f64,
    pub calibrated: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            device_id: "DEV12345".into(),
            firmware_version: "2.5.1".into(),
            poll_interval: Duration::from_millis(timing::STOP_POLL_INTERVAL_MS),
            quick_duration: Duration::from_secs(1),
            standard_duration: Duration::from_secs(3),
            detailed_duration: Duration::from_secs(5),
            precision_extra: Duration::from_secs(1),
            remote_timeout_window: Duration::from_millis(timing::REMOTE_TIMEOUT_WINDOW_MS),
            timeout_injection_rate: timing::TIMEOUT_INJECTION_RATE,
            calibrated: true,
        }
    }
}

impl ProcessorConfig {
    /// Simulated work time for a measurement
    pub fn measurement_duration(&self, mode: MeasurementMode, precision: &str) -> Duration {
        let base = match mode {
            MeasurementMode::Quick => self.quick_duration,
            MeasurementMode::Standard => self.standard_duration,
            MeasurementMode::Detailed => self.detailed_duration,
        };
        match precision {
            "high" | "very-high" => base + self.precision_extra,
            _ => base,
        }
    }

    fn roll_remote_timeout(&self) -> bool {
        let rate = self.timeout_injection_rate;
        if rate.is_nan() || rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(rate.min(1.0))
    }
}

/// Executes commands received from controllers
pub struct CommandProcessor {
    config: ProcessorConfig,
    state: Arc<Mutex<DeviceState>>,
    started_at: Instant,
    ids: RequestIdGenerator,
}

impl CommandProcessor {
    /// Create a new command processor
    pub fn new(config: ProcessorConfig) -> Self {
        let state = DeviceState::new(config.calibrated);
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            started_at: Instant::now(),
            ids: RequestIdGenerator::new(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Copy of the current device state
    pub async fn snapshot(&self) -> DeviceState {
        self.state.lock().await.clone()
    }

    /// Handle one inbound message and send the immediate reply
    ///
    /// Long-running commands get a `pending` acknowledgement here and their
    /// terminal reply from a task spawned on the session.
    pub async fn handle(&self, session: &SessionHandle, message: WireMessage) {
        let (Some(command), Some(request_id)) = (message.command.clone(), message.request_id.clone())
        else {
            warn!(session = session.id, "dropping message without command or requestId");
            return;
        };

        info!(
            session = session.id,
            request_id = %request_id,
            at = %request_id.readable(),
            command = %command,
            "received command"
        );

        let outcome = {
            let mut state = self.state.lock().await;
            let ctx = HandlerContext {
                config: &self.config,
                started_at: self.started_at,
                session_id: session.id,
                request_id: &request_id,
                ids: &self.ids,
            };

            match message.command_type() {
                CommandType::SetMode => handlers::handle_set_mode(&mut state, &message),
                CommandType::GetMode => handlers::handle_get_mode(&state),
                CommandType::StartStream => handlers::handle_start_stream(&ctx, &mut state, &message),
                CommandType::StopStream => handlers::handle_stop_stream(&mut state),
                CommandType::ExecuteMeasurement => {
                    handlers::handle_execute_measurement(&ctx, &mut state, &message)
                }
                CommandType::StopMeasurement => handlers::handle_stop_measurement(&mut state),
                CommandType::GetStatus => handlers::handle_get_status(&ctx, &state),
                CommandType::GetSurfaceData => handlers::handle_get_surface_data(&state),
                CommandType::Unknown => HandlerOutcome::Rejected(format!("Unknown command: {command}")),
            }
        };

        let reply = match outcome {
            HandlerOutcome::Completed(data) => WireMessage::success(&command, &request_id, Some(data)),
            HandlerOutcome::Rejected(reason) => {
                info!(request_id = %request_id, command = %command, %reason, "command rejected");
                WireMessage::error(&command, &request_id, reason)
            }
            HandlerOutcome::Started(job) => {
                // The acknowledgement goes out before the job can possibly finish
                if let Err(e) = session.send(&WireMessage::pending(&command, &request_id)).await {
                    warn!(request_id = %request_id, error = %e, "failed to acknowledge measurement");
                }

                let remote_timeout = self
                    .config
                    .roll_remote_timeout()
                    .then_some(self.config.remote_timeout_window);
                session.spawn(run_measurement(
                    self.state.clone(),
                    session.clone(),
                    command,
                    job,
                    self.config.poll_interval,
                    remote_timeout,
                ));
                return;
            }
        };

        if let Err(e) = session.send(&reply).await {
            warn!(request_id = %request_id, error = %e, "failed to send reply");
        }
    }

    /// Signal the measurement started by `session_id`, if any, to stop
    pub async fn cancel_session(&self, session_id: u64) -> bool {
        let stopped = self.state.lock().await.stop_measurement_for_session(session_id);
        match stopped {
            Some(active) => {
                info!(
                    session = session_id,
                    request_id = %active.request_id,
                    "stopping measurement of closed session"
                );
                true
            }
            None => false,
        }
    }
}

/// Background measurement: polls the stop signal until the work is done
///
/// With `remote_timeout` set the job ends in a device-side timeout after
/// that window instead of producing a value.
async fn run_measurement(
    state: Arc<Mutex<DeviceState>>,
    session: SessionHandle,
    command: String,
    job: MeasurementJob,
    poll_interval: Duration,
    remote_timeout: Option<Duration>,
) {
    let work = remote_timeout.unwrap_or(job.duration);
    let poll = poll_interval.max(Duration::from_millis(1));
    let started = Instant::now();
    let mut reported_secs = 0;

    if remote_timeout.is_some() {
        debug!(request_id = %job.request_id, "measurement will report a timeout");
    }

    loop {
        if !state.lock().await.owns_measurement(&job.request_id) {
            return send_interrupted(&session, &command, &job).await;
        }

        let elapsed = started.elapsed();
        if elapsed >= work {
            break;
        }

        let secs = elapsed.as_secs();
        if secs > reported_secs {
            reported_secs = secs;
            debug!(
                request_id = %job.request_id,
                elapsed_s = secs,
                total_ms = work.as_millis() as u64,
                "measurement in progress"
            );
        }

        time::sleep(poll.min(work - elapsed)).await;
    }

    let reply = {
        let mut state = state.lock().await;
        if !state.owns_measurement(&job.request_id) {
            None
        } else {
            state.stop_measurement();
            match remote_timeout {
                Some(_) => Some(WireMessage::timeout(&command, &job.request_id, REMOTE_TIMEOUT)),
                None => {
                    let (value, data) = handlers::measurement_payload(&job);
                    state.last_measurement = Some(MeasurementRecord {
                        request_id: job.request_id.clone(),
                        mode: job.mode,
                        value,
                    });
                    Some(WireMessage::success(&command, &job.request_id, Some(data)))
                }
            }
        }
    };

    let Some(reply) = reply else {
        return send_interrupted(&session, &command, &job).await;
    };

    info!(
        request_id = %job.request_id,
        status = reply.status.as_deref().unwrap_or("-"),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "measurement finished"
    );
    if let Err(e) = session.send(&reply).await {
        debug!(request_id = %job.request_id, error = %e, "measurement result not delivered");
    }
}

async fn send_interrupted(session: &SessionHandle, command: &str, job: &MeasurementJob) {
    info!(request_id = %job.request_id, "measurement interrupted");
    let reply = WireMessage::error(command, &job.request_id, INTERRUPTED);
    if let Err(e) = session.send(&reply).await {
        debug!(request_id = %job.request_id, error = %e, "interruption not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrolink_shared::{codec, RequestId, Status};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn fast_config() -> ProcessorConfig {
        ProcessorConfig {
            poll_interval: Duration::from_millis(10),
            quick_duration: Duration::from_millis(50),
            standard_duration: Duration::from_millis(100),
            detailed_duration: Duration::from_millis(150),
            precision_extra: Duration::from_millis(20),
            remote_timeout_window: Duration::from_millis(60),
            timeout_injection_rate: 0.0,
            ..Default::default()
        }
    }

    fn session() -> (SessionHandle, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (_reader, writer) = tokio::io::split(local);
        (SessionHandle::new(1, "test".into(), writer), remote)
    }

    async fn recv(remote: &mut DuplexStream) -> WireMessage {
        let len = remote.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        remote.read_exact(&mut body).await.unwrap();
        codec::decode_message(&body).unwrap()
    }

    fn request(command: CommandType, id: &str, params: Option<serde_json::Value>) -> WireMessage {
        WireMessage::request(command, RequestId::from(id), params)
    }

    #[test]
    fn test_measurement_durations() {
        let config = ProcessorConfig::default();
        assert_eq!(
            config.measurement_duration(MeasurementMode::Quick, "normal"),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.measurement_duration(MeasurementMode::Standard, "very-high"),
            Duration::from_secs(4)
        );
        assert_eq!(
            config.measurement_duration(MeasurementMode::Detailed, "low"),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_injection_rate_bounds() {
        let mut config = ProcessorConfig::default();
        config.timeout_injection_rate = 0.0;
        assert!(!config.roll_remote_timeout());
        config.timeout_injection_rate = f64::NAN;
        assert!(!config.roll_remote_timeout());
        config.timeout_injection_rate = 2.0;
        assert!(config.roll_remote_timeout());
    }

    #[tokio::test]
    async fn test_measurement_pending_then_success() {
        let processor = CommandProcessor::new(fast_config());
        let (session, mut remote) = session();

        processor
            .handle(
                &session,
                request(CommandType::ExecuteMeasurement, "20240425123045123", Some(json!({"mode": "quick"}))),
            )
            .await;

        let ack = recv(&mut remote).await;
        assert_eq!(ack.parsed_status(), Some(Status::Pending));
        assert!(processor.snapshot().await.is_measuring);

        let done = recv(&mut remote).await;
        assert_eq!(done.parsed_status(), Some(Status::Success));
        assert_eq!(done.request_id, Some(RequestId::from("20240425123045123")));
        let data = done.data.unwrap();
        assert_eq!(data["value"], 37.2);
        assert_eq!(data["unit"], "mm");
        assert_eq!(data["precision"], "normal");

        session.join_tasks().await;
        let state = processor.snapshot().await;
        assert!(!state.is_measuring);
        let record = state.last_measurement.expect("completed measurement is recorded");
        assert_eq!(record.request_id, RequestId::from("20240425123045123"));
        assert_eq!(record.mode, MeasurementMode::Quick);
        assert_eq!(record.value, 37.2);
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_measurement() {
        let mut config = fast_config();
        config.standard_duration = Duration::from_secs(10);
        let processor = CommandProcessor::new(config);
        let (session, mut remote) = session();

        processor
            .handle(
                &session,
                request(CommandType::ExecuteMeasurement, "20240425123045100", Some(json!({"mode": "standard"}))),
            )
            .await;
        assert_eq!(recv(&mut remote).await.parsed_status(), Some(Status::Pending));

        let stopped_at = Instant::now();
        processor
            .handle(&session, request(CommandType::StopMeasurement, "20240425123045200", None))
            .await;

        // Both replies race to the wire; tell them apart by request id
        let first = recv(&mut remote).await;
        let second = recv(&mut remote).await;
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        let (stop_reply, interrupted) =
            if first.request_id == Some(RequestId::from("20240425123045200")) {
                (first, second)
            } else {
                (second, first)
            };

        assert_eq!(stop_reply.parsed_status(), Some(Status::Success));
        assert_eq!(stop_reply.data.unwrap()["requestId"], "20240425123045100");
        assert_eq!(interrupted.request_id, Some(RequestId::from("20240425123045100")));
        assert_eq!(interrupted.parsed_status(), Some(Status::Error));
        assert_eq!(interrupted.error_message.as_deref(), Some(INTERRUPTED));

        session.join_tasks().await;
        assert!(processor.snapshot().await.last_measurement.is_none());
    }

    #[tokio::test]
    async fn test_injected_remote_timeout() {
        let mut config = fast_config();
        config.timeout_injection_rate = 1.0;
        let processor = CommandProcessor::new(config);
        let (session, mut remote) = session();

        processor
            .handle(
                &session,
                request(CommandType::ExecuteMeasurement, "20240425123045123", Some(json!({"mode": "detailed"}))),
            )
            .await;

        assert_eq!(recv(&mut remote).await.parsed_status(), Some(Status::Pending));
        let reply = recv(&mut remote).await;
        assert_eq!(reply.parsed_status(), Some(Status::Timeout));
        assert_eq!(reply.error_message.as_deref(), Some(REMOTE_TIMEOUT));

        session.join_tasks().await;
        assert!(!processor.snapshot().await.is_measuring);
    }

    #[tokio::test]
    async fn test_cancel_session_stops_its_measurement() {
        let mut config = fast_config();
        config.quick_duration = Duration::from_secs(10);
        let processor = CommandProcessor::new(config);
        let (session, mut remote) = session();

        processor
            .handle(
                &session,
                request(CommandType::ExecuteMeasurement, "20240425123045123", Some(json!({"mode": "quick"}))),
            )
            .await;
        assert_eq!(recv(&mut remote).await.parsed_status(), Some(Status::Pending));

        assert!(!processor.cancel_session(99).await);
        assert!(processor.cancel_session(session.id).await);

        time::timeout(Duration::from_secs(1), session.join_tasks())
            .await
            .expect("measurement task should finish promptly");
        assert!(!processor.snapshot().await.is_measuring);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_commands() {
        let processor = CommandProcessor::new(fast_config());
        let (session, mut remote) = session();

        let calibrate = WireMessage {
            command: Some("calibrate".into()),
            request_id: Some(RequestId::from("20240425123045123")),
            ..Default::default()
        };
        processor.handle(&session, calibrate).await;
        let reply = recv(&mut remote).await;
        assert_eq!(reply.command.as_deref(), Some("calibrate"));
        assert_eq!(reply.error_message.as_deref(), Some("Unknown command: calibrate"));

        processor
            .handle(
                &session,
                request(CommandType::SetMode, "20240425123045124", Some(json!({"mode": "bogus"}))),
            )
            .await;
        let reply = recv(&mut remote).await;
        assert_eq!(reply.parsed_status(), Some(Status::Error));
        assert_eq!(
            reply.error_message.as_deref(),
            Some("Invalid mode: bogus. Valid modes are: continuous, trigger, snapshot")
        );

        let status = processor.snapshot().await;
        assert!(status.is_calibrated);
        assert!(!status.is_measuring);
    }
}
