//! Device state shared by command handlers and running measurements

use metrolink_shared::RequestId;
use std::fmt;

/// How the device streams data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    Continuous,
    Trigger,
    Snapshot,
}

impl StreamMode {
    pub const ALL: [StreamMode; 3] = [StreamMode::Continuous, StreamMode::Trigger, StreamMode::Snapshot];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamMode::Continuous => "continuous",
            StreamMode::Trigger => "trigger",
            StreamMode::Snapshot => "snapshot",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == raw)
    }

    /// Comma separated list used in validation errors
    pub fn valid_names() -> String {
        Self::ALL.map(StreamMode::as_str).join(", ")
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement profile requested by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementMode {
    Standard,
    Quick,
    Detailed,
}

impl MeasurementMode {
    pub const ALL: [MeasurementMode; 3] = [
        MeasurementMode::Standard,
        MeasurementMode::Quick,
        MeasurementMode::Detailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementMode::Standard => "standard",
            MeasurementMode::Quick => "quick",
            MeasurementMode::Detailed => "detailed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == raw)
    }

    pub fn valid_names() -> String {
        Self::ALL.map(MeasurementMode::as_str).join(", ")
    }
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The measurement currently running, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMeasurement {
    pub request_id: RequestId,
    pub session_id: u64,
}

/// Last completed measurement, kept for surface data queries
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub request_id: RequestId,
    pub mode: MeasurementMode,
    pub value: f64,
}

/// Mutable device state
///
/// `is_measuring` doubles as the stop signal: a stop command clears it and
/// the running measurement observes the change on its next poll.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub stream_mode: StreamMode,
    pub is_streaming: bool,
    pub stream_id: Option<RequestId>,
    pub is_measuring: bool,
    pub is_calibrated: bool,
    pub active_measurement: Option<ActiveMeasurement>,
    pub last_measurement: Option<MeasurementRecord>,
}

impl DeviceState {
    pub fn new(is_calibrated: bool) -> Self {
        Self {
            is_calibrated,
            ..Default::default()
        }
    }

    /// Whether the measurement for `request_id` may keep running
    pub fn owns_measurement(&self, request_id: &RequestId) -> bool {
        self.is_measuring
            && self
                .active_measurement
                .as_ref()
                .is_some_and(|active| &active.request_id == request_id)
    }

    /// Mark a measurement as running
    pub fn begin_measurement(&mut self, request_id: RequestId, session_id: u64) {
        self.is_measuring = true;
        self.active_measurement = Some(ActiveMeasurement {
            request_id,
            session_id,
        });
    }

    /// Clear the running measurement, returning it
    pub fn stop_measurement(&mut self) -> Option<ActiveMeasurement> {
        if !self.is_measuring {
            return None;
        }
        self.is_measuring = false;
        self.active_measurement.take()
    }

    /// Stop the running measurement if `session_id` started it
    pub fn stop_measurement_for_session(&mut self, session_id: u64) -> Option<ActiveMeasurement> {
        match &self.active_measurement {
            Some(active) if active.session_id == session_id => self.stop_measurement(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(StreamMode::parse("trigger"), Some(StreamMode::Trigger));
        assert_eq!(StreamMode::parse("bogus"), None);
        assert_eq!(StreamMode::valid_names(), "continuous, trigger, snapshot");
        assert_eq!(MeasurementMode::valid_names(), "standard, quick, detailed");
        assert_eq!(StreamMode::default(), StreamMode::Continuous);
    }

    #[test]
    fn test_measurement_ownership() {
        let mut state = DeviceState::new(true);
        let id = RequestId::from("20240425123045123");
        assert!(!state.owns_measurement(&id));

        state.begin_measurement(id.clone(), 7);
        assert!(state.owns_measurement(&id));
        assert!(!state.owns_measurement(&RequestId::from("20240425123045999")));

        assert!(state.stop_measurement_for_session(8).is_none());
        assert!(state.owns_measurement(&id));

        let stopped = state.stop_measurement_for_session(7).unwrap();
        assert_eq!(stopped.request_id, id);
        assert!(!state.is_measuring);
        assert!(state.stop_measurement().is_none());
    }
}
