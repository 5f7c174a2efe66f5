//! Wire message schema shared by the controller and the device
//!
//! A single JSON object shape travels in both directions:
//! ```text
//! { "command", "requestId", "params"?, "status"?, "data"?, "errorMessage"? }
//! ```
//! When decoding, `type` stands in for a missing `command` and `payload` for
//! missing `params`. If both spellings are present the canonical one wins.

use crate::request_id::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical commands understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandType {
    SetMode,
    GetMode,
    StartStream,
    StopStream,
    ExecuteMeasurement,
    StopMeasurement,
    GetStatus,
    GetSurfaceData,
    Unknown,
}

impl CommandType {
    /// Every recognised command, excluding `Unknown`
    pub const ALL: [CommandType; 8] = [
        CommandType::SetMode,
        CommandType::GetMode,
        CommandType::StartStream,
        CommandType::StopStream,
        CommandType::ExecuteMeasurement,
        CommandType::StopMeasurement,
        CommandType::GetStatus,
        CommandType::GetSurfaceData,
    ];

    /// Name used on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            CommandType::SetMode => "setMode",
            CommandType::GetMode => "getMode",
            CommandType::StartStream => "startStream",
            CommandType::StopStream => "stopStream",
            CommandType::ExecuteMeasurement => "executeMeasurement",
            CommandType::StopMeasurement => "stopMeasurement",
            CommandType::GetStatus => "getStatus",
            CommandType::GetSurfaceData => "getSurfaceData",
            CommandType::Unknown => "unknown",
        }
    }

    /// Parse a wire name; unrecognised names map to `Unknown`
    pub fn from_wire(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.wire_name() == name)
            .unwrap_or(CommandType::Unknown)
    }

    /// Commands whose device-side handling outlives the first reply
    pub fn is_long_running(self) -> bool {
        matches!(self, CommandType::ExecuteMeasurement)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Response status vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Success,
    Error,
    Timeout,
    /// Anything outside the closed vocabulary
    Unknown(String),
}

impl Status {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "pending" => Status::Pending,
            "success" => Status::Success,
            "error" => Status::Error,
            "timeout" => Status::Timeout,
            other => Status::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Error => "error",
            Status::Timeout => "timeout",
            Status::Unknown(raw) => raw,
        }
    }

    /// Whether this status ends a request's lifecycle
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

/// One framed message in either direction
///
/// Fields are optional on decode so that incomplete messages can be
/// detected and dropped by the receiver rather than failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "InboundMessage")]
pub struct WireMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Decoding shape that tolerates the legacy `type`/`payload` spellings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundMessage {
    #[serde(default)]
    command: Option<String>,
    #[serde(default, rename = "type")]
    legacy_command: Option<String>,
    #[serde(default)]
    request_id: Option<RequestId>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, rename = "payload")]
    legacy_params: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
}

impl From<InboundMessage> for WireMessage {
    fn from(raw: InboundMessage) -> Self {
        Self {
            command: raw.command.or(raw.legacy_command),
            request_id: raw.request_id,
            params: raw.params.or(raw.legacy_params),
            status: raw.status,
            data: raw.data,
            error_message: raw.error_message,
        }
    }
}

/// Builder helpers for creating messages
impl WireMessage {
    /// Create a command request
    pub fn request(command: CommandType, request_id: RequestId, params: Option<Value>) -> Self {
        Self {
            command: Some(command.wire_name().to_string()),
            request_id: Some(request_id),
            params,
            ..Default::default()
        }
    }

    /// Acknowledge a command whose work continues in the background
    pub fn pending(command: &str, request_id: &RequestId) -> Self {
        Self::response(command, request_id, Status::Pending)
    }

    /// Terminal success, optionally carrying a payload
    pub fn success(command: &str, request_id: &RequestId, data: Option<Value>) -> Self {
        Self {
            data,
            ..Self::response(command, request_id, Status::Success)
        }
    }

    /// Terminal application error
    pub fn error(command: &str, request_id: &RequestId, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::response(command, request_id, Status::Error)
        }
    }

    /// Terminal timeout declared by the device
    pub fn timeout(command: &str, request_id: &RequestId, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::response(command, request_id, Status::Timeout)
        }
    }

    fn response(command: &str, request_id: &RequestId, status: Status) -> Self {
        Self {
            command: Some(command.to_string()),
            request_id: Some(request_id.clone()),
            status: Some(status.as_str().to_string()),
            ..Default::default()
        }
    }

    /// Parsed command type, `Unknown` when absent or unrecognised
    pub fn command_type(&self) -> CommandType {
        self.command
            .as_deref()
            .map(CommandType::from_wire)
            .unwrap_or(CommandType::Unknown)
    }

    /// Parsed status, if the message carries one
    pub fn parsed_status(&self) -> Option<Status> {
        self.status.as_deref().map(Status::from_wire)
    }

    /// Look up a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}
