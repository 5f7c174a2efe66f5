//! Outcome handed back to the caller of a command

use metrolink_shared::CommandType;
use serde_json::{json, Value};

/// How long a caller waits for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumptionMode {
    /// Wait for a terminal status
    #[default]
    Blocking,
    /// Return on the first acknowledgement; the device keeps working
    NonBlocking,
}

/// Result of a single command
///
/// Starts out neither completed nor timed out and is moved into its
/// terminal shape exactly once.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub completed: bool,
    pub timed_out: bool,
    pub payload: Value,
    pub command_type: CommandType,
    pub error_message: Option<String>,
}

impl CommandResult {
    /// Fresh, unresolved result slot
    pub fn new(command_type: CommandType) -> Self {
        Self {
            completed: false,
            timed_out: false,
            payload: Value::Null,
            command_type,
            error_message: None,
        }
    }

    /// Device reported success
    pub fn success(command_type: CommandType, payload: Value) -> Self {
        Self {
            completed: true,
            payload,
            ..Self::new(command_type)
        }
    }

    /// Device accepted a long-running command that is still in progress
    pub fn accepted(command_type: CommandType, message: &str, progress: Option<Value>) -> Self {
        let mut payload = json!({
            "status": "pending",
            "message": message,
        });
        if let Some(progress) = progress {
            payload["progress"] = progress;
        }
        Self::success(command_type, payload)
    }

    /// Device rejected or failed the command
    pub fn failure(command_type: CommandType, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(command_type)
        }
    }

    /// Device declared a timeout
    pub fn remote_timeout(command_type: CommandType, message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(command_type, message)
        }
    }

    /// The connection ended before a terminal reply
    pub fn connection_closed(command_type: CommandType, reason: impl Into<String>) -> Self {
        Self::failure(command_type, reason)
    }

    /// Turn a partially filled slot into a local timeout
    pub fn into_local_timeout(mut self) -> Self {
        self.completed = false;
        self.timed_out = true;
        self.error_message = Some("Request timed out".into());
        self
    }

    /// Completed without an error or timeout
    pub fn is_success(&self) -> bool {
        self.completed && !self.timed_out && self.error_message.is_none()
    }
}
