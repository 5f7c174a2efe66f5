//! Per-command interpretation of response messages
//!
//! Each interpreter classifies a response status into either an
//! acknowledgement (keep waiting) or a terminal result for the caller.

use super::result::{CommandResult, ConsumptionMode};
use metrolink_shared::state_machine::Resolution;
use metrolink_shared::{CommandType, Status, WireMessage};
use serde_json::{json, Value};

/// What the router should do with a message
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Intermediate status; the caller keeps waiting
    Acknowledge { progress: Option<Value> },
    /// Terminal for the caller
    Resolve {
        result: CommandResult,
        resolution: Resolution,
    },
}

/// Response interpreter family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Measurement,
    Mode,
    Status,
    Generic,
}

impl Interpreter {
    /// Pick the interpreter for a command
    pub fn for_command(command: CommandType) -> Self {
        match command {
            CommandType::ExecuteMeasurement => Interpreter::Measurement,
            CommandType::SetMode | CommandType::GetMode => Interpreter::Mode,
            CommandType::GetStatus => Interpreter::Status,
            _ => Interpreter::Generic,
        }
    }

    fn timeout_message(self) -> &'static str {
        match self {
            Interpreter::Measurement => "Measurement operation timed out",
            Interpreter::Mode => "Stream mode operation timed out",
            Interpreter::Status => "Device status query timed out",
            Interpreter::Generic => "Operation timed out",
        }
    }

    fn accepted_message(self) -> &'static str {
        match self {
            Interpreter::Measurement => "Measurement request accepted and in progress",
            _ => "Request accepted and in progress",
        }
    }

    fn success_payload(self, data: Option<Value>) -> Value {
        match (self, data) {
            // Only the mode value itself is surfaced to callers
            (Interpreter::Mode, Some(data)) => match data.get("mode") {
                Some(mode) => json!({ "mode": mode }),
                None => data,
            },
            (_, data) => data.unwrap_or(Value::Null),
        }
    }

    /// Classify one response for a request of `command` waiting in `mode`
    pub fn interpret(
        self,
        command: CommandType,
        mode: ConsumptionMode,
        message: &WireMessage,
    ) -> Verdict {
        let status = match message.parsed_status() {
            Some(status) => status,
            None => {
                return resolve(
                    CommandResult::failure(command, "Unknown status: (missing)"),
                    Resolution::Error,
                )
            }
        };

        match status {
            Status::Pending => match mode {
                ConsumptionMode::NonBlocking => resolve(
                    CommandResult::accepted(command, self.accepted_message(), message.data.clone()),
                    Resolution::Accepted,
                ),
                ConsumptionMode::Blocking => Verdict::Acknowledge {
                    progress: message.data.clone(),
                },
            },
            Status::Success => resolve(
                CommandResult::success(command, self.success_payload(message.data.clone())),
                Resolution::Success,
            ),
            Status::Error => resolve(
                CommandResult::failure(
                    command,
                    message
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Unknown error".into()),
                ),
                Resolution::Error,
            ),
            Status::Timeout => resolve(
                CommandResult::remote_timeout(
                    command,
                    message
                        .error_message
                        .clone()
                        .unwrap_or_else(|| self.timeout_message().into()),
                ),
                Resolution::RemoteTimeout,
            ),
            Status::Unknown(raw) => resolve(
                CommandResult::failure(command, format!("Unknown status: {raw}")),
                Resolution::Error,
            ),
        }
    }
}

fn resolve(result: CommandResult, resolution: Resolution) -> Verdict {
    Verdict::Resolve { result, resolution }
}
