//! Routes inbound messages back to the caller that issued the request

use super::interpret::{Interpreter, Verdict};
use super::pending::PendingTable;
use metrolink_shared::codec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Undecodable or missing `command` / `requestId`
    Malformed,
    /// No pending entry for the id (never sent, expired or already resolved)
    UnknownRequest,
    /// Intermediate status recorded, caller still waiting
    Acknowledged,
    /// Caller released with a terminal result
    Resolved,
}

/// Applies inbound messages to the pending table
#[derive(Debug, Clone)]
pub struct ResponseRouter {
    pending: Arc<PendingTable>,
}

impl ResponseRouter {
    pub fn new(pending: Arc<PendingTable>) -> Self {
        Self { pending }
    }

    /// Decode a frame body and route it
    pub fn route_frame(&self, body: &[u8]) -> RouteOutcome {
        match codec::decode_message(body) {
            Ok(message) => self.route(&message),
            Err(e) => {
                warn!(error = %e, "dropping undecodable message");
                RouteOutcome::Malformed
            }
        }
    }

    /// Route a decoded message
    pub fn route(&self, message: &metrolink_shared::WireMessage) -> RouteOutcome {
        let (Some(command), Some(request_id)) = (&message.command, &message.request_id) else {
            warn!(?message, "dropping message without command or requestId");
            return RouteOutcome::Malformed;
        };

        let Some(entry) = self.pending.lookup(request_id) else {
            info!(
                request_id = %request_id,
                at = %request_id.readable(),
                command = %command,
                status = message.status.as_deref().unwrap_or("-"),
                "response for unknown or expired request"
            );
            return RouteOutcome::UnknownRequest;
        };

        if message.command_type() != entry.command_type {
            debug!(
                request_id = %request_id,
                expected = %entry.command_type,
                received = %command,
                "response command differs from request"
            );
        }

        let interpreter = Interpreter::for_command(entry.command_type);
        match interpreter.interpret(entry.command_type, entry.mode, message) {
            Verdict::Acknowledge { progress } => {
                debug!(request_id = %request_id, command = %command, "request acknowledged");
                if self.pending.mark_acknowledged(request_id, progress) {
                    RouteOutcome::Acknowledged
                } else {
                    RouteOutcome::UnknownRequest
                }
            }
            Verdict::Resolve { result, resolution } => {
                debug!(
                    request_id = %request_id,
                    command = %command,
                    ?resolution,
                    "request resolved"
                );
                if self.pending.resolve_if_present(request_id, result, resolution) {
                    RouteOutcome::Resolved
                } else {
                    RouteOutcome::UnknownRequest
                }
            }
        }
    }
}
