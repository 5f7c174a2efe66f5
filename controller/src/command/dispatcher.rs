//! Command dispatcher for sending commands to the device

use super::pending::{PendingEntry, PendingError, PendingTable};
use super::result::{CommandResult, ConsumptionMode};
use crate::connection::CONNECTION_CLOSED;
use bytes::Bytes;
use metrolink_shared::codec::{self, CodecError};
use metrolink_shared::{CommandType, RequestId, RequestIdGenerator, WireMessage};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};

/// Failures that prevent a command from being sent at all
///
/// None of these leave an entry in the pending table.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Not connected to device")]
    NotConnected,

    #[error("Failed to send command: {0}")]
    SendFailed(String),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] CodecError),

    #[error("Request id {0} is already pending")]
    DuplicateRequestId(RequestId),
}

impl From<PendingError> for DispatchError {
    fn from(err: PendingError) -> Self {
        match err {
            PendingError::DuplicateRequestId(id) => DispatchError::DuplicateRequestId(id),
        }
    }
}

/// Removes the entry if the caller's future is dropped mid-wait
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.discard(self.id) {
            debug!(request_id = %self.id, "caller stopped waiting; request discarded");
        }
    }
}

/// Sends commands to the device and waits for their results
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    pending: Arc<PendingTable>,
    outbound: mpsc::Sender<Bytes>,
    connected: Arc<AtomicBool>,
    ids: RequestIdGenerator,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(
        pending: Arc<PendingTable>,
        outbound: mpsc::Sender<Bytes>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pending,
            outbound,
            connected,
            ids: RequestIdGenerator::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    /// Get count of pending commands
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send a command and wait for its outcome
    ///
    /// Returns `Err` only when the command never left; every outcome that
    /// can be attributed to the request is an `Ok(CommandResult)`.
    pub async fn send_command(
        &self,
        command: CommandType,
        params: Option<Value>,
        timeout: Duration,
        mode: ConsumptionMode,
    ) -> Result<CommandResult, DispatchError> {
        let mode = if command.is_long_running() {
            mode
        } else {
            if mode == ConsumptionMode::NonBlocking {
                debug!(command = %command, "non-blocking ignored for instantaneous command");
            }
            ConsumptionMode::Blocking
        };

        let request_id = self.ids.next();
        let frame = codec::encode(&WireMessage::request(command, request_id.clone(), params))?;

        if !self.connected.load(Ordering::SeqCst) {
            return Err(DispatchError::NotConnected);
        }

        // Claim channel capacity first so a closed connection never leaves a table entry
        let permit = match self.outbound.reserve().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err(if self.connected.load(Ordering::SeqCst) {
                    DispatchError::SendFailed("outbound channel closed".into())
                } else {
                    DispatchError::NotConnected
                })
            }
        };

        let (entry, mut rx) = PendingEntry::new(command, mode);
        self.pending.register(request_id.clone(), entry)?;
        let _guard = PendingGuard {
            table: self.pending.as_ref(),
            id: &request_id,
        };

        permit.send(frame);

        // The connection may have been drained between reserve and register
        if !self.connected.load(Ordering::SeqCst) && self.pending.discard(&request_id) {
            return Ok(CommandResult::connection_closed(command, CONNECTION_CLOSED));
        }
        info!(
            request_id = %request_id,
            at = %request_id.readable(),
            command = %command,
            ?mode,
            "sent command"
        );

        let result = match time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => CommandResult::connection_closed(command, CONNECTION_CLOSED),
            Err(_) => match self.pending.expire_and_remove(&request_id) {
                Some(result) => {
                    info!(
                        request_id = %request_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "command timed out locally"
                    );
                    result
                }
                // A resolution won the race and already filled the slot
                None => rx
                    .try_recv()
                    .unwrap_or_else(|_| CommandResult::connection_closed(command, CONNECTION_CLOSED)),
            },
        };

        debug!(
            request_id = %request_id,
            command = %command,
            completed = result.completed,
            timed_out = result.timed_out,
            "command finished"
        );
        Ok(result)
    }
}
