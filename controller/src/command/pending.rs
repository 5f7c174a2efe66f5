//! In-flight request table shared by the dispatcher and the router

use super::result::{CommandResult, ConsumptionMode};
use metrolink_shared::state_machine::{
    RequestEvent, RequestLifecycle, RequestState, Resolution,
};
use metrolink_shared::{CommandType, RequestId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PendingError {
    #[error("Request id {0} is already pending")]
    DuplicateRequestId(RequestId),
}

/// Tracks a sent command awaiting its terminal reply
#[derive(Debug)]
pub struct PendingEntry {
    pub command_type: CommandType,
    pub mode: ConsumptionMode,
    pub registered_at: Instant,
    lifecycle: RequestLifecycle,
    result: CommandResult,
    waiter: oneshot::Sender<CommandResult>,
}

impl PendingEntry {
    /// Create an entry and the receiver its caller waits on
    pub fn new(
        command_type: CommandType,
        mode: ConsumptionMode,
    ) -> (Self, oneshot::Receiver<CommandResult>) {
        let (waiter, rx) = oneshot::channel();
        let entry = Self {
            command_type,
            mode,
            registered_at: Instant::now(),
            lifecycle: RequestLifecycle::new(),
            result: CommandResult::new(command_type),
            waiter,
        };
        (entry, rx)
    }

    pub fn state(&self) -> RequestState {
        self.lifecycle.state()
    }

    pub fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Move to a terminal state and hand the result to the waiting caller
    fn finish(mut self, result: CommandResult, resolution: Resolution) -> Result<(), Self> {
        let transition = self.lifecycle.process_event(RequestEvent::Resolved(resolution));
        if !transition.is_success() {
            return Err(self);
        }

        // The caller may have given up already; nothing left to notify then
        let _ = self.waiter.send(result);
        Ok(())
    }
}

/// Read-only view of an entry used by the router to pick an interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub command_type: CommandType,
    pub mode: ConsumptionMode,
    pub state: RequestState,
}

/// Map of request id to in-flight request
///
/// Every mutation happens under one lock, which is never held across an
/// await point. Removal is the single linearization point: whichever of
/// resolve, expire or drain removes an entry first wins, and the others
/// observe an absent id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, PendingEntry>> {
        // Entries stay consistent even if a holder panicked mid-call
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new in-flight request
    pub fn register(&self, id: RequestId, entry: PendingEntry) -> Result<(), PendingError> {
        let mut entries = self.entries();
        if entries.contains_key(&id) {
            return Err(PendingError::DuplicateRequestId(id));
        }
        debug!(request_id = %id, command = %entry.command_type, "registered pending request");
        entries.insert(id, entry);
        Ok(())
    }

    /// Look up an entry without removing it
    pub fn lookup(&self, id: &RequestId) -> Option<PendingSnapshot> {
        self.entries().get(id).map(|entry| PendingSnapshot {
            command_type: entry.command_type,
            mode: entry.mode,
            state: entry.state(),
        })
    }

    /// Resolve and remove an entry if it is still present
    ///
    /// Returns false when the id is absent (already resolved, expired or
    /// drained), which callers treat as a no-op.
    pub fn resolve_if_present(
        &self,
        id: &RequestId,
        result: CommandResult,
        resolution: Resolution,
    ) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.remove(id) else {
            return false;
        };

        match entry.finish(result, resolution) {
            Ok(()) => true,
            Err(entry) => {
                warn!(
                    request_id = %id,
                    state = ?entry.state(),
                    ?resolution,
                    "rejected resolution for request"
                );
                entries.insert(id.clone(), entry);
                false
            }
        }
    }

    /// Record a `pending` acknowledgement without removing the entry
    pub fn mark_acknowledged(&self, id: &RequestId, progress: Option<Value>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };

        if !entry.lifecycle.process_event(RequestEvent::Acknowledged).is_success() {
            return false;
        }

        if let Some(progress) = progress {
            entry.result.payload = progress;
        }
        true
    }

    /// Remove an entry on the caller's timeout path
    ///
    /// Returns the local-timeout result if this call removed the entry, or
    /// `None` if a resolution (or drain) got there first. In the latter
    /// case the winning result has already been delivered to the waiter.
    pub fn expire_and_remove(&self, id: &RequestId) -> Option<CommandResult> {
        let mut entries = self.entries();
        let entry = entries.remove(id)?;
        warn!(
            request_id = %id,
            command = %entry.command_type,
            state = ?entry.state(),
            age_ms = entry.age().as_millis() as u64,
            "pending request expired"
        );

        let result = entry.result.clone().into_local_timeout();
        match entry.finish(result.clone(), Resolution::LocalTimeout) {
            Ok(()) => Some(result),
            Err(entry) => {
                // Unreachable while removal gates resolution; keep the entry visible
                entries.insert(id.clone(), entry);
                None
            }
        }
    }

    /// Resolve every pending entry with a connection-closed result
    pub fn drain_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingEntry)> = self.entries().drain().collect();
        let count = drained.len();

        for (id, entry) in drained {
            let result = CommandResult::connection_closed(entry.command_type, reason);
            if entry.finish(result, Resolution::ConnectionClosed).is_err() {
                warn!(request_id = %id, "pending request was already resolved during drain");
            }
        }

        count
    }

    /// Drop an entry whose caller stopped waiting
    pub fn discard(&self, id: &RequestId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Number of requests currently in flight
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries().contains_key(id)
    }
}
