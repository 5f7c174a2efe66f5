//! Command dispatch and response correlation for the controller
//!
//! This module handles:
//! - Registering each outgoing command under its request id
//! - Waiting for the result with a per-call timeout
//! - Routing device responses back to the waiting caller

mod dispatcher;
mod interpret;
mod pending;
mod result;
mod router;

pub use dispatcher::{CommandDispatcher, DispatchError};
pub use interpret::{Interpreter, Verdict};
pub use pending::{PendingEntry, PendingError, PendingSnapshot, PendingTable};
pub use result::{CommandResult, ConsumptionMode};
pub use router::{ResponseRouter, RouteOutcome};
