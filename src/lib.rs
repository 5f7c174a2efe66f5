//! Metrolink device
//!
//! Serves controller commands over TCP: instantaneous commands are answered
//! directly, measurements are acknowledged and then run as cancellable
//! background tasks that report their own terminal outcome.

pub mod command;
pub mod server;
pub mod session;
pub mod state;

pub use command::{CommandProcessor, ProcessorConfig};
pub use server::DeviceServer;
pub use session::{serve_connection, SessionManager};
pub use state::DeviceState;
