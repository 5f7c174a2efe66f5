//! Metrolink controller
//!
//! Sends commands to a measurement device and correlates the device's
//! asynchronous responses back to the waiting caller by request id.

pub mod cli;
pub mod client;
pub mod command;
pub mod connection;
pub mod transport;

pub use client::DeviceClient;
pub use command::{CommandResult, ConsumptionMode, DispatchError};
pub use connection::ConnectionConfig;
