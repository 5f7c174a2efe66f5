//! Connection to a single device
//!
//! This module handles:
//! - Writing outbound command frames from a bounded channel
//! - Splitting inbound bytes into frames and handing them to the router
//! - Resolving every pending request once the connection ends

mod manager;

pub use manager::{Connection, ConnectionConfig, CONNECTION_CLOSED};
