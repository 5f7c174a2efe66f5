//! Session management for connected controllers
//!
//! This module handles:
//! - Reading framed commands from each controller connection
//! - Writing replies back on the same connection
//! - Stopping and joining a session's measurements when it disconnects

mod connection;
mod manager;

pub use connection::{serve_connection, ControllerSession, SessionHandle};
pub use manager::{SessionInfo, SessionManager};
