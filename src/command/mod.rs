//! Command execution infrastructure for the device
//!
//! This module handles:
//! - Validating commands received from controllers
//! - Dispatching to the matching command handler
//! - Acknowledging long-running commands and running them in the background

pub mod handlers;
mod processor;

pub use processor::{CommandProcessor, ProcessorConfig};
