#![forbid(unsafe_code)]

//! Debugging client for MCP servers spoken to over stdio.

pub mod client;
pub mod config;
pub mod errors;
pub mod observer;
pub mod rpc;
pub mod schema;
pub mod servers;
pub mod session;

pub use config::InspectorSettings;
pub use errors::{AppError, Result};
