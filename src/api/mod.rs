//! API Module
//!
//! Entry points used by the CLI. Library errors are typed; this layer
//! flattens them into `anyhow::Error` with context.

pub mod commands;

pub use commands::*;
