//! mg7d agent library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `mg7d-agent` is used as a binary (main.rs).

pub mod cli;
pub mod instance;
pub mod logging;
pub mod metrics_server;
