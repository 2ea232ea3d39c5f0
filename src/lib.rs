#![forbid(unsafe_code)]

//! Per-host worker agent for checkpoint/restore-capable containers.

pub mod api;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod ports;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod status_channel;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
