//! Core infrastructure for oxidized-sync
//!
//! Error types shared by the synchronization crate, the configuration file
//! used by the demonstration pipeline, and logging setup.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{ConfigError, Primitive, Result, SyncError};
