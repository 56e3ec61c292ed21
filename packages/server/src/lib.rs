//! Server wiring for the synthesis and derivation queues.

pub mod catalog;
pub mod config;
mod init;

pub use config::{AppConfig, ConfigError};
pub use init::{InitError, Runtime, init};
