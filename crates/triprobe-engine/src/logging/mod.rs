//! Logging utilities.
//!
//! Centralizes `env_logger` setup behind the `log` facade.

mod init;

pub use init::{init_logging, LoggingConfig};
