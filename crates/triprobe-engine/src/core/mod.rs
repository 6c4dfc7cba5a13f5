//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop) and
//! the binary that reports the measurement.

mod app;

pub use app::{App, AppControl};
