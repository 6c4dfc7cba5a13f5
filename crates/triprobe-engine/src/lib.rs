//! triprobe engine crate.
//!
//! Window, device and timer-query plumbing for measuring how long the GPU
//! spends drawing a single triangle.

pub mod core;
pub mod device;
pub mod logging;
pub mod probe;
pub mod window;
