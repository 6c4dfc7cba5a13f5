//! GPU timing probe.
//!
//! Compiles a shader pair, uploads one triangle and measures the device time of
//! a single draw with a timer query. The sequence is written against
//! [`GpuBackend`]; [`WgpuBackend`] drives a real device.
//!
//! Handles are released by `Drop`, so every early return releases whatever was
//! created before it.

mod backend;
mod config;
mod error;
mod sequence;
mod timer;
mod wgpu_backend;
pub mod wgsl;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{GpuBackend, ShaderStage, Vertex};
pub use config::{ProbeConfig, ShaderSources, WaitPolicy, TRIANGLE};
pub use error::ProbeError;
pub use sequence::{run_probe, Scene, SceneOf};
pub use timer::{wait_until_available, Measurement};
pub use wgpu_backend::{
    WgpuBackend, WgpuProgram, WgpuScene, WgpuShader, WgpuTimerQuery, WgpuVertexBuffer,
};
