use std::time::Duration;

use thiserror::Error;

use super::ShaderStage;

/// Failure of one step of the probe sequence.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{stage} shader compilation failed:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("shader program link failed: {log}")]
    Link { log: String },

    #[error("timer query result not available after {waited:?} (timeout {timeout:?})")]
    Timeout { waited: Duration, timeout: Duration },

    #[error("timer query was read before a timed draw was submitted")]
    QueryNotIssued,

    #[error("device error during {op}: {message}")]
    Device { op: &'static str, message: String },

    #[error("no surface frame could be acquired for drawing")]
    FrameSkipped,
}

impl ProbeError {
    /// Names the step that failed, for diagnostics.
    pub fn failing_stage(&self) -> &'static str {
        match self {
            ProbeError::Compile { stage: ShaderStage::Vertex, .. } => "vertex",
            ProbeError::Compile { stage: ShaderStage::Fragment, .. } => "fragment",
            ProbeError::Link { .. } => "link",
            ProbeError::Timeout { .. } | ProbeError::QueryNotIssued => "timer query",
            ProbeError::Device { .. } | ProbeError::FrameSkipped => "device",
        }
    }

    pub(crate) fn device(op: &'static str, message: impl ToString) -> Self {
        ProbeError::Device {
            op,
            message: message.to_string(),
        }
    }
}
