use std::borrow::Cow;
use std::time::Duration;

use super::Vertex;

/// Triangle drawn by the probe, in normalized device coordinates.
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(-0.5, -0.5, 0.0),
    Vertex::new(0.5, -0.5, 0.0),
    Vertex::new(0.0, 0.5, 0.0),
];

/// WGSL sources for the two shader stages.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: Cow::Borrowed(include_str!("shaders/triangle_vs.wgsl")),
            fragment: Cow::Borrowed(include_str!("shaders/triangle_fs.wgsl")),
        }
    }
}

/// Bounds on waiting for a timer query result.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Sleep between two availability checks.
    pub poll_interval: Duration,

    /// Total wait after which the probe gives up with a timeout.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(500),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Probe parameters.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub shaders: ShaderSources,

    /// Linear RGBA the target is cleared to before the draw.
    pub clear_color: [f64; 4],

    pub wait: WaitPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            shaders: ShaderSources::default(),
            clear_color: [0.2, 0.3, 0.3, 1.0],
            wait: WaitPolicy::default(),
        }
    }
}
