use std::fmt;

use bytemuck::{Pod, Zeroable};

use super::ProbeError;

/// Programmable stage a shader object is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Entry point every shader of this stage must declare.
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }

    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// One triangle corner in normalized device coordinates.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
}

impl Vertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { position: [x, y, z] }
    }

    /// Attributes the vertex buffer feeds to the vertex stage.
    pub fn attributes() -> &'static [wgpu::VertexAttribute] {
        &Self::ATTRS
    }

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Device calls sequenced by [`run_probe`](super::run_probe).
///
/// Each handle type releases its device object when dropped, so a handle can
/// only be released once and never used afterwards. Implementations must not
/// release handles anywhere else.
pub trait GpuBackend {
    /// Transient compiled shader object.
    type Shader;

    /// Linked vertex + fragment program.
    type Program;

    /// Device-side vertex storage plus its layout.
    type VertexBuffer;

    /// Elapsed-time query object.
    type TimerQuery;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, ProbeError>;

    fn link_program(
        &self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, ProbeError>;

    fn upload_vertices(&self, vertices: &[Vertex]) -> Result<Self::VertexBuffer, ProbeError>;

    fn create_timer_query(&self) -> Result<Self::TimerQuery, ProbeError>;

    /// Clears the target and submits one draw of `vertices`.
    ///
    /// With `timer`, the draw is bracketed by the query's begin/end markers.
    /// Returns after submission; the device may still be executing.
    fn draw(
        &self,
        program: &Self::Program,
        vertices: &Self::VertexBuffer,
        clear_color: [f64; 4],
        timer: Option<&Self::TimerQuery>,
    ) -> Result<(), ProbeError>;

    /// Non-blocking check whether the query result can be read.
    fn query_available(&self, query: &Self::TimerQuery) -> Result<bool, ProbeError>;

    /// Reads the elapsed device time in nanoseconds.
    ///
    /// Only valid once [`query_available`](Self::query_available) returned `true`.
    fn query_elapsed_ns(&self, query: &Self::TimerQuery) -> Result<u64, ProbeError>;
}
