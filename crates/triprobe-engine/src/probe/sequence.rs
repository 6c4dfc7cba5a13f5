use super::timer::wait_until_available;
use super::{GpuBackend, Measurement, ProbeConfig, ProbeError, ShaderStage, TRIANGLE};

/// Resources kept alive after the probe for redrawing the static triangle.
///
/// Dropping the scene releases the program and the vertex buffer.
pub struct Scene<P, V> {
    program: P,
    vertices: V,
}

impl<P, V> Scene<P, V> {
    /// Submits one untimed draw of the scene.
    pub fn redraw<B>(&self, backend: &B, clear_color: [f64; 4]) -> Result<(), ProbeError>
    where
        B: GpuBackend<Program = P, VertexBuffer = V>,
    {
        backend.draw(&self.program, &self.vertices, clear_color, None)
    }
}

/// Scene type produced by backend `B`.
pub type SceneOf<B> = Scene<<B as GpuBackend>::Program, <B as GpuBackend>::VertexBuffer>;

/// Compiles the shaders, uploads the triangle and times one draw of it.
///
/// Every handle created before a failing step is released before the error is
/// returned. On success the timer query has already been released; the program
/// and vertex buffer move into the returned [`Scene`].
pub fn run_probe<B: GpuBackend>(
    backend: &B,
    config: &ProbeConfig,
) -> Result<(Measurement, SceneOf<B>), ProbeError> {
    let vertex_shader = backend.compile_shader(ShaderStage::Vertex, &config.shaders.vertex)?;
    let fragment_shader = backend.compile_shader(ShaderStage::Fragment, &config.shaders.fragment)?;
    let program = backend.link_program(&vertex_shader, &fragment_shader)?;

    // Shader objects are not needed once the program is linked.
    drop(vertex_shader);
    drop(fragment_shader);
    log::debug!("shader program linked");

    let vertices = backend.upload_vertices(&TRIANGLE)?;
    let query = backend.create_timer_query()?;

    backend.draw(&program, &vertices, config.clear_color, Some(&query))?;
    wait_until_available(backend, &query, config.wait)?;
    let measurement = Measurement::from_nanos(backend.query_elapsed_ns(&query)?);
    drop(query);

    log::info!("timed draw took {} ns", measurement.nanos());

    Ok((measurement, Scene { program, vertices }))
}
