use std::cell::RefCell;
use std::sync::mpsc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::Gpu;

use super::wgsl::{self, CompiledShader};
use super::{GpuBackend, ProbeError, Scene, ShaderStage, Vertex};

/// Begin + end timestamps.
const QUERY_SLOTS: u32 = 2;
const QUERY_BYTES: u64 = QUERY_SLOTS as u64 * wgpu::QUERY_SIZE as u64;

/// [`GpuBackend`] drawing into a window surface through wgpu.
///
/// The timer query is a two-slot timestamp query set written at the start and
/// end of the render pass, resolved into a readback buffer. The result counts
/// as available once that buffer's map callback has fired.
pub struct WgpuBackend<'a, 'w> {
    gpu: &'a Gpu<'w>,
    window: &'a Window,
}

pub type WgpuScene = Scene<WgpuProgram, WgpuVertexBuffer>;

pub struct WgpuShader {
    compiled: CompiledShader,
    module: wgpu::ShaderModule,
}

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
}

pub struct WgpuVertexBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

pub struct WgpuTimerQuery {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    state: RefCell<QueryState>,
}

enum QueryState {
    Idle,
    Pending(mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>),
    Mapped,
    Read(u64),
}

impl<'a, 'w> WgpuBackend<'a, 'w> {
    pub fn new(gpu: &'a Gpu<'w>, window: &'a Window) -> Self {
        Self { gpu, window }
    }
}

impl GpuBackend for WgpuBackend<'_, '_> {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type VertexBuffer = WgpuVertexBuffer;
    type TimerQuery = WgpuTimerQuery;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<WgpuShader, ProbeError> {
        let compiled = wgsl::compile(stage, source)?;

        let label = match stage {
            ShaderStage::Vertex => "triprobe vertex shader",
            ShaderStage::Fragment => "triprobe fragment shader",
        };
        let device = self.gpu.device();
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(compiled.source().into()),
        });
        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(ProbeError::Compile {
                stage,
                log: err.to_string(),
            });
        }

        Ok(WgpuShader { compiled, module })
    }

    fn link_program(
        &self,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> Result<WgpuProgram, ProbeError> {
        let stages = wgsl::link(&vertex.compiled, &fragment.compiled, Vertex::attributes())?;
        let device = self.gpu.device();

        // Anything the front end missed surfaces as a validation error here
        // rather than through the device's uncaptured-error handler.
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("triprobe pipeline layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("triprobe triangle pipeline"),
            layout: Some(&layout),

            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: Some(stages.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: Some(stages.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(ProbeError::Link {
                log: err.to_string(),
            });
        }

        Ok(WgpuProgram { pipeline })
    }

    fn upload_vertices(&self, vertices: &[Vertex]) -> Result<WgpuVertexBuffer, ProbeError> {
        if vertices.is_empty() {
            return Err(ProbeError::device("vertex upload", "no vertices"));
        }
        let count = u32::try_from(vertices.len())
            .map_err(|_| ProbeError::device("vertex upload", "too many vertices"))?;

        let buffer = self
            .gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("triprobe triangle vbo"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        Ok(WgpuVertexBuffer { buffer, count })
    }

    fn create_timer_query(&self) -> Result<WgpuTimerQuery, ProbeError> {
        let device = self.gpu.device();
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return Err(ProbeError::device(
                "timer query creation",
                "TIMESTAMP_QUERY is not enabled on this device",
            ));
        }

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("triprobe timer queries"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_SLOTS,
        });

        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("triprobe query resolve"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("triprobe query readback"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!(
            "timer query created (timestamp period {} ns)",
            self.gpu.timestamp_period()
        );

        Ok(WgpuTimerQuery {
            query_set,
            resolve,
            readback,
            state: RefCell::new(QueryState::Idle),
        })
    }

    fn draw(
        &self,
        program: &WgpuProgram,
        vertices: &WgpuVertexBuffer,
        clear_color: [f64; 4],
        timer: Option<&WgpuTimerQuery>,
    ) -> Result<(), ProbeError> {
        if let Some(query) = timer {
            if !matches!(*query.state.borrow(), QueryState::Idle) {
                return Err(ProbeError::device("timed draw", "timer query already issued"));
            }
        }

        let Some(mut frame) = self
            .gpu
            .acquire_frame()
            .map_err(|e| ProbeError::device("frame acquisition", format!("{e:#}")))?
        else {
            return Err(ProbeError::FrameSkipped);
        };

        let [r, g, b, a] = clear_color;

        // Pass is dropped before the encoder records the resolve.
        {
            let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("triprobe triangle pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: timer.map(|q| wgpu::RenderPassTimestampWrites {
                    query_set: &q.query_set,
                    beginning_of_pass_write_index: Some(0),
                    end_of_pass_write_index: Some(1),
                }),
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_pipeline(&program.pipeline);
            rpass.set_vertex_buffer(0, vertices.buffer.slice(..));
            rpass.draw(0..vertices.count, 0..1);
        }

        if let Some(query) = timer {
            frame
                .encoder
                .resolve_query_set(&query.query_set, 0..QUERY_SLOTS, &query.resolve, 0);
            frame
                .encoder
                .copy_buffer_to_buffer(&query.resolve, 0, &query.readback, 0, QUERY_BYTES);
        }

        self.gpu.submit(frame, self.window);

        if let Some(query) = timer {
            let (tx, rx) = mpsc::channel();
            query
                .readback
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = tx.send(result);
                });
            *query.state.borrow_mut() = QueryState::Pending(rx);
        }

        Ok(())
    }

    fn query_available(&self, query: &WgpuTimerQuery) -> Result<bool, ProbeError> {
        let mut state = query.state.borrow_mut();

        let received = match &*state {
            QueryState::Idle => return Err(ProbeError::QueryNotIssued),
            QueryState::Mapped | QueryState::Read(_) => return Ok(true),
            QueryState::Pending(rx) => {
                self.gpu
                    .device()
                    .poll(wgpu::PollType::Poll)
                    .map_err(|e| ProbeError::device("device poll", e))?;
                rx.try_recv()
            }
        };

        match received {
            Ok(Ok(())) => {
                *state = QueryState::Mapped;
                Ok(true)
            }
            Ok(Err(e)) => Err(ProbeError::device("query readback", e)),
            Err(mpsc::TryRecvError::Empty) => Ok(false),
            Err(mpsc::TryRecvError::Disconnected) => Err(ProbeError::device(
                "query readback",
                "map callback dropped without a result",
            )),
        }
    }

    fn query_elapsed_ns(&self, query: &WgpuTimerQuery) -> Result<u64, ProbeError> {
        let mut state = query.state.borrow_mut();
        match *state {
            QueryState::Idle => return Err(ProbeError::QueryNotIssued),
            QueryState::Pending(_) => {
                return Err(ProbeError::device("query read", "result not yet available"));
            }
            QueryState::Read(ns) => return Ok(ns),
            QueryState::Mapped => {}
        }

        let ns = {
            let data = query.readback.slice(..).get_mapped_range();
            timestamps_to_ns(&data, self.gpu.timestamp_period())?
        };
        query.readback.unmap();

        *state = QueryState::Read(ns);
        Ok(ns)
    }
}

/// Converts a resolved `[begin, end]` tick pair into nanoseconds.
fn timestamps_to_ns(bytes: &[u8], period_ns: f32) -> Result<u64, ProbeError> {
    if bytes.len() < QUERY_BYTES as usize {
        return Err(ProbeError::device(
            "query read",
            format!("expected {QUERY_BYTES} bytes, got {}", bytes.len()),
        ));
    }

    let begin: u64 = bytemuck::pod_read_unaligned(&bytes[0..8]);
    let end: u64 = bytemuck::pod_read_unaligned(&bytes[8..16]);
    let ticks = end.saturating_sub(begin);

    Ok((ticks as f64 * f64::from(period_ns)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(begin: u64, end: u64) -> Vec<u8> {
        let mut out = begin.to_ne_bytes().to_vec();
        out.extend_from_slice(&end.to_ne_bytes());
        out
    }

    #[test]
    fn ticks_are_scaled_by_period() {
        assert_eq!(timestamps_to_ns(&pair(100, 1_100), 1.0).unwrap(), 1_000);
        assert_eq!(timestamps_to_ns(&pair(0, 1_000), 83.333).unwrap(), 83_333);
    }

    #[test]
    fn reversed_timestamps_saturate_to_zero() {
        assert_eq!(timestamps_to_ns(&pair(500, 10), 1.0).unwrap(), 0);
    }

    #[test]
    fn short_readback_is_an_error() {
        let err = timestamps_to_ns(&[0u8; 8], 1.0).unwrap_err();
        assert_eq!(err.failing_stage(), "device");
    }
}
