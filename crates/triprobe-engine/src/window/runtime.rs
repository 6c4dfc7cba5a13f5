use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App, AppControl};
use crate::device::{Gpu, GpuInit};
use crate::probe::{run_probe, ProbeConfig, WgpuBackend, WgpuScene};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "GPU Performance Test".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
            resizable: false,
        }
    }
}

/// Entry point for the runtime.
///
/// Opens the window, runs the probe once, reports the measurement to the app,
/// then idles until the window is closed. Every GPU handle is released before
/// `run` returns, whichever way it returns.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, probe: ProbeConfig, app: A) -> Result<()>
    where
        A: 'static + App,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, probe, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.finish()
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    probe: ProbeConfig,
    app: A,

    // Declaration order is drop order: scene handles go before the device.
    scene: Option<WgpuScene>,
    window: Option<WindowEntry>,

    started: bool,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, probe: ProbeConfig, app: A) -> Self {
        Self {
            config,
            gpu_init,
            probe,
            app,
            scene: None,
            window: None,
            started: false,
            failure: None,
        }
    }

    /// Creates the window and device, then runs the probe.
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<AppControl> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_resizable(self.config.resizable);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed")?;

        let probe = &self.probe;
        let outcome = entry.with(|fields| {
            let backend = WgpuBackend::new(fields.gpu, fields.window);
            run_probe(&backend, probe)
        });

        // Keep the window even on failure so teardown happens in one place.
        self.window = Some(entry);

        let (measurement, scene) = outcome.context("GPU timing probe failed")?;
        self.scene = Some(scene);

        Ok(self.app.on_measurement(&measurement))
    }

    fn redraw(&self) {
        let (Some(entry), Some(scene)) = (&self.window, &self.scene) else {
            return;
        };

        let clear_color = self.probe.clear_color;
        entry.with(|fields| {
            let backend = WgpuBackend::new(fields.gpu, fields.window);
            if let Err(e) = scene.redraw(&backend, clear_color) {
                log::warn!("idle redraw failed: {e}");
            }
        });
    }

    /// Stores `err` for [`finish`](Self::finish); the caller reports it.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::debug!("stopping after failure: {err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    /// Releases scene handles, then the device and window, and stops the loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if self.scene.take().is_some() {
            log::debug!("released shader program and vertex buffer");
        }
        if self.window.take().is_some() {
            log::debug!("released device, surface and window");
        }
        event_loop.exit();
    }

    fn finish(self) -> Result<()> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;
        event_loop.set_control_flow(ControlFlow::Wait);

        match self.start(event_loop) {
            Ok(AppControl::Continue) => {}
            Ok(AppControl::Exit) => self.shutdown(event_loop),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.is_none() {
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.shutdown(event_loop);
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}
