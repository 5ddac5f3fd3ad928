//! Application runner and event loop.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vulkandemo_core::EngineConfig;
use vulkandemo_gpu::DeviceContextBuilder;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::VulkanApp;
use crate::context::RenderContext;
use crate::error::RunError;
use crate::scheduler::{FrameExtent, FrameScheduler};

/// Run a [`VulkanApp`] with the given configuration.
///
/// Initializes logging, creates the window and device context, and runs
/// the event loop until the window closes or a fatal error occurs.
/// Initialization and fatal frame errors are returned typed so callers
/// can map them to distinct exit statuses.
pub fn run_app<A: VulkanApp + 'static>(config: EngineConfig) -> Result<(), RunError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let config = config.normalized()?;

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().map_err(|e| RunError::Platform(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };

    event_loop
        .run_app(&mut runner)
        .map_err(|e| RunError::Platform(e.to_string()))?;

    match runner.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Internal application runner implementing winit's `ApplicationHandler`.
struct AppRunner<A: VulkanApp> {
    config: EngineConfig,
    state: Option<AppState<A>>,
    failure: Option<RunError>,
}

/// Internal application state.
struct AppState<A: VulkanApp> {
    ctx: RenderContext,
    app: A,
    scheduler: FrameScheduler,
}

impl<A: VulkanApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let fatal = self
                    .state
                    .as_mut()
                    .and_then(AppState::render_frame);
                if let Some(err) = fatal {
                    error!("Fatal render error: {err}");
                    if let Some(mut state) = self.state.take() {
                        state.shutdown();
                    }
                    self.failure = Some(err);
                    event_loop.exit();
                } else if let Some(state) = &self.state {
                    state.ctx.window().request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.handle_resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window().request_redraw();
        }
    }
}

impl<A: VulkanApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> Result<AppState<A>, RunError> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| RunError::Platform(e.to_string()))?,
        );

        let (gpu, surface) = DeviceContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build(window.as_ref())?;

        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: The surface was built against this window.
        let mut ctx = unsafe { RenderContext::new(window, gpu, surface, &self.config)? };

        let app = A::init(&mut ctx)?;

        let size = ctx.window().inner_size();
        let scheduler = FrameScheduler::new(FrameExtent::new(size.width, size.height));

        Ok(AppState {
            ctx,
            app,
            scheduler,
        })
    }
}

impl<A: VulkanApp> AppState<A> {
    /// Run one frame. Returns the error when the loop cannot continue;
    /// recoverable per-frame conditions are absorbed by the scheduler.
    fn render_frame(&mut self) -> Option<RunError> {
        let Self {
            ctx,
            app,
            scheduler,
        } = self;

        let result = scheduler.tick(ctx, |ctx, ticket| {
            let mut canvas = ctx.frame_canvas(ticket);
            app.record(ctx, &mut canvas).map_err(RunError::from)
        });

        match result {
            Ok(outcome) => {
                tracing::trace!(?outcome, frame = scheduler.frame_number(), "tick");
                None
            }
            Err(err) => Some(err),
        }
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        self.scheduler.note_resized(FrameExtent::new(width, height));

        if width > 0 && height > 0 {
            if let Err(e) = self.app.on_resize(&mut self.ctx, width, height) {
                error!("Resize error: {e}");
            }
            info!("Resized to {}x{}", width, height);
        }
    }

    fn shutdown(&mut self) {
        info!("Starting cleanup...");

        // Complete all in-flight GPU work before releasing anything.
        if let Err(e) = self.scheduler.shutdown(&mut self.ctx) {
            error!("Failed to drain in-flight frames: {e}");
        }
        if let Err(e) = self.ctx.gpu().wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        // SAFETY: All GPU work has completed.
        unsafe {
            self.ctx.destroy();
        }

        info!("Cleanup complete");
    }
}
