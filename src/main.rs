// =============================================================================
// VULKAN TRIANGLE - device, surface and pipeline negotiation demo
// =============================================================================
//
// One-shot startup sequence against the Vulkan driver:
//
//   instance -> surface -> physical device -> queue families
//            -> logical device -> swapchain -> render pass -> pipeline
//
// Each stage's output feeds the next; there is no retry across stages, only
// local fallbacks inside one. Any failure aborts the process with a non-zero
// status. The event loop itself only pumps window events.
//
// =============================================================================

mod backend;
mod config;

use anyhow::Result;
use backend::{Device, Instance, LogSink, Pipeline, RenderPass, ShaderCompiler, ShaderStage, Surface, Swapchain};
use config::Config;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

const VERTEX_SHADER: &str = include_str!("../shaders/triangle.vert");
const FRAGMENT_SHADER: &str = include_str!("../shaders/triangle.frag");

fn main() -> Result<()> {
    let config = Config::load();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // CLI arguments are forwarded by the shell but not interpreted here.
    let _args: Vec<String> = std::env::args().collect();

    log::info!(
        "Starting: {} ({}x{})",
        config.window.title,
        config.window.width,
        config.window.height
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if app.init_failed {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// RENDERER STATE
// =============================================================================

/// Everything negotiated from the driver, in one struct.
///
/// Field order matters for Drop: pipeline and render pass before the
/// swapchain, the swapchain before the device, the surface before the
/// instance. Later resources hold non-owning references into earlier ones.
struct Renderer {
    pipeline: Pipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    _surface: Surface,
    _instance: Instance,
}

impl Renderer {
    /// Run the full negotiation sequence against the given window.
    fn new(window: &Window, config: &Config) -> backend::VulkanResult<Self> {
        // Validation is a debug-build posture, further gated by config.
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;

        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let instance = Instance::new(enable_validation, Box::new(LogSink), display_handle)?;
        let surface = Surface::new(&instance, display_handle, window_handle)?;

        let (physical_device, queue_families) =
            backend::select_physical_device(&instance, &surface)?;
        let device = Arc::new(Device::new(&instance, physical_device, queue_families)?);

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &surface,
            Some((size.width, size.height)),
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;

        let compiler = ShaderCompiler::new()?;
        let vert_spirv = compiler.compile(VERTEX_SHADER, ShaderStage::Vertex, "triangle.vert")?;
        let frag_spirv = compiler.compile(FRAGMENT_SHADER, ShaderStage::Fragment, "triangle.frag")?;

        let pipeline = Pipeline::new(
            device.clone(),
            &render_pass,
            swapchain.extent,
            &vert_spirv,
            &frag_spirv,
        )?;

        log::info!("Vulkan initialized");

        Ok(Self {
            pipeline,
            render_pass,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Tearing down Vulkan resources");
        // Everything below must be idle before handles start disappearing.
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed during teardown: {}", e);
        }
        // Fields drop in declaration order: pipeline, render pass,
        // swapchain (+views), device, surface, instance.
    }
}

// =============================================================================
// APPLICATION SHELL
// =============================================================================

struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    init_failed: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            init_failed: false,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.init_failed = true;
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {}", e);
                self.init_failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }
}
