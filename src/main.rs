// =============================================================================
// VULKAN QUAD - a rotating textured quad
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, close requests, redraws)             │
// │    └── Renderer (owns every GPU resource)                       │
// │          └── Orchestrator (per-frame ordering)                  │
// │                └── Frame slots (command buffer, fence, semaphores)
// │          └── DeviceContext (device, queues, pools)              │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the current slot's fence, reset it
// 2. Acquire a swapchain image
// 3. Record: render pass, uniforms, descriptors, one indexed draw
// 4. Submit, present, advance the slot
//
// =============================================================================

mod assets;
mod backend;
mod config;
mod mesh;
mod renderer;
mod uniform;

use anyhow::Result;
use backend::VulkanDevice;
use config::Config;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use renderer::Renderer;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `RUST_LOG` overrides the default `info` level
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// The renderer is declared before the window so the surface is destroyed
/// while the window still exists.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    /// First unrecoverable error; ends the event loop
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
        }
    }

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        let vulkan = VulkanDevice::new(
            &self.config.window.title,
            self.config.validation_enabled(),
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;

        let renderer = Renderer::new(vulkan, &self.config)?;
        if !renderer.has_texture() {
            log::warn!("No texture loaded from {:?}", self.config.assets.texture);
        }

        self.renderer = Some(renderer);
        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed size: the swapchain is never recreated
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
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                if let Err(e) = renderer.render() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }

            _ => {}
        }
    }

    /// Continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.fatal.is_some() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
