// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;
use vkquad_core::{init_tracing, report_fatal};
use vkquad_platform::drawable_size;
use vkquad_render::{FrameStatus, RenderSize, Renderer};
use vkquad_render_vk::GpuContext;

use vkquad_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::config::{AppCfg, Args};

struct App {
    cfg: AppCfg,
    // declared before `window`: the surface must go before the window it targets
    renderer: Option<GpuContext>,
    window: Option<Window>,

    fatal: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: std::time::Instant,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        report_fatal(&err);
        self.fatal = Some(err);
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = event_loop.create_window(attrs).context("create_window")?;

        let size = drawable_size(&window);
        let renderer = GpuContext::new(&window, &window, size, &self.cfg.context_config())?;
        info!(
            "renderer = vk on '{}', {}x{}",
            renderer.device_name(),
            size.width,
            size.height
        );

        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                info!("Resized → {}x{}", new_size.width, new_size.height);
                if let Some(r) = &mut self.renderer {
                    r.resize(RenderSize::new(new_size.width, new_size.height));
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(r) = &mut self.renderer else {
                    return;
                };
                match r.render() {
                    Ok(FrameStatus::Presented) => {
                        self.frames = self.frames.saturating_add(1);
                    }
                    Ok(FrameStatus::Recreated | FrameStatus::Paused) => {}
                    Err(e) => self.fail(event_loop, e),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = std::time::Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = AppCfg::load(&args.config);
    cfg.apply_args(&args);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        renderer: None,
        window: None,
        fatal: None,
        frames: 0,
        last_fps_instant: std::time::Instant::now(),
    };
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
