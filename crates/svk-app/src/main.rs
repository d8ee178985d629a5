// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use svk_core::{init_tracing, LogLevel};
use svk_platform::{dispatch_window_event, WindowEvents};
use svk_render::{FrameOutcome, RenderSettings, RenderSize, Renderer};
use svk_render_vk::VkRenderer;
use tracing::{debug, error, info, warn};

use svk_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Fullscreen, Window, WindowId},
};

mod config;

use config::{load_cfg, PresentModeCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing means defaults
    #[arg(long, default_value = "svk.toml")]
    config: PathBuf,

    /// Overrides [render].present_mode
    #[arg(long, value_enum)]
    present_mode: Option<PresentModeCfg>,

    /// Overrides [render].frames_in_flight (1-4)
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// off|error|warn|info|debug or 0-4; RUST_LOG still wins
    #[arg(long)]
    log_level: Option<LogLevel>,
}

struct App {
    settings: RenderSettings,
    window: Option<Window>,
    renderer: Option<VkRenderer>,
    render_size: RenderSize,
    clear_color: [f32; 4],

    exiting: bool,
    close_requested: bool,
    paused: bool,
    failure: Option<anyhow::Error>,

    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(settings: RenderSettings) -> Self {
        Self {
            clear_color: settings.clear_color,
            settings,
            window: None,
            renderer: None,
            render_size: RenderSize::new(1, 1),
            exiting: false,
            close_requested: false,
            paused: false,
            failure: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn create_renderer(&self, window: &Window) -> Result<VkRenderer> {
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("window_handle: {e}"))?;
        let dh = window
            .display_handle()
            .map_err(|e| anyhow!("display_handle: {e}"))?;
        VkRenderer::new(&wh, &dh, self.render_size, &self.settings).context("vk init")
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure.get_or_insert(err);
        self.teardown(event_loop);
    }

    // STRICT ORDER: drain the GPU, drop the renderer, then the window that
    // owns its surface.
    fn teardown(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        self.exiting = true;
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                warn!("shutdown: {e:#}");
            }
            info!("rendered {} frames", renderer.frame());
        }
        self.window = None;
        event_loop.exit();
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn toggle_fullscreen(&self) {
        if let Some(w) = &self.window {
            let next = match w.fullscreen() {
                Some(_) => None,
                None => Some(Fullscreen::Borderless(None)),
            };
            info!("fullscreen = {}", next.is_some());
            w.set_fullscreen(next);
        }
    }
}

impl WindowEvents for App {
    fn on_resize(&mut self, width: u32, height: u32) {
        self.render_size = RenderSize::new(width, height);
        let now_paused = self.render_size.is_zero();
        if self.paused != now_paused {
            info!("Resized → {}x{} (paused={})", width, height, now_paused);
        } else {
            debug!("Resized → {}x{}", width, height);
        }
        self.paused = now_paused;

        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(self.render_size) {
                self.failure.get_or_insert(e);
                self.close_requested = true;
                return;
            }
        }
        if !self.paused {
            self.request_redraw();
        }
    }

    fn on_scroll(&mut self, _dx: f64, dy: f64) {
        // scroll brightens or darkens the clear colour
        let step = (dy as f32) * 0.02;
        for c in &mut self.clear_color[..3] {
            *c = (*c + step).clamp(0.0, 1.0);
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.set_clear_color(self.clear_color);
        }
    }

    fn on_key(&mut self, key: &KeyEvent) {
        if key.state != ElementState::Pressed || key.repeat {
            return;
        }
        match &key.logical_key {
            Key::Named(NamedKey::Escape) => self.close_requested = true,
            Key::Named(NamedKey::F11) => self.toggle_fullscreen(),
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("svk"))
                .context("create_window")
            {
                Ok(w) => w,
                Err(e) => return self.fail(event_loop, e),
            };

            let size = window.inner_size();
            self.render_size = RenderSize::new(size.width.max(1), size.height.max(1));

            match self.create_renderer(&window) {
                Ok(renderer) => {
                    info!(
                        "swapchain {}x{} {:?} {:?}",
                        renderer.extent().width,
                        renderer.extent().height,
                        renderer.format(),
                        renderer.present_mode()
                    );
                    self.renderer = Some(renderer);
                }
                Err(e) => {
                    self.window = Some(window);
                    return self.fail(event_loop, e);
                }
            }
            self.window = Some(window);
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        self.paused = self.render_size.is_zero();
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            self.request_redraw();
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
                self.teardown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };

                match renderer.render() {
                    Ok(FrameOutcome::Presented | FrameOutcome::PresentedAndRecreated) => {
                        // count only frames that were actually presented
                        self.frames = self.frames.saturating_add(1);
                    }
                    Ok(FrameOutcome::Abandoned) => self.request_redraw(),
                    Ok(FrameOutcome::Parked) => {
                        info!("surface out of date while minimized → paused");
                        self.paused = true;
                    }
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            other => {
                dispatch_window_event(self, &other);
            }
        }

        if self.close_requested && !self.exiting {
            match self.failure.take() {
                Some(e) => self.fail(event_loop, e),
                None => self.teardown(event_loop),
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // window-size=0 → sleep until a resize wakes us
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // FIFO present blocks, so asking for one redraw per wakeup paces us
        event_loop.set_control_flow(ControlFlow::Wait);
        self.request_redraw();

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_cfg(&args.config);
    let (mut cfg, cfg_err) = match loaded {
        Ok(cfg) => (cfg, None),
        Err(e) => (Default::default(), Some(e)),
    };

    let level = init_tracing(args.log_level.or(cfg.log.level).unwrap_or_default());
    if let Some(e) = cfg_err {
        warn!("{e:#}; using defaults");
    }

    if let Some(mode) = args.present_mode {
        cfg.render.present_mode = mode;
    }
    if let Some(n) = args.frames_in_flight {
        cfg.render.frames_in_flight = n;
    }
    let settings = cfg.render.to_settings();
    info!(
        "log level {}, present {:?}, {} frame(s) in flight, resize {:?}",
        level,
        settings.present_mode,
        settings.slot_count(),
        settings.resize_policy
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(settings);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
