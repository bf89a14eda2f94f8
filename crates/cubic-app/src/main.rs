// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use cubic_core::{init_tracing, load_config};
use cubic_render::{FrameOutcome, RenderSize, Renderer};
use cubic_render_vk::{vk, PresentPrefs, VkRenderer};
use tracing::{error, info, warn};

use cubic_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = "cubic.toml")]
    config: PathBuf,
    /// Frame slots in flight; overrides the config file and CUBIC_FRAMES_IN_FLIGHT
    #[arg(long)]
    frames_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
struct RenderCfg {
    #[serde(default = "default_clear")]
    clear_color: [f32; 4],
    #[serde(default)]
    frames_in_flight: Option<usize>,
    #[serde(default = "default_present_modes")]
    present_modes: Vec<PresentModeCfg>,
    #[serde(default = "default_srgb")]
    srgb: bool,
    /// 0 waits forever
    #[serde(default)]
    fence_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum PresentModeCfg {
    Mailbox,
    Immediate,
    FifoRelaxed,
    Fifo,
}

impl From<PresentModeCfg> for vk::PresentModeKHR {
    fn from(m: PresentModeCfg) -> Self {
        match m {
            PresentModeCfg::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModeCfg::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentModeCfg::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            PresentModeCfg::Fifo => vk::PresentModeKHR::FIFO,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    render: RenderCfg,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            frames_in_flight: None,
            present_modes: default_present_modes(),
            srgb: default_srgb(),
            fence_timeout_ms: 0,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_present_modes() -> Vec<PresentModeCfg> {
    vec![
        PresentModeCfg::Mailbox,
        PresentModeCfg::Immediate,
        PresentModeCfg::Fifo,
    ]
}
fn default_srgb() -> bool {
    true
}

/// Defaults, then the config file, then the environment, then the command line.
fn present_prefs(cfg: &RenderCfg, cli_frames: Option<usize>) -> PresentPrefs {
    let mut prefs = PresentPrefs::default();
    if let Some(n) = cfg.frames_in_flight {
        prefs = prefs.with_frames_in_flight(n);
    }
    prefs.present_modes = cfg.present_modes.iter().copied().map(Into::into).collect();
    prefs.surface_format.format = if cfg.srgb {
        vk::Format::B8G8R8A8_SRGB
    } else {
        vk::Format::B8G8R8A8_UNORM
    };
    prefs.fence_timeout_ns = match cfg.fence_timeout_ms {
        0 => u64::MAX,
        ms => ms.saturating_mul(1_000_000),
    };

    let mut prefs = prefs.with_env_overrides();
    if let Some(n) = cli_frames {
        prefs = prefs.with_frames_in_flight(n);
    }
    prefs
}

struct App {
    window: Option<Window>,
    renderer: Option<VkRenderer>,
    render_size: RenderSize,

    cfg: AppCfg,
    prefs: PresentPrefs,
    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,

    paused: bool,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = cubic_platform::create_window(event_loop, "cubic")?;
        let size = window.inner_size();
        self.render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let wh = window.window_handle()?;
        let dh = window.display_handle()?;
        let mut renderer = VkRenderer::new(&wh, &dh, self.render_size, self.prefs.clone())?;
        renderer.set_clear_color(self.cfg.render.clear_color);

        info!(
            "frames in flight = {}, fence timeout = {}",
            self.prefs.frames_in_flight,
            match self.cfg.render.fence_timeout_ms {
                0 => "unbounded".to_string(),
                ms => format!("{ms} ms"),
            }
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // renderer before the window its surface belongs to
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("vk init failed: {e:#}");
                self.shutdown(event_loop);
                return;
            }
        }

        self.paused = self.render_size.is_empty();
        info!("resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
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
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                self.paused = self.render_size.is_empty();
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width, self.render_size.height, self.paused
                );

                // the renderer also tracks zero sizes, so it hears about all of them
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        error!("resize failed: {e:#}");
                        self.shutdown(event_loop);
                        return;
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                let now_paused = occluded || self.render_size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Occluded={} → paused={}", occluded, self.paused);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }

                let Some(r) = &mut self.renderer else {
                    return;
                };
                match r.render() {
                    Ok(FrameOutcome::Presented) => {
                        // count only frames that were actually presented
                        self.frames = self.frames.saturating_add(1);
                    }
                    Ok(FrameOutcome::Recreated) => {}
                    Ok(FrameOutcome::Skipped) => {
                        if r.is_paused() {
                            self.paused = true;
                        }
                    }
                    Err(e) => {
                        error!("render error: {e:#}");
                        self.shutdown(event_loop);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // window-size=0 or occluded → sleep
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // the present mode paces us; fences bound how far ahead we get
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
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
    let cfg: AppCfg = load_config(&args.config);
    let prefs = present_prefs(&cfg.render, args.frames_in_flight);
    if prefs.present_modes.is_empty() {
        warn!("no present modes configured, FIFO will be used");
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        window: None,
        renderer: None,
        render_size: RenderSize {
            width: 1,
            height: 1,
        },
        cfg,
        prefs,
        exiting: false,
        frames: 0,
        last_fps_instant: Instant::now(),
        paused: false,
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
