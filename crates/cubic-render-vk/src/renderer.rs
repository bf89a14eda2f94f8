// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use cubic_render::{FrameOutcome, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

use crate::ash_device::AshDevice;
use crate::config::PresentPrefs;
use crate::device::PresentDevice;
use crate::format::{fmt_name, pm_name};
use crate::frame_loop::FrameLoop;
use crate::presenter::Presenter;

/// Clears every swap image to a color and depth 1.0, then presents it.
pub struct VkRenderer {
    // Dropped in this order, the device last.
    frames: FrameLoop<AshDevice>,
    cmd_pool: vk::CommandPool,
    cmd_bufs: Vec<vk::CommandBuffer>,
    device: Arc<AshDevice>,

    clear: [f32; 4],
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        prefs: PresentPrefs,
    ) -> Result<Self> {
        let device = Arc::new(AshDevice::new(window, display)?);
        let presenter =
            Presenter::new(device.clone(), size, prefs).context("create presenter")?;

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: device.graphics_family(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let cmd_pool = unsafe { device.raw().create_command_pool(&pool_info, None) }
            .context("create_command_pool")?;

        let mut r = VkRenderer {
            frames: FrameLoop::new(presenter, size),
            cmd_pool,
            cmd_bufs: Vec::new(),
            device,
            clear: [0.02, 0.02, 0.04, 1.0],
        };
        r.record_commands()?;

        let p = r.frames.presenter();
        let extent = p.extent();
        info!(
            "Vulkan swapchain ready ({}x{}, {}, depth {}, {})",
            extent.width,
            extent.height,
            fmt_name(p.image_format()),
            fmt_name(p.depth_format()),
            pm_name(p.config().present_mode)
        );
        Ok(r)
    }

    pub fn is_paused(&self) -> bool {
        self.frames.is_paused()
    }

    /// One primary command buffer per swap image, re-recorded whenever the
    /// framebuffers or the clear color change. Callers make sure none of
    /// them is still executing.
    fn record_commands(&mut self) -> Result<()> {
        let d = self.device.raw();
        let presenter = self.frames.presenter();
        let count = presenter.image_count();

        if self.cmd_bufs.len() != count {
            unsafe {
                if !self.cmd_bufs.is_empty() {
                    d.free_command_buffers(self.cmd_pool, &self.cmd_bufs);
                }
                let alloc_info = vk::CommandBufferAllocateInfo {
                    s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                    command_pool: self.cmd_pool,
                    level: vk::CommandBufferLevel::PRIMARY,
                    command_buffer_count: count as u32,
                    ..Default::default()
                };
                self.cmd_bufs = d
                    .allocate_command_buffers(&alloc_info)
                    .context("allocate_command_buffers")?;
            }
        }

        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let extent = presenter.extent();

        for (i, &cmd) in self.cmd_bufs.iter().enumerate() {
            let framebuffer = presenter
                .framebuffer(i as u32)
                .ok_or_else(|| anyhow!("no framebuffer for image {i}"))?;

            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: presenter.render_pass(),
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };

            unsafe {
                d.begin_command_buffer(cmd, &begin)
                    .context("begin_command_buffer")?;
                d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
                d.cmd_end_render_pass(cmd);
                d.end_command_buffer(cmd).context("end_command_buffer")?;
            }
        }
        Ok(())
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let d = self.device.raw();
            d.device_wait_idle().ok();
            if !self.cmd_bufs.is_empty() {
                d.free_command_buffers(self.cmd_pool, &self.cmd_bufs);
            }
            d.destroy_command_pool(self.cmd_pool, None);
        }
    }
}

impl Renderer for VkRenderer {
    fn resize(&mut self, size: RenderSize) -> Result<()> {
        let outcome = self.frames.resize(size).context("recreate swapchain")?;
        if outcome == FrameOutcome::Recreated {
            self.record_commands()?;
        }
        Ok(())
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        let bufs = &self.cmd_bufs;
        let outcome = self
            .frames
            .frame(|i| bufs.get(i as usize).copied())
            .context("render frame")?;
        if outcome == FrameOutcome::Recreated {
            self.record_commands()?;
        }
        Ok(outcome)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
        if let Err(e) = self.device.wait_idle() {
            warn!("vk: device_wait_idle before re-record failed: {e}");
            return;
        }
        if let Err(e) = self.record_commands() {
            warn!("vk: re-recording clear color failed: {e:#}");
        }
    }
}
