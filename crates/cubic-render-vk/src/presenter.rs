// SPDX-License-Identifier: CEPL-1.0
//! The active swapchain resources paired with their frame synchronizer.

use std::sync::Arc;

use ash::vk;
use cubic_render::RenderSize;
use tracing::{info, warn};

use crate::config::PresentPrefs;
use crate::device::PresentDevice;
use crate::error::{vk_err, PresentResult, PresentStatus};
use crate::format::{negotiate, SwapchainConfig};
use crate::frame_sync::FrameSynchronizer;
use crate::swapchain::SwapchainResources;

pub struct Presenter<D: PresentDevice> {
    // Field order is drop order: drain and free sync objects before the
    // swapchain they pace.
    pub(crate) sync: FrameSynchronizer<D>,
    pub(crate) resources: SwapchainResources<D>,
    pub(crate) device: Arc<D>,
    pub(crate) prefs: PresentPrefs,
}

impl<D: PresentDevice> Presenter<D> {
    pub fn new(device: Arc<D>, size: RenderSize, prefs: PresentPrefs) -> PresentResult<Self> {
        let config = negotiate_for(&*device, size, &prefs)?;
        let resources = SwapchainResources::create(device.clone(), &config, &prefs.depth_formats, None)?;
        let sync = FrameSynchronizer::new(
            device.clone(),
            prefs.frames_in_flight,
            resources.image_count(),
            prefs.fence_timeout_ns,
        )?;

        info!(
            "presenter ready: {} frames in flight over {} images",
            sync.frames_in_flight(),
            resources.image_count()
        );
        Ok(Self {
            sync,
            resources,
            device,
            prefs,
        })
    }

    /// Index of the next image to render into.
    ///
    /// `Err(PresentError::OutOfDate)` asks the caller to [`recreate`](Self::recreate).
    pub fn acquire_next_image(&mut self) -> PresentResult<(u32, PresentStatus)> {
        self.sync.acquire_next_image(self.resources.handle())
    }

    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> PresentResult<PresentStatus> {
        self.sync
            .submit_and_present(self.resources.handle(), command_buffer, image_index)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.resources.render_pass()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.resources.framebuffer(image_index)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.resources.extent()
    }

    pub fn image_format(&self) -> vk::Format {
        self.resources.image_format()
    }

    pub fn depth_format(&self) -> vk::Format {
        self.resources.depth_format()
    }

    pub fn image_count(&self) -> usize {
        self.resources.image_count()
    }

    pub fn config(&self) -> &SwapchainConfig {
        self.resources.config()
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.resources.handle()
    }

    pub fn frames(&self) -> &FrameSynchronizer<D> {
        &self.sync
    }

    pub fn prefs(&self) -> &PresentPrefs {
        &self.prefs
    }

    /// Wait for the device to go idle and release everything. Safe to call
    /// again.
    pub fn destroy(&mut self) {
        if self.resources.is_destroyed() {
            return;
        }
        // the final present on each image holds no fence
        if let Err(e) = self.device.wait_idle() {
            warn!("device_wait_idle before presenter teardown failed: {e}");
        }
        self.sync.destroy();
        self.resources.destroy();
    }
}

impl<D: PresentDevice> Drop for Presenter<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub(crate) fn negotiate_for<D: PresentDevice>(
    device: &D,
    size: RenderSize,
    prefs: &PresentPrefs,
) -> PresentResult<SwapchainConfig> {
    let support = device
        .surface_support()
        .map_err(vk_err("get_surface_support"))?;
    negotiate(&support, size, prefs)
}
