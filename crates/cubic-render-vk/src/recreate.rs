// SPDX-License-Identifier: CEPL-1.0
//! Swapchain recreation after a resize, an out-of-date swapchain or a
//! suboptimal present.

use std::mem;

use cubic_render::RenderSize;
use tracing::{debug, info, warn};

use crate::device::PresentDevice;
use crate::error::{vk_err, PresentError, PresentResult};
use crate::format::fmt_name;
use crate::frame_sync::FrameSynchronizer;
use crate::presenter::{negotiate_for, Presenter};
use crate::swapchain::SwapchainResources;

impl<D: PresentDevice> Presenter<D> {
    /// Rebuild the swapchain and its resources for `want`.
    ///
    /// A zero-area surface returns [`PresentError::ZeroExtent`] without
    /// touching anything; the caller should wait for a real size. If the new
    /// swapchain comes back with a different color or depth format the new
    /// resources are released and [`PresentError::FormatMismatch`] is
    /// returned: pipelines built against the old render pass are no longer
    /// valid, and this presenter (whose swapchain is now retired) must be
    /// dropped.
    pub fn recreate(&mut self, want: RenderSize) -> PresentResult<()> {
        let config = negotiate_for(&*self.device, want, &self.prefs)?;

        let resources = SwapchainResources::create(
            self.device.clone(),
            &config,
            &self.prefs.depth_formats,
            Some(&self.resources),
        )?;

        let old = (self.resources.image_format(), self.resources.depth_format());
        let new = (resources.image_format(), resources.depth_format());
        if old != new {
            warn!(
                "recreated swapchain changed formats: color {} -> {}, depth {} -> {}",
                fmt_name(old.0),
                fmt_name(new.0),
                fmt_name(old.1),
                fmt_name(new.1)
            );
            drop(resources);
            return Err(PresentError::FormatMismatch { old, new });
        }

        let sync = FrameSynchronizer::new(
            self.device.clone(),
            self.prefs.frames_in_flight,
            resources.image_count(),
            self.prefs.fence_timeout_ns,
        )?;

        // The last present of the old swapchain is covered by no fence.
        self.device
            .wait_idle()
            .map_err(vk_err("device_wait_idle"))?;

        let mut old_sync = mem::replace(&mut self.sync, sync);
        let mut old_resources = mem::replace(&mut self.resources, resources);
        debug!(
            "retiring swapchain {:?} for {:?}",
            old_resources.handle(),
            self.resources.handle()
        );
        old_sync.destroy();
        old_resources.destroy();

        let extent = self.resources.extent();
        info!(
            "swapchain recreated: {}x{}, {} images",
            extent.width,
            extent.height,
            self.resources.image_count()
        );
        Ok(())
    }
}
