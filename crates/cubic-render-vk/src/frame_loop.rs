// SPDX-License-Identifier: CEPL-1.0
//! Per-frame decisions on top of a [`Presenter`]: when to recreate, when to
//! rebuild the presenter outright, and when to stop rendering until the
//! window has a real size again.

use std::sync::Arc;

use ash::vk;
use cubic_render::{FrameOutcome, RenderSize};
use tracing::{info, warn};

use crate::device::PresentDevice;
use crate::error::{PresentError, PresentResult};
use crate::presenter::Presenter;

pub struct FrameLoop<D: PresentDevice> {
    presenter: Presenter<D>,
    size: RenderSize,
    paused: bool,
}

impl<D: PresentDevice> FrameLoop<D> {
    pub fn new(presenter: Presenter<D>, size: RenderSize) -> Self {
        Self {
            presenter,
            size,
            paused: size.is_empty(),
        }
    }

    pub fn presenter(&self) -> &Presenter<D> {
        &self.presenter
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Track a new window size. A zero-area size pauses without touching the
    /// GPU; anything else resumes and recreates.
    pub fn resize(&mut self, size: RenderSize) -> PresentResult<FrameOutcome> {
        self.size = size;
        if size.is_empty() {
            if !self.paused {
                info!("resize to {}x{} → paused=true", size.width, size.height);
            }
            self.paused = true;
            return Ok(FrameOutcome::Skipped);
        }

        if self.paused {
            info!("resize to {}x{} → paused=false", size.width, size.height);
        }
        self.paused = false;
        self.rebuild()
    }

    /// Acquire, submit the buffer `command_for` returns for the acquired
    /// image, and present it.
    ///
    /// [`FrameOutcome::Recreated`] means the framebuffers changed and any
    /// commands recorded against them must be recorded again.
    pub fn frame(
        &mut self,
        command_for: impl FnOnce(u32) -> Option<vk::CommandBuffer>,
    ) -> PresentResult<FrameOutcome> {
        if self.paused {
            return Ok(FrameOutcome::Skipped);
        }

        let (image_index, acquired) = match self.presenter.acquire_next_image() {
            Ok(pair) => pair,
            Err(e) if !e.is_fatal() => {
                warn!("{e}, recreating");
                return self.rebuild();
            }
            Err(e) => return Err(e),
        };

        let cmd = command_for(image_index).ok_or(PresentError::InvalidImageIndex {
            index: image_index,
            count: self.presenter.image_count(),
        })?;
        let presented = self.presenter.submit_and_present(cmd, image_index)?;

        if acquired.needs_recreate() || presented.needs_recreate() {
            warn!(
                "swapchain {:?} on acquire, {:?} on present, recreating",
                acquired, presented
            );
            return self.rebuild();
        }
        Ok(FrameOutcome::Presented)
    }

    /// Recreate for the last known size. A format change invalidates the
    /// render pass, so the whole presenter is replaced.
    fn rebuild(&mut self) -> PresentResult<FrameOutcome> {
        match self.presenter.recreate(self.size) {
            Ok(()) => Ok(FrameOutcome::Recreated),
            Err(PresentError::ZeroExtent { width, height }) => {
                if !self.paused {
                    info!("surface is {}x{} → paused=true", width, height);
                }
                self.paused = true;
                Ok(FrameOutcome::Skipped)
            }
            Err(e @ PresentError::FormatMismatch { .. }) => {
                warn!("{e}; rebuilding presenter");
                let device = Arc::clone(&self.presenter.device);
                let prefs = self.presenter.prefs().clone();
                // the old presenter idles the device as it drops
                self.presenter = Presenter::new(device, self.size, prefs)?;
                Ok(FrameOutcome::Recreated)
            }
            Err(e) => Err(e),
        }
    }
}
