// SPDX-License-Identifier: CEPL-1.0
//! CPU/GPU pacing: K frame slots, each with an image-available semaphore, a
//! render-finished semaphore and an in-flight fence, plus a table remembering
//! which fence last used each swapchain image.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::PresentDevice;
use crate::error::{vk_err, PresentError, PresentResult, PresentStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

pub struct FrameSynchronizer<D: PresentDevice> {
    device: Arc<D>,
    frames: Vec<FrameSync>,
    /// Fence of the slot that last submitted work for each swapchain image.
    images_in_flight: Vec<Option<vk::Fence>>,
    /// false once a fence has been reset and not yet handed to a submit;
    /// waiting on such a fence would never return.
    armed: Vec<bool>,
    current_frame: usize,
    timeout: u64,
    destroyed: bool,
}

impl<D: PresentDevice> FrameSynchronizer<D> {
    /// `frames_in_flight` slots for a swapchain of `image_count` images.
    /// Fences start signaled so the first wait on each slot passes.
    pub fn new(
        device: Arc<D>,
        frames_in_flight: usize,
        image_count: usize,
        timeout: u64,
    ) -> PresentResult<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        let mut sync = Self {
            device,
            frames: Vec::with_capacity(frames_in_flight),
            images_in_flight: vec![None; image_count],
            armed: Vec::with_capacity(frames_in_flight),
            current_frame: 0,
            timeout,
            destroyed: false,
        };

        for _ in 0..frames_in_flight {
            let mut slot = FrameSync::default();
            let built = create_slot(&*sync.device, &mut slot);
            sync.frames.push(slot);
            sync.armed.push(true);
            built?;
        }

        debug!(
            "frame sync: {} frames in flight, {} swap images",
            frames_in_flight, image_count
        );
        Ok(sync)
    }

    /// Wait for the current slot to retire, then take the next image.
    pub fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
    ) -> PresentResult<(u32, PresentStatus)> {
        let frame = self.frames[self.current_frame];
        self.wait("wait_in_flight_fence", frame.in_flight)?;

        match self
            .device
            .acquire_next_image(swapchain, self.timeout, frame.image_available)
        {
            Ok((index, false)) => Ok((index, PresentStatus::Ok)),
            Ok((index, true)) => Ok((index, PresentStatus::Suboptimal)),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(PresentError::DeviceLost {
                    stage: "acquire_next_image",
                })
            }
            Err(e) => Err(PresentError::from_vk("acquire_next_image", e)),
        }
    }

    /// Submit `command_buffer` for `image_index` and queue the image for
    /// presentation. Advances to the next slot even when the swapchain
    /// turns out to be out of date.
    pub fn submit_and_present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> PresentResult<PresentStatus> {
        let idx = image_index as usize;
        if idx >= self.images_in_flight.len() {
            return Err(PresentError::InvalidImageIndex {
                index: image_index,
                count: self.images_in_flight.len(),
            });
        }

        let cur = self.current_frame;
        let frame = self.frames[cur];

        // Another slot may still be rendering into this image.
        if let Some(prev) = self.images_in_flight[idx] {
            if prev != frame.in_flight {
                self.wait("wait_image_fence", prev)?;
            }
        }
        self.images_in_flight[idx] = Some(frame.in_flight);

        self.device
            .reset_fence(frame.in_flight)
            .map_err(vk_err("reset_fence"))?;
        self.armed[cur] = false;

        self.device
            .submit(
                command_buffer,
                frame.image_available,
                frame.render_finished,
                frame.in_flight,
            )
            .map_err(vk_err("queue_submit"))?;
        self.armed[cur] = true;

        let status = match self
            .device
            .present(swapchain, image_index, frame.render_finished)
        {
            Ok(false) => PresentStatus::Ok,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => return Err(PresentError::from_vk("queue_present", e)),
        };

        self.current_frame = (cur + 1) % self.frames.len();
        Ok(status)
    }

    /// Wait on every submitted slot fence. Errors are logged, not returned,
    /// since this runs on teardown paths.
    pub(crate) fn drain(&mut self) {
        for (i, frame) in self.frames.iter().enumerate() {
            if !self.armed[i] || frame.in_flight == vk::Fence::null() {
                continue;
            }
            if let Err(e) = self.device.wait_for_fence(frame.in_flight, self.timeout) {
                warn!("frame {} fence did not signal on drain: {}", i, e);
            }
        }
    }

    /// Drain, then release the semaphores and fences. Safe to call again.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.drain();

        let d = &*self.device;
        for frame in self.frames.drain(..) {
            if frame.image_available != vk::Semaphore::null() {
                d.destroy_semaphore(frame.image_available);
            }
            if frame.render_finished != vk::Semaphore::null() {
                d.destroy_semaphore(frame.render_finished);
            }
            if frame.in_flight != vk::Fence::null() {
                d.destroy_fence(frame.in_flight);
            }
        }
        self.armed.clear();
        self.images_in_flight.clear();
        debug!("frame sync destroyed");
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn image_fence(&self, image_index: u32) -> Option<vk::Fence> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    pub(crate) fn frame(&self, slot: usize) -> Option<&FrameSync> {
        self.frames.get(slot)
    }

    fn wait(&self, stage: &'static str, fence: vk::Fence) -> PresentResult<()> {
        self.device
            .wait_for_fence(fence, self.timeout)
            .map_err(|e| match e {
                // a bounded wait that expires means the GPU stopped making progress
                vk::Result::TIMEOUT => PresentError::DeviceLost { stage },
                e => PresentError::from_vk(stage, e),
            })
    }
}

impl<D: PresentDevice> Drop for FrameSynchronizer<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn create_slot<D: PresentDevice>(device: &D, slot: &mut FrameSync) -> PresentResult<()> {
    slot.image_available = device
        .create_semaphore()
        .map_err(vk_err("create_semaphore"))?;
    slot.render_finished = device
        .create_semaphore()
        .map_err(vk_err("create_semaphore"))?;
    slot.in_flight = device.create_fence(true).map_err(vk_err("create_fence"))?;
    Ok(())
}
