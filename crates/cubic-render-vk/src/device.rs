// SPDX-License-Identifier: CEPL-1.0
//! The slice of the logical device the presentation layer talks to.
//!
//! Methods mirror the ash calls one-to-one and return raw [`VkResult`]s; the
//! callers attach the stage name when mapping them into
//! [`PresentError`](crate::PresentError).

use ash::prelude::VkResult;
use ash::vk;

use crate::error::PresentResult;
use crate::format::SurfaceSupport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

pub trait PresentDevice {
    fn surface(&self) -> vk::SurfaceKHR;
    fn queue_families(&self) -> QueueFamilies;
    fn surface_support(&self) -> VkResult<SurfaceSupport>;

    /// First candidate whose optimal tiling supports `features`.
    fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format>;

    /// Image plus bound memory with the requested properties.
    fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        properties: vk::MemoryPropertyFlags,
    ) -> PresentResult<(vk::Image, vk::DeviceMemory)>;
    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory);

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);

    /// `Err(vk::Result::TIMEOUT)` when `timeout` nanoseconds pass first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// `(index, suboptimal)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Graphics-queue submit of one command buffer waiting on `wait` at
    /// color-attachment output, signaling `signal` and `fence`.
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;

    /// Block until every queue is idle, presents included. Fences only cover
    /// submits, so this is what makes a retired swapchain safe to free.
    fn wait_idle(&self) -> VkResult<()>;

    /// Present-queue present gated on `wait`. `Ok(true)` means suboptimal.
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
}
