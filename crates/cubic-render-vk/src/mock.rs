// SPDX-License-Identifier: CEPL-1.0
//! Recording stand-in for the GPU used by the unit tests.
//!
//! Hands out unique fake handles, logs every call in order, and models fence
//! state: a submit makes a fence pending, and a CPU wait on it is taken as
//! the GPU finishing that work.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use cubic_render::RenderSize;

use crate::config::PresentPrefs;
use crate::device::{PresentDevice, QueueFamilies};
use crate::error::{PresentError, PresentResult};
use crate::format::{negotiate, SurfaceSupport, SwapchainConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateSwapchain(vk::SwapchainKHR),
    DestroySwapchain(vk::SwapchainKHR),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    CreateRenderPass(vk::RenderPass),
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateFence(vk::Fence),
    DestroyFence(vk::Fence),
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitIdle,
    Acquire {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    },
    Submit {
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    },
}

#[derive(Clone, Debug)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub dependency: vk::SubpassDependency,
}

#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    pub handle: vk::SwapchainKHR,
    pub old: vk::SwapchainKHR,
    pub min_image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_families: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

struct State {
    next_handle: u64,
    live: HashSet<u64>,
    double_frees: usize,
    log: Vec<Call>,

    support: SurfaceSupport,
    families: QueueFamilies,
    depth_support: Vec<vk::Format>,
    engine_image_count: Option<u32>,
    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_acquire: HashMap<vk::SwapchainKHR, u32>,

    fences: HashMap<vk::Fence, FenceState>,
    hung: HashSet<vk::Fence>,
    max_pending: usize,
    submit_signaled_fence: usize,
    reset_pending_fence: usize,

    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    /// stage -> successful calls left before the injected failure
    failures: HashMap<&'static str, usize>,

    render_passes: HashMap<vk::RenderPass, RenderPassDesc>,
    swapchains: Vec<SwapchainDesc>,
}

pub struct MockDevice {
    state: RefCell<State>,
}

impl MockDevice {
    pub fn new() -> Self {
        let support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Self {
            state: RefCell::new(State {
                next_handle: 0x1000,
                live: HashSet::new(),
                double_frees: 0,
                log: Vec::new(),
                support,
                families: QueueFamilies {
                    graphics: 0,
                    present: 0,
                },
                depth_support: vec![
                    vk::Format::D32_SFLOAT,
                    vk::Format::D32_SFLOAT_S8_UINT,
                    vk::Format::D24_UNORM_S8_UINT,
                ],
                engine_image_count: None,
                swapchain_images: HashMap::new(),
                next_acquire: HashMap::new(),
                fences: HashMap::new(),
                hung: HashSet::new(),
                max_pending: 0,
                submit_signaled_fence: 0,
                reset_pending_fence: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                failures: HashMap::new(),
                render_passes: HashMap::new(),
                swapchains: Vec::new(),
            }),
        }
    }

    /// Hand back `n` images regardless of the requested minimum.
    pub fn with_engine_image_count(self, n: u32) -> Self {
        self.state.borrow_mut().engine_image_count = Some(n);
        self
    }

    pub fn with_queue_families(self, graphics: u32, present: u32) -> Self {
        self.state.borrow_mut().families = QueueFamilies { graphics, present };
        self
    }

    pub fn with_depth_support(self, formats: &[vk::Format]) -> Self {
        self.set_depth_support(formats);
        self
    }

    pub fn set_depth_support(&self, formats: &[vk::Format]) {
        self.state.borrow_mut().depth_support = formats.to_vec();
    }

    pub fn set_surface_formats(&self, formats: &[vk::SurfaceFormatKHR]) {
        self.state.borrow_mut().support.formats = formats.to_vec();
    }

    pub fn set_current_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().support.capabilities.current_extent = vk::Extent2D { width, height };
    }

    pub fn default_config(&self) -> SwapchainConfig {
        let support = self.state.borrow().support.clone();
        negotiate(
            &support,
            RenderSize {
                width: 800,
                height: 600,
            },
            &PresentPrefs::default(),
        )
        .expect("mock surface negotiates")
    }

    pub fn depth_candidates(&self) -> Vec<vk::Format> {
        PresentPrefs::default().depth_formats
    }

    /// Let `after` calls to `stage` succeed, then fail the next one.
    pub fn fail_on(&self, stage: &'static str, after: usize) {
        self.state.borrow_mut().failures.insert(stage, after);
    }

    pub fn script_acquire(&self, results: impl IntoIterator<Item = VkResult<(u32, bool)>>) {
        self.state.borrow_mut().acquire_script.extend(results);
    }

    pub fn script_present(&self, results: impl IntoIterator<Item = VkResult<bool>>) {
        self.state.borrow_mut().present_script.extend(results);
    }

    /// Waits on `fence` time out from now on.
    pub fn hang_fence(&self, fence: vk::Fence) {
        self.state.borrow_mut().hung.insert(fence);
    }

    pub fn log(&self) -> Vec<Call> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    pub fn live_handles(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.state.borrow().live.contains(&raw)
    }

    pub fn double_frees(&self) -> usize {
        self.state.borrow().double_frees
    }

    pub fn pending_fences(&self) -> usize {
        self.state.borrow().fences.values().filter(|f| f.pending).count()
    }

    pub fn max_pending(&self) -> usize {
        self.state.borrow().max_pending
    }

    pub fn fence_is_pending(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence).is_some_and(|f| f.pending)
    }

    /// Protocol violations: submitting with a signaled fence, or resetting a
    /// fence the GPU still owns.
    pub fn violations(&self) -> usize {
        let s = self.state.borrow();
        s.submit_signaled_fence + s.reset_pending_fence
    }

    pub fn render_pass_desc(&self, rp: vk::RenderPass) -> Option<RenderPassDesc> {
        self.state.borrow().render_passes.get(&rp).cloned()
    }

    pub fn last_swapchain_desc(&self) -> Option<SwapchainDesc> {
        self.state.borrow().swapchains.last().cloned()
    }

    fn mint<H: Handle>(&self) -> H {
        let mut s = self.state.borrow_mut();
        s.next_handle += 1;
        let raw = s.next_handle;
        s.live.insert(raw);
        H::from_raw(raw)
    }

    fn release<H: Handle>(&self, handle: H) {
        let mut s = self.state.borrow_mut();
        if !s.live.remove(&handle.as_raw()) {
            s.double_frees += 1;
        }
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().log.push(call);
    }

    fn injected(&self, stage: &'static str) -> bool {
        let mut s = self.state.borrow_mut();
        let Some(left) = s.failures.get_mut(stage) else {
            return false;
        };
        if *left > 0 {
            *left -= 1;
            return false;
        }
        s.failures.remove(stage);
        true
    }
}

impl PresentDevice for MockDevice {
    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xface)
    }

    fn queue_families(&self) -> QueueFamilies {
        self.state.borrow().families
    }

    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        if self.injected("surface_support") {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(self.state.borrow().support.clone())
    }

    fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        _tiling: vk::ImageTiling,
        _features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        let s = self.state.borrow();
        candidates.iter().copied().find(|f| s.depth_support.contains(f))
    }

    fn create_image(
        &self,
        _info: &vk::ImageCreateInfo<'_>,
        _properties: vk::MemoryPropertyFlags,
    ) -> PresentResult<(vk::Image, vk::DeviceMemory)> {
        if self.injected("create_image") {
            return Err(PresentError::Vulkan {
                stage: "allocate_memory",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        let image: vk::Image = self.mint();
        // memory lives and dies with its image
        let memory = vk::DeviceMemory::from_raw(image.as_raw() | 1 << 48);
        self.record(Call::CreateImage(image));
        Ok((image, memory))
    }

    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        assert_eq!(memory.as_raw(), image.as_raw() | 1 << 48, "memory/image mismatch");
        self.release(image);
        self.record(Call::DestroyImage(image));
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR> {
        if self.injected("create_swapchain") {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let handle: vk::SwapchainKHR = self.mint();
        let count = self
            .state
            .borrow()
            .engine_image_count
            .unwrap_or(info.min_image_count);
        // engine-owned images are not tracked as live
        let images = (0..count)
            .map(|i| vk::Image::from_raw(handle.as_raw() << 8 | u64::from(i)))
            .collect();

        let queue_families = if info.queue_family_index_count > 0 {
            unsafe {
                std::slice::from_raw_parts(
                    info.p_queue_family_indices,
                    info.queue_family_index_count as usize,
                )
            }
            .to_vec()
        } else {
            Vec::new()
        };

        let mut s = self.state.borrow_mut();
        s.swapchain_images.insert(handle, images);
        s.swapchains.push(SwapchainDesc {
            handle,
            old: info.old_swapchain,
            min_image_count: info.min_image_count,
            sharing_mode: info.image_sharing_mode,
            queue_families,
        });
        s.log.push(Call::CreateSwapchain(handle));
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .borrow()
            .swapchain_images
            .get(&swapchain)
            .cloned()
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.release(swapchain);
        self.record(Call::DestroySwapchain(swapchain));
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        if self.injected("create_image_view") {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let view = self.mint();
        self.record(Call::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.release(view);
        self.record(Call::DestroyImageView(view));
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        if self.injected("create_render_pass") {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let rp = self.mint();
        let desc = unsafe {
            RenderPassDesc {
                attachments: std::slice::from_raw_parts(
                    info.p_attachments,
                    info.attachment_count as usize,
                )
                .to_vec(),
                dependency: *info.p_dependencies,
            }
        };
        self.state.borrow_mut().render_passes.insert(rp, desc);
        self.record(Call::CreateRenderPass(rp));
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.release(render_pass);
        self.record(Call::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        if self.injected("create_framebuffer") {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let fb = self.mint();
        self.record(Call::CreateFramebuffer(fb));
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release(framebuffer);
        self.record(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        if self.injected("create_semaphore") {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let sem = self.mint();
        self.record(Call::CreateSemaphore(sem));
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.release(semaphore);
        self.record(Call::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        if self.injected("create_fence") {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let fence = self.mint();
        self.state.borrow_mut().fences.insert(
            fence,
            FenceState {
                signaled,
                pending: false,
            },
        );
        self.record(Call::CreateFence(fence));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.release(fence);
        self.state.borrow_mut().fences.remove(&fence);
        self.record(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        self.record(Call::WaitFence(fence));
        let mut s = self.state.borrow_mut();
        if s.hung.contains(&fence) {
            return Err(vk::Result::TIMEOUT);
        }
        let f = s.fences.get_mut(&fence).ok_or(vk::Result::ERROR_UNKNOWN)?;
        // the GPU finishes whatever this fence guards
        f.signaled = true;
        f.pending = false;
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.record(Call::ResetFence(fence));
        let mut s = self.state.borrow_mut();
        let f = *s.fences.get(&fence).ok_or(vk::Result::ERROR_UNKNOWN)?;
        if f.pending {
            s.reset_pending_fence += 1;
        }
        if let Some(f) = s.fences.get_mut(&fence) {
            f.signaled = false;
        }
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.record(Call::WaitIdle);
        if self.injected("wait_idle") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        // everything submitted so far completes
        for f in self.state.borrow_mut().fences.values_mut() {
            if f.pending {
                f.pending = false;
                f.signaled = true;
            }
        }
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.record(Call::Acquire {
            swapchain,
            semaphore,
        });
        let mut s = self.state.borrow_mut();
        if let Some(scripted) = s.acquire_script.pop_front() {
            return scripted;
        }
        // swapchains the mock never created behave like a 3-image chain
        let fallback = s.engine_image_count.unwrap_or(3);
        let count = s
            .swapchain_images
            .get(&swapchain)
            .map_or(fallback, |v| v.len() as u32);
        let next = s.next_acquire.entry(swapchain).or_insert(0);
        let index = *next % count;
        *next += 1;
        Ok((index, false))
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        if self.injected("queue_submit") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        self.record(Call::Submit {
            command_buffer,
            wait,
            signal,
            fence,
        });
        let mut s = self.state.borrow_mut();
        let f = s.fences.get_mut(&fence).ok_or(vk::Result::ERROR_UNKNOWN)?;
        let was_signaled = f.signaled;
        f.pending = true;
        if was_signaled {
            s.submit_signaled_fence += 1;
        }
        let pending = s.fences.values().filter(|f| f.pending).count();
        s.max_pending = s.max_pending.max(pending);
        Ok(())
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.record(Call::Present {
            swapchain,
            image_index,
            wait,
        });
        self.state
            .borrow_mut()
            .present_script
            .pop_front()
            .unwrap_or(Ok(false))
    }
}
