// SPDX-License-Identifier: CEPL-1.0
//! Swapchain and everything derived from its images: color views, one depth
//! buffer per image, the render pass and the framebuffers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::PresentDevice;
use crate::error::{vk_err, PresentError, PresentResult};
use crate::format::{fmt_name, SwapchainConfig};

/// One presentable image and the resources built on top of it.
///
/// `image` belongs to the presentation engine and is never freed here.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwapImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_memory: vk::DeviceMemory,
    pub depth_view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

pub struct SwapchainResources<D: PresentDevice> {
    device: Arc<D>,
    swapchain: vk::SwapchainKHR,
    config: SwapchainConfig,
    depth_format: vk::Format,
    render_pass: vk::RenderPass,
    images: Vec<SwapImage>,
    destroyed: bool,
}

impl<D: PresentDevice> SwapchainResources<D> {
    /// Build the swapchain and its per-image resources.
    ///
    /// `old` is only borrowed: its swapchain handle is passed to the driver
    /// so it can recycle state, and the caller stays responsible for
    /// destroying it afterwards. On error everything created so far is
    /// released.
    pub fn create(
        device: Arc<D>,
        config: &SwapchainConfig,
        depth_candidates: &[vk::Format],
        old: Option<&SwapchainResources<D>>,
    ) -> PresentResult<Self> {
        let depth_format = device
            .find_supported_format(
                depth_candidates,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .ok_or_else(|| PresentError::NoDepthFormat(depth_candidates.to_vec()))?;

        let old_swapchain = old.map_or(vk::SwapchainKHR::null(), |o| o.swapchain);
        if old.is_some() {
            debug!("passing old swapchain {:?} as continuity hint", old_swapchain);
        }

        let swapchain = create_swapchain(&*device, config, old_swapchain)?;

        // Everything below is torn down by Drop if a later step fails.
        let mut res = Self {
            device,
            swapchain,
            config: *config,
            depth_format,
            render_pass: vk::RenderPass::null(),
            images: Vec::new(),
            destroyed: false,
        };

        // The driver may hand back more images than `min_image_count`.
        let images = res
            .device
            .swapchain_images(swapchain)
            .map_err(vk_err("get_swapchain_images"))?;

        res.render_pass = create_render_pass(&*res.device, config.format, depth_format)?;

        res.images.reserve(images.len());
        for image in images {
            let mut slot = SwapImage {
                image,
                ..Default::default()
            };
            let built = build_swap_image(&*res.device, &mut slot, res.render_pass, config, depth_format);
            res.images.push(slot);
            built?;
        }

        debug!(
            "swapchain {:?}: {} images, color {}, depth {}, {}x{}",
            res.swapchain,
            res.images.len(),
            fmt_name(config.format),
            fmt_name(depth_format),
            config.extent.width,
            config.extent.height
        );
        Ok(res)
    }

    /// Release every owned handle in dependency order. Safe to call again.
    pub fn destroy(&mut self) {
        if self.destroyed {
            debug!("swapchain resources already destroyed");
            return;
        }
        self.destroyed = true;

        let d = &*self.device;

        // Framebuffers reference the render pass and both views.
        for img in &self.images {
            if img.framebuffer != vk::Framebuffer::null() {
                d.destroy_framebuffer(img.framebuffer);
            }
        }
        if self.render_pass != vk::RenderPass::null() {
            d.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
        for img in &self.images {
            if img.depth_view != vk::ImageView::null() {
                d.destroy_image_view(img.depth_view);
            }
            if img.depth_image != vk::Image::null() {
                d.destroy_image(img.depth_image, img.depth_memory);
            }
        }
        for img in &self.images {
            if img.view != vk::ImageView::null() {
                d.destroy_image_view(img.view);
            }
        }
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            d.destroy_swapchain(self.swapchain);
            debug!("destroyed swapchain {:?}", self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn image_format(&self) -> vk::Format {
        self.config.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.images.get(image_index as usize).map(|img| img.framebuffer)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn swap_images(&self) -> &[SwapImage] {
        &self.images
    }
}

impl<D: PresentDevice> Drop for SwapchainResources<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn create_swapchain<D: PresentDevice>(
    device: &D,
    config: &SwapchainConfig,
    old_swapchain: vk::SwapchainKHR,
) -> PresentResult<vk::SwapchainKHR> {
    let families = device.queue_families();
    let family_indices = [families.graphics, families.present];

    let (image_sharing_mode, queue_family_index_count, p_queue_family_indices) =
        if families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (vk::SharingMode::CONCURRENT, 2, family_indices.as_ptr())
        };

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface: device.surface(),
        min_image_count: config.image_count,
        image_format: config.format,
        image_color_space: config.color_space,
        image_extent: config.extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode,
        queue_family_index_count,
        p_queue_family_indices,
        pre_transform: config.pre_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode: config.present_mode,
        clipped: vk::TRUE,
        old_swapchain,
        ..Default::default()
    };

    device
        .create_swapchain(&swap_info)
        .map_err(vk_err("create_swapchain"))
}

fn create_render_pass<D: PresentDevice>(
    device: &D,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> PresentResult<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };

    // Keep the previous frame's attachment writes from racing this subpass.
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: stages,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };

    device
        .create_render_pass(&rp_info)
        .map_err(vk_err("create_render_pass"))
}

fn create_view<D: PresentDevice>(
    device: &D,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> PresentResult<vk::ImageView> {
    let iv_info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device
        .create_image_view(&iv_info)
        .map_err(vk_err("create_image_view"))
}

/// Fill in `slot` step by step so a failure leaves only valid handles behind.
fn build_swap_image<D: PresentDevice>(
    device: &D,
    slot: &mut SwapImage,
    render_pass: vk::RenderPass,
    config: &SwapchainConfig,
    depth_format: vk::Format,
) -> PresentResult<()> {
    slot.view = create_view(device, slot.image, config.format, vk::ImageAspectFlags::COLOR)?;

    let img_ci = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format: depth_format,
        extent: vk::Extent3D {
            width: config.extent.width,
            height: config.extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let (depth_image, depth_memory) =
        device.create_image(&img_ci, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
    slot.depth_image = depth_image;
    slot.depth_memory = depth_memory;

    slot.depth_view = create_view(device, depth_image, depth_format, vk::ImageAspectFlags::DEPTH)?;

    let attachments = [slot.view, slot.depth_view];
    let fb_info = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        width: config.extent.width,
        height: config.extent.height,
        layers: 1,
        ..Default::default()
    };
    slot.framebuffer = device
        .create_framebuffer(&fb_info)
        .map_err(vk_err("create_framebuffer"))?;
    Ok(())
}
