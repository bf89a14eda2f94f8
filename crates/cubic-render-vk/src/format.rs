// SPDX-License-Identifier: CEPL-1.0
//! Swapchain parameter negotiation: surface format, present mode, extent and
//! image count, all derived from what the surface reports.

use ash::vk;
use cubic_render::RenderSize;
use tracing::info;

use crate::config::PresentPrefs;
use crate::error::{PresentError, PresentResult};

/// Snapshot of what a surface supports, queried once per (re)creation.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Parameters the swapchain is built with. Immutable once negotiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

pub fn negotiate(
    support: &SurfaceSupport,
    want: RenderSize,
    prefs: &PresentPrefs,
) -> PresentResult<SwapchainConfig> {
    let caps = &support.capabilities;
    let surf_format = choose_surface_format(&support.formats, prefs.surface_format)?;
    let present_mode = choose_present_mode(&support.present_modes, &prefs.present_modes);
    let extent = extent_from_caps(caps, want);

    if extent.width == 0 || extent.height == 0 {
        return Err(PresentError::ZeroExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    let image_count = choose_image_count(caps);

    info!(
        "format: {} / {}, present_mode: {}, extent: {}x{}, images(min={} → picked={})",
        fmt_name(surf_format.format),
        cs_name(surf_format.color_space),
        pm_name(present_mode),
        extent.width,
        extent.height,
        caps.min_image_count,
        image_count
    );

    Ok(SwapchainConfig {
        format: surf_format.format,
        color_space: surf_format.color_space,
        present_mode,
        extent,
        image_count,
        pre_transform: caps.current_transform,
    })
}

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> PresentResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|&f| f == preferred)
        .or_else(|| formats.first().copied())
        .ok_or(PresentError::NoSurfaceFormats)
}

/// First mode of `priority` the surface offers; FIFO is always available.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    priority: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    priority
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `current_extent.width == u32::MAX` means the window decides; otherwise the
/// surface dictates the size (e.g. under DPI scaling).
pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum for better overlap, capped by max (0 == no max).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

// Info only
pub fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        vk::Format::D32_SFLOAT => "D32_SFLOAT",
        vk::Format::D32_SFLOAT_S8_UINT => "D32_SFLOAT_S8_UINT",
        vk::Format::D24_UNORM_S8_UINT => "D24_UNORM_S8_UINT",
        _ => "OTHER",
    }
}

pub fn cs_name(cs: vk::ColorSpaceKHR) -> &'static str {
    match cs {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => "SRGB_NONLINEAR",
        vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT => "DISPLAY_P3_NONLINEAR",
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => "EXTENDED_SRGB_LINEAR",
        _ => "OTHER",
    }
}

pub fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
