// SPDX-License-Identifier: CEPL-1.0
//! Vulkan presentation for Cubic: swapchain negotiation, per-image resources,
//! frames-in-flight pacing and swapchain recreation, plus a clear-only
//! [`VkRenderer`] built on top of them.
//!
//! Everything below [`Presenter`] talks to the GPU through [`PresentDevice`],
//! so it runs against [`AshDevice`] on hardware and a recording mock in tests.

mod ash_device;
mod config;
mod device;
mod error;
mod format;
mod frame_loop;
mod frame_sync;
mod presenter;
mod recreate;
mod renderer;
mod swapchain;

#[cfg(test)]
pub(crate) mod mock;

pub use ash_device::AshDevice;
pub use config::{PresentPrefs, DEFAULT_FRAMES_IN_FLIGHT};
pub use device::{PresentDevice, QueueFamilies};
pub use error::{PresentError, PresentResult, PresentStatus};
pub use format::{
    choose_image_count, choose_present_mode, choose_surface_format, cs_name, extent_from_caps,
    fmt_name, negotiate, pm_name, SurfaceSupport, SwapchainConfig,
};
pub use frame_loop::FrameLoop;
pub use frame_sync::{FrameSync, FrameSynchronizer};
pub use presenter::Presenter;
pub use renderer::VkRenderer;
pub use swapchain::{SwapImage, SwapchainResources};

pub use ash::vk;
