// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Everything the presentation layer can fail with.
///
/// Only [`PresentError::OutOfDate`] and [`PresentError::ZeroExtent`] are
/// recoverable by the caller (recreate, or wait for a non-zero window size).
/// The rest abort initialization or the frame loop.
#[derive(Error, Debug)]
pub enum PresentError {
    #[error("{stage} failed: {result}")]
    Vulkan {
        stage: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("no depth format among {0:?} supports optimal-tiling depth attachments")]
    NoDepthFormat(Vec<vk::Format>),

    #[error("no memory type matches bits {type_bits:#b} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("surface extent {width}x{height} has zero area")]
    ZeroExtent { width: u32, height: u32 },

    #[error("swapchain out of date during {stage}")]
    OutOfDate { stage: &'static str },

    #[error(
        "swapchain formats changed on recreation (color {:?} -> {:?}, depth {:?} -> {:?})",
        .old.0, .new.0, .old.1, .new.1
    )]
    FormatMismatch {
        /// (color, depth) of the instance being replaced.
        old: (vk::Format, vk::Format),
        /// (color, depth) of the freshly built instance.
        new: (vk::Format, vk::Format),
    },

    #[error("device lost during {stage}")]
    DeviceLost { stage: &'static str },

    #[error("image index {index} out of range ({count} swap images)")]
    InvalidImageIndex { index: u32, count: usize },
}

pub type PresentResult<T> = std::result::Result<T, PresentError>;

impl PresentError {
    /// Map a raw driver result, folding device loss into its own variant.
    pub fn from_vk(stage: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => PresentError::DeviceLost { stage },
            vk::Result::ERROR_OUT_OF_DATE_KHR => PresentError::OutOfDate { stage },
            result => PresentError::Vulkan { stage, result },
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PresentError::OutOfDate { .. } | PresentError::ZeroExtent { .. }
        )
    }
}

/// Helper for `map_err` at call sites: `.map_err(vk_err("create_swapchain"))`.
pub(crate) fn vk_err(stage: &'static str) -> impl Fn(vk::Result) -> PresentError {
    move |result| PresentError::from_vk(stage, result)
}

/// Driver status handed back to the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Ok,
    /// Still presentable, but the swapchain no longer matches the surface.
    Suboptimal,
    /// The swapchain must be recreated before the next frame.
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreate(self) -> bool {
        self != PresentStatus::Ok
    }
}
