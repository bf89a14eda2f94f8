// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

/// Knobs for negotiation and pipelining. Everything the presentation layer
/// would otherwise hard-code lives here so tests can feed mock surfaces.
#[derive(Clone, Debug, PartialEq)]
pub struct PresentPrefs {
    /// Number of frame slots (K). Bounds pipelined frames, not swap images.
    pub frames_in_flight: usize,
    /// Format/color-space pair picked when the surface offers it.
    pub surface_format: vk::SurfaceFormatKHR,
    /// Present modes in priority order. FIFO is appended implicitly.
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Depth formats in priority order; the first with optimal-tiling
    /// depth-attachment support wins.
    pub depth_formats: Vec<vk::Format>,
    /// Timeout for fence waits and acquire, in nanoseconds.
    pub fence_timeout_ns: u64,
}

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

impl Default for PresentPrefs {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            // lowest latency first
            present_modes: vec![
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
                vk::PresentModeKHR::FIFO,
            ],
            depth_formats: vec![
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl PresentPrefs {
    /// Apply `CUBIC_FRAMES_IN_FLIGHT` when set to a positive integer.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var("CUBIC_FRAMES_IN_FLIGHT") {
            Ok(v) => self.with_frames_in_flight_str(&v),
            Err(_) => self,
        }
    }

    fn with_frames_in_flight_str(mut self, v: &str) -> Self {
        if let Some(n) = v.trim().parse::<usize>().ok().filter(|&n| n > 0) {
            self.frames_in_flight = n;
        }
        self
    }

    pub fn with_frames_in_flight(mut self, n: usize) -> Self {
        self.frames_in_flight = n.max(1);
        self
    }
}
