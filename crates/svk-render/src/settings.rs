// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use crate::controller::ResizePolicy;

/// Upper bound on frame-in-flight slots.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
    FifoRelaxed,
}

/// Format hint passed to swapchain construction.
///
/// Construction currently takes the first format the surface reports and
/// only logs when it differs from this hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatPreference {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub present_mode: PresentModePreference,
    pub preferred_format: FormatPreference,
    pub frames_in_flight: usize,
    pub resize_policy: ResizePolicy,
    /// `None` waits without bound. When a bound is set and no image becomes
    /// available in time, the frame fails with `FrameError::Acquire` and the
    /// loop stops; pick a bound that only a hung presentation engine misses.
    pub acquire_timeout: Option<Duration>,
    pub clear_color: [f32; 4],
    pub validation: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            present_mode: PresentModePreference::Fifo,
            preferred_format: FormatPreference::Bgra8Srgb,
            frames_in_flight: 2,
            resize_policy: ResizePolicy::default(),
            acquire_timeout: None,
            clear_color: [0.1, 0.2, 0.3, 1.0],
            validation: cfg!(debug_assertions),
        }
    }
}

impl RenderSettings {
    pub fn slot_count(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX)
    }
}
