// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod controller;
pub mod error;
pub mod settings;

pub use controller::{FrameController, FrameDevice, FrameInfo, FrameOutcome, ResizePolicy};
pub use error::{FrameError, FrameResult};
pub use settings::{FormatPreference, PresentModePreference, RenderSettings, MAX_FRAMES_IN_FLIGHT};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while the window is minimized (either side is zero).
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Driver feedback from acquire and present.
///
/// `SubOptimal` and `OutOfDate` are control flow, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The image set matches the surface.
    Ready,
    /// Usable, but the geometry no longer matches; recreate soon.
    SubOptimal,
    /// Not usable; recreate before going on.
    OutOfDate,
}

impl SurfaceStatus {
    pub fn needs_recreate(self) -> bool {
        !matches!(self, SurfaceStatus::Ready)
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);

    /// Waits for the GPU to go idle. Safe to call more than once.
    fn shutdown(&mut self) -> Result<()>;
}
