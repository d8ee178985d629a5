// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use svk_render::{FrameController, FrameOutcome, RenderSettings, RenderSize, Renderer};
use tracing::{info, warn};

pub mod commands;
pub mod device;
pub mod driver;
pub mod frames;
pub mod recorder;
pub mod render_target;
pub mod swapchain;
pub mod sync;

pub use device::{DeviceOptions, GpuDevice, QueueFamilies};
pub use driver::{SupportDetails, SwapchainDriver};
pub use frames::VkFrames;
pub use recorder::{ClearPass, CommandRecorder, RecordTarget};
pub use render_target::{AttachmentLayout, RenderTarget};
pub use swapchain::{ImageSharing, Swapchain, SwapchainPlan};
pub use sync::{Fence, FrameSync, Semaphore};

pub struct VkRenderer {
    controller: FrameController<VkFrames<ClearPass>>,
}

impl VkRenderer {
    pub fn extent(&self) -> vk::Extent2D {
        self.controller.device().swapchain().extent()
    }

    pub fn format(&self) -> vk::Format {
        self.controller.device().swapchain().format()
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.controller.device().swapchain().present_mode()
    }

    pub fn frame(&self) -> u64 {
        self.controller.frame()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let options = DeviceOptions {
            validation: settings.validation,
            ..DeviceOptions::default()
        };
        let device = Arc::new(GpuDevice::new(window, display, &options)?);
        let frames = VkFrames::new(
            device,
            size,
            settings,
            ClearPass::new(settings.clear_color),
        )?;
        info!(
            "vk: renderer up, {}x{} {:?} {:?}",
            frames.swapchain().extent().width,
            frames.swapchain().extent().height,
            frames.swapchain().format(),
            frames.swapchain().present_mode()
        );

        Ok(Self {
            controller: FrameController::new(frames, size, settings.resize_policy),
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.controller
            .notify_resize(size)
            .context("resize")?;
        Ok(())
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        Ok(self.controller.draw_frame()?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.controller
            .device_mut()
            .recorder_mut()
            .set_clear_color(rgba);
    }

    fn shutdown(&mut self) -> Result<()> {
        self.controller
            .shutdown()
            .context("wait for device idle")
    }
}

// STRICT TEARDOWN ORDER: drain every queue before the frames drop their
// primitives, framebuffers, views and swapchain.
impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.controller.shutdown() {
            warn!("vk: idle-wait before teardown failed: {e}");
        }
    }
}
