// SPDX-License-Identifier: CEPL-1.0
//! Command recording for one frame.

use anyhow::{Context, Result};
use ash::vk;

/// Where the acquired image is rendered.
#[derive(Clone, Copy, Debug)]
pub struct RecordTarget {
    pub image_index: u32,
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
}

/// Fills a slot's command buffer. The buffer is not pending on the GPU when
/// this is called.
pub trait CommandRecorder {
    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &RecordTarget,
    ) -> Result<()>;
}

/// Clears the whole image to one colour.
#[derive(Clone, Debug)]
pub struct ClearPass {
    clear: [f32; 4],
}

impl ClearPass {
    pub fn new(clear: [f32; 4]) -> Self {
        Self { clear }
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear
    }

    fn clear_values(&self) -> [vk::ClearValue; 1] {
        [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear,
            },
        }]
    }
}

impl CommandRecorder for ClearPass {
    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &RecordTarget,
    ) -> Result<()> {
        let clear_values = self.clear_values();
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let pass = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("reset_command_buffer")?;
            device
                .begin_command_buffer(cmd, &begin)
                .context("begin_command_buffer")?;
            device.cmd_begin_render_pass(cmd, &pass, vk::SubpassContents::INLINE);
            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("end_command_buffer")?;
        }
        Ok(())
    }
}
