// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

use crate::device::GpuDevice;

/// Attachment-compatibility token framebuffers are created against.
pub trait AttachmentLayout {
    fn render_pass(&self) -> vk::RenderPass;
}

/// Single colour attachment, cleared on load and handed to the presentation
/// engine at the end of the pass.
pub struct RenderTarget {
    device: Arc<GpuDevice>,
    render_pass: vk::RenderPass,
    format: vk::Format,
}

impl RenderTarget {
    pub fn new(device: Arc<GpuDevice>, format: vk::Format) -> Result<Self> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        // Layout transition waits for the acquire semaphore's stage.
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&info, None) }
            .context("create_render_pass")?;
        debug!("render target: {:?}", format);

        Ok(Self {
            device,
            render_pass,
            format,
        })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl AttachmentLayout for RenderTarget {
    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
    }
}
