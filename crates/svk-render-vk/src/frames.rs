// SPDX-License-Identifier: CEPL-1.0
//! [`FrameDevice`] over ash.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use svk_render::{
    FrameDevice, FrameError, FrameInfo, FrameResult, RenderSettings, RenderSize, SurfaceStatus,
};
use tracing::debug;

use crate::commands::CommandPool;
use crate::device::GpuDevice;
use crate::recorder::{CommandRecorder, RecordTarget};
use crate::render_target::{AttachmentLayout, RenderTarget};
use crate::swapchain::{vk_format, vk_present_mode, Swapchain};
use crate::sync::{create_frame_syncs, FrameSync};

// Fields drop top to bottom: primitives and command buffers first, then the
// image set (framebuffers, views, swapchain), then the render pass they were
// built against. Callers drain the device before dropping.
pub struct VkFrames<R: CommandRecorder> {
    sync: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    _command_pool: CommandPool,
    swapchain: Swapchain<GpuDevice>,
    render_target: RenderTarget,
    recorder: R,
    acquire_timeout: u64,
    device: Arc<GpuDevice>,
}

impl<R: CommandRecorder> VkFrames<R> {
    pub fn new(
        device: Arc<GpuDevice>,
        size: RenderSize,
        settings: &RenderSettings,
        recorder: R,
    ) -> Result<Self> {
        let mut swapchain = Swapchain::new(
            device.clone(),
            size,
            vk_format(settings.preferred_format),
            vk_present_mode(settings.present_mode),
        )
        .context("create swapchain")?;

        let render_target = RenderTarget::new(device.clone(), swapchain.format())?;
        swapchain
            .init_framebuffers(&render_target)
            .context("init framebuffers")?;

        let slots = settings.slot_count();
        let sync = create_frame_syncs(&device, slots)?;
        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;
        let command_buffers = command_pool.allocate(slots)?;

        debug!(
            "frames: {} slot(s) over {} image(s)",
            slots,
            swapchain.image_count()
        );

        Ok(Self {
            sync,
            command_buffers,
            _command_pool: command_pool,
            swapchain,
            render_target,
            recorder,
            acquire_timeout: settings.acquire_timeout_ns(),
            device,
        })
    }

    pub fn swapchain(&self) -> &Swapchain<GpuDevice> {
        &self.swapchain
    }

    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }
}

impl<R: CommandRecorder> FrameDevice for VkFrames<R> {
    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> FrameResult<()> {
        if self.sync[slot].in_flight.wait(u64::MAX)? {
            Ok(())
        } else {
            Err(FrameError::SyncWait(format!("slot {slot} fence timed out")))
        }
    }

    fn acquire(&mut self, slot: usize) -> FrameResult<(u32, SurfaceStatus)> {
        self.swapchain.acquire_image(
            self.sync[slot].image_ready.handle(),
            vk::Fence::null(),
            self.acquire_timeout,
        )
    }

    fn reset_slot(&mut self, slot: usize) -> FrameResult<()> {
        self.sync[slot].in_flight.reset()
    }

    fn record(&mut self, frame: &FrameInfo) -> FrameResult<()> {
        let framebuffer = self
            .swapchain
            .framebuffer(frame.image_index)
            .ok_or_else(|| {
                FrameError::Record(anyhow::anyhow!(
                    "no framebuffer for image {}",
                    frame.image_index
                ))
            })?;
        let target = RecordTarget {
            image_index: frame.image_index,
            framebuffer,
            render_pass: self.render_target.render_pass(),
            extent: self.swapchain.extent(),
        };
        self.recorder
            .record(
                self.device.handle(),
                self.command_buffers[frame.slot],
                &target,
            )
            .map_err(FrameError::Record)
    }

    fn submit(&mut self, frame: &FrameInfo) -> FrameResult<()> {
        let sync = &self.sync[frame.slot];
        let waits = [sync.image_ready.handle()];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let cmds = [self.command_buffers[frame.slot]];
        let signals = [sync.render_finished.handle()];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                std::slice::from_ref(&submit),
                sync.in_flight.handle(),
            )
        }
        .map_err(|e| FrameError::Submit(format!("queue_submit: {e}")))
    }

    fn present(&mut self, frame: &FrameInfo) -> FrameResult<SurfaceStatus> {
        self.swapchain.present(
            frame.image_index,
            self.sync[frame.slot].render_finished.handle(),
        )
    }

    fn wait_idle(&mut self) -> FrameResult<()> {
        self.device.wait_idle()
    }

    fn recreate(&mut self, size: RenderSize) -> FrameResult<bool> {
        self.swapchain.recreate(size)
    }
}
