// SPDX-License-Identifier: CEPL-1.0
//! Semaphores and fences.
//!
//! - [`Semaphore`]: GPU-to-GPU signal between queue operations
//! - [`Fence`]: GPU-to-CPU completion signal the host can wait on
//! - [`FrameSync`]: the set owned by one frame-in-flight slot
//!
//! All of them outlive any single swapchain.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use svk_render::{FrameError, FrameResult};
use tracing::debug;

use crate::device::GpuDevice;

pub struct Semaphore {
    device: Arc<GpuDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Created unsignaled.
    pub fn new(device: Arc<GpuDevice>) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore =
            unsafe { device.handle().create_semaphore(&info, None) }.context("create_semaphore")?;
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

pub struct Fence {
    device: Arc<GpuDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// `signaled` fences don't block the first wait.
    pub fn new(device: Arc<GpuDevice>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&info, None) }.context("create_fence")?;
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until signaled. Returns `false` if `timeout_ns` ran out first.
    pub fn wait(&self, timeout_ns: u64) -> FrameResult<bool> {
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)
        };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(FrameError::SyncWait(format!("wait_for_fences: {e}"))),
        }
    }

    pub fn reset(&self) -> FrameResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence]) }
            .map_err(|e| FrameError::SyncWait(format!("reset_fences: {e}")))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Primitives of one frame-in-flight slot.
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit.
    pub image_ready: Semaphore,
    /// Signaled by submit, waited on by present.
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completes. Starts signaled.
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<GpuDevice>) -> Result<Self> {
        Ok(Self {
            image_ready: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

pub fn create_frame_syncs(device: &Arc<GpuDevice>, count: usize) -> Result<Vec<FrameSync>> {
    let syncs = (0..count)
        .map(|_| FrameSync::new(device))
        .collect::<Result<Vec<_>>>()?;
    debug!("created sync primitives for {} frame slot(s)", count);
    Ok(syncs)
}
