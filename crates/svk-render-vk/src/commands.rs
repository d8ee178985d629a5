// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::device::GpuDevice;

/// Pool whose buffers can be reset one by one. Buffers are freed with the pool.
pub struct CommandPool {
    device: Arc<GpuDevice>,
    pool: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: Arc<GpuDevice>, queue_family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = unsafe { device.handle().create_command_pool(&info, None) }
            .context("create_command_pool")?;
        Ok(Self { device, pool })
    }

    pub fn allocate(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        unsafe { self.device.handle().allocate_command_buffers(&info) }
            .context("allocate_command_buffers")
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
    }
}
