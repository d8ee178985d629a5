// SPDX-License-Identifier: CEPL-1.0
//! Native calls made by the presentable image set.
//!
//! [`Swapchain`](crate::swapchain::Swapchain) only talks to the GPU through
//! [`SwapchainDriver`]. [`GpuDevice`] is the real implementation.

use ash::prelude::VkResult;
use ash::vk;

use crate::device::{GpuDevice, QueueFamilies};
use crate::swapchain::{ImageSharing, SwapchainPlan};

/// What the surface supports on the chosen adapter.
#[derive(Clone, Debug)]
pub struct SupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SupportDetails {
    /// At least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The destroy calls must only be made once no queued GPU work references
/// the handle.
pub trait SwapchainDriver {
    fn queue_families(&self) -> QueueFamilies;
    fn query_support(&self) -> VkResult<SupportDetails>;

    fn create_swapchain(&self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// `Ok((index, suboptimal))`; out-of-date, timeouts and losses are `Err`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)>;

    /// Presents on the presentation queue. `Ok(true)` means suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
}

impl SwapchainDriver for GpuDevice {
    fn queue_families(&self) -> QueueFamilies {
        GpuDevice::queue_families(self)
    }

    fn query_support(&self) -> VkResult<SupportDetails> {
        let loader = self.surface_loader();
        let (phys, surface) = (self.physical_device(), self.surface());
        unsafe {
            Ok(SupportDetails {
                capabilities: loader.get_physical_device_surface_capabilities(phys, surface)?,
                formats: loader.get_physical_device_surface_formats(phys, surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(phys, surface)?,
            })
        }
    }

    fn create_swapchain(&self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR> {
        let families;
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface())
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true);

        info = match plan.sharing {
            ImageSharing::Exclusive => info.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
            ImageSharing::Concurrent { graphics, present } => {
                families = [graphics, present];
                info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&families)
            }
        };

        unsafe { self.swapchain_loader().create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader().get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader().destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.handle().create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.handle().destroy_image_view(view, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.handle().create_framebuffer(&info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.handle().destroy_framebuffer(framebuffer, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader()
                .acquire_next_image(swapchain, timeout, semaphore, fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe {
            self.swapchain_loader()
                .queue_present(self.present_queue(), &info)
        }
    }
}
