// SPDX-License-Identifier: CEPL-1.0
//! Presentable image set.
//!
//! Owns the native swapchain, one view per image and (once bound to a render
//! target) one framebuffer per image. Format and present mode are fixed for
//! the lifetime of a [`Swapchain`]; [`Swapchain::recreate`] only re-derives
//! extent, image count and transform.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use svk_render::{
    FormatPreference, FrameError, FrameResult, PresentModePreference, RenderSize, SurfaceStatus,
};
use tracing::{debug, info, warn};

use crate::device::QueueFamilies;
use crate::driver::{SupportDetails, SwapchainDriver};
use crate::render_target::AttachmentLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    /// Images are used by two distinct queue families.
    Concurrent { graphics: u32, present: u32 },
}

impl ImageSharing {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent {
                graphics: families.graphics,
                present: families.present,
            }
        }
    }
}

/// Every decision needed to create the native swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing: ImageSharing,
}

impl SwapchainPlan {
    pub fn new(
        support: &SupportDetails,
        families: QueueFamilies,
        size: RenderSize,
        preferred_format: vk::Format,
        preferred_mode: vk::PresentModeKHR,
    ) -> FrameResult<Self> {
        if !support.is_adequate() {
            return Err(FrameError::SurfaceIncompatible(format!(
                "{} surface format(s), {} present mode(s)",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        let caps = &support.capabilities;
        Ok(Self {
            surface_format: choose_surface_format(&support.formats, preferred_format),
            present_mode: choose_present_mode(&support.present_modes, preferred_mode),
            extent: choose_extent(caps, size),
            image_count: choose_image_count(caps),
            pre_transform: choose_pre_transform(caps),
            composite_alpha: choose_composite_alpha(caps),
            sharing: ImageSharing::for_families(families),
        })
    }

    /// Same format, mode and sharing against fresh capabilities.
    pub fn replan(&self, caps: &vk::SurfaceCapabilitiesKHR, size: RenderSize) -> Self {
        Self {
            extent: choose_extent(caps, size),
            image_count: choose_image_count(caps),
            pre_transform: choose_pre_transform(caps),
            composite_alpha: choose_composite_alpha(caps),
            ..*self
        }
    }
}

struct Framebuffers {
    render_pass: vk::RenderPass,
    handles: Vec<vk::Framebuffer>,
}

pub struct Swapchain<D: SwapchainDriver> {
    driver: Arc<D>,
    plan: SwapchainPlan,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Option<Framebuffers>,
}

impl<D: SwapchainDriver> Swapchain<D> {
    pub fn new(
        driver: Arc<D>,
        size: RenderSize,
        preferred_format: vk::Format,
        preferred_mode: vk::PresentModeKHR,
    ) -> FrameResult<Self> {
        let support = driver.query_support().map_err(|e| {
            FrameError::PresentableImageCreation(format!("surface support query: {e}"))
        })?;
        let plan = SwapchainPlan::new(
            &support,
            driver.queue_families(),
            size,
            preferred_format,
            preferred_mode,
        )?;
        if plan.extent.width == 0 || plan.extent.height == 0 {
            return Err(FrameError::PresentableImageCreation(
                "surface has no area".into(),
            ));
        }
        let (handle, images, image_views) = build_images(driver.as_ref(), &plan)?;

        info!(
            "swapchain: {:?}/{:?}, {:?}, {}x{}, {} images (min={}, max={}), {:?}",
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            images.len(),
            support.capabilities.min_image_count,
            support.capabilities.max_image_count,
            plan.sharing
        );

        Ok(Self {
            driver,
            plan,
            handle,
            images,
            image_views,
            framebuffers: None,
        })
    }

    /// Binds one framebuffer per image view to `target`. Later recreations
    /// rebuild them against the same target.
    pub fn init_framebuffers(&mut self, target: &dyn AttachmentLayout) -> FrameResult<()> {
        self.destroy_framebuffers();
        let render_pass = target.render_pass();
        let handles = build_framebuffers(
            self.driver.as_ref(),
            render_pass,
            &self.image_views,
            self.plan.extent,
        )?;
        debug!("swapchain: {} framebuffers bound", handles.len());
        self.framebuffers = Some(Framebuffers {
            render_pass,
            handles,
        });
        Ok(())
    }

    /// Destroys and rebuilds images, views and (if bound) framebuffers at the
    /// same format and present mode.
    ///
    /// Returns `false` without touching anything when the surface currently
    /// has no area (minimized before the window reported it); call again once
    /// it does. No queued GPU work may still reference the current images.
    pub fn recreate(&mut self, size: RenderSize) -> FrameResult<bool> {
        let support = self.driver.query_support().map_err(|e| {
            FrameError::PresentableImageCreation(format!("surface support query: {e}"))
        })?;
        let plan = self.plan.replan(&support.capabilities, size);
        if plan.extent.width == 0 || plan.extent.height == 0 {
            debug!(
                "swapchain: surface extent {}x{}, not rebuilding",
                plan.extent.width, plan.extent.height
            );
            return Ok(false);
        }
        let bound = self.framebuffers.as_ref().map(|f| f.render_pass);

        // STRICT ORDER: framebuffers -> views -> swapchain
        self.teardown();

        let (handle, images, image_views) = build_images(self.driver.as_ref(), &plan)?;
        self.plan = plan;
        self.handle = handle;
        self.images = images;
        self.image_views = image_views;

        if let Some(render_pass) = bound {
            let handles = build_framebuffers(
                self.driver.as_ref(),
                render_pass,
                &self.image_views,
                self.plan.extent,
            )?;
            self.framebuffers = Some(Framebuffers {
                render_pass,
                handles,
            });
        }

        info!(
            "swapchain: recreated at {}x{} (requested {}x{}), {} images",
            self.plan.extent.width,
            self.plan.extent.height,
            size.width,
            size.height,
            self.images.len()
        );
        Ok(true)
    }

    /// `ready` is signaled once the image can actually be written. The index
    /// is meaningless when the status is `OutOfDate`.
    pub fn acquire_image(
        &self,
        ready: vk::Semaphore,
        fence: vk::Fence,
        timeout: u64,
    ) -> FrameResult<(u32, SurfaceStatus)> {
        acquire_status(
            self.driver
                .acquire_next_image(self.handle, timeout, ready, fence),
        )
    }

    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> FrameResult<SurfaceStatus> {
        present_status(self.driver.queue_present(self.handle, image_index, wait))
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.plan.surface_format.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.plan.surface_format.color_space
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.plan.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn has_framebuffers(&self) -> bool {
        self.framebuffers.is_some()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .as_ref()
            .and_then(|f| f.handles.get(image_index as usize).copied())
    }

    fn destroy_framebuffers(&mut self) {
        if let Some(fbs) = self.framebuffers.take() {
            for fb in fbs.handles {
                self.driver.destroy_framebuffer(fb);
            }
        }
    }

    fn teardown(&mut self) {
        self.destroy_framebuffers();
        for view in self.image_views.drain(..) {
            self.driver.destroy_image_view(view);
        }
        // images belong to the swapchain
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            self.driver.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

impl<D: SwapchainDriver> Drop for Swapchain<D> {
    fn drop(&mut self) {
        self.teardown();
        debug!("swapchain: destroyed");
    }
}

fn build_images<D: SwapchainDriver + ?Sized>(
    driver: &D,
    plan: &SwapchainPlan,
) -> FrameResult<(vk::SwapchainKHR, Vec<vk::Image>, Vec<vk::ImageView>)> {
    let handle = driver
        .create_swapchain(plan)
        .map_err(|e| FrameError::PresentableImageCreation(format!("create_swapchain: {e}")))?;

    let images = match driver.swapchain_images(handle) {
        Ok(images) => images,
        Err(e) => {
            driver.destroy_swapchain(handle);
            return Err(FrameError::PresentableImageCreation(format!(
                "get_swapchain_images: {e}"
            )));
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for (i, &image) in images.iter().enumerate() {
        match driver.create_image_view(image, plan.surface_format.format) {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    driver.destroy_image_view(view);
                }
                driver.destroy_swapchain(handle);
                return Err(FrameError::PresentableImageCreation(format!(
                    "create_image_view {i}: {e}"
                )));
            }
        }
    }

    Ok((handle, images, views))
}

fn build_framebuffers<D: SwapchainDriver + ?Sized>(
    driver: &D,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> FrameResult<Vec<vk::Framebuffer>> {
    let mut handles = Vec::with_capacity(views.len());
    for (i, &view) in views.iter().enumerate() {
        match driver.create_framebuffer(render_pass, view, extent) {
            Ok(fb) => handles.push(fb),
            Err(e) => {
                for fb in handles {
                    driver.destroy_framebuffer(fb);
                }
                return Err(FrameError::PresentableImageCreation(format!(
                    "create_framebuffer {i}: {e}"
                )));
            }
        }
    }
    Ok(handles)
}

fn acquire_status(result: VkResult<(u32, bool)>) -> FrameResult<(u32, SurfaceStatus)> {
    match result {
        Ok((index, false)) => Ok((index, SurfaceStatus::Ready)),
        Ok((index, true)) => Ok((index, SurfaceStatus::SubOptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, SurfaceStatus::OutOfDate)),
        Err(e @ (vk::Result::TIMEOUT | vk::Result::NOT_READY)) => {
            Err(FrameError::Acquire(format!("no image within timeout ({e})")))
        }
        Err(e) => Err(FrameError::Acquire(e.to_string())),
    }
}

fn present_status(result: VkResult<bool>) -> FrameResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Ready),
        Ok(true) => Ok(SurfaceStatus::SubOptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(e) => Err(FrameError::Present(e.to_string())),
    }
}

/// First supported format. The preference is only reported, not matched.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::Format,
) -> vk::SurfaceFormatKHR {
    let chosen = formats[0];
    if chosen.format != preferred {
        debug!(
            "surface format {:?} differs from preferred {:?}",
            chosen.format, preferred
        );
    }
    chosen
}

/// The preferred mode when supported, else FIFO, else whatever comes first.
fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        return preferred;
    }
    let fallback = [vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(modes[0]);
    warn!(
        "present mode {:?} unsupported, using {:?}",
        preferred, fallback
    );
    fallback
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One above the minimum, capped by the maximum (0 == no maximum).
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        preferred
    } else {
        preferred.min(caps.max_image_count)
    }
}

/// Whatever the surface is currently in, so a rotated display does not report
/// every present as suboptimal.
fn choose_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    caps.current_transform
}

fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub fn vk_present_mode(pref: PresentModePreference) -> vk::PresentModeKHR {
    match pref {
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub fn vk_format(pref: FormatPreference) -> vk::Format {
    match pref {
        FormatPreference::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        FormatPreference::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        FormatPreference::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        FormatPreference::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
    }
}
