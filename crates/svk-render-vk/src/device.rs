// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical device and queues.
//!
//! Everything the presentation core treats as "the device handle" lives here.

use std::ffi::{c_char, CStr, CString};

use anyhow::{anyhow, Context, Result};
use ash::{ext::debug_utils, khr::surface, khr::swapchain, vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use svk_render::{FrameError, FrameResult};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct DeviceOptions {
    pub app_name: String,
    /// Enables the Khronos validation layer if it is installed.
    pub validation: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            app_name: "svk".to_owned(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// Queue family indices. The two may be equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct GpuDevice {
    _entry: Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
    device: ash::Device,
    swapchain_loader: swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl GpuDevice {
    // STRICT ORDER:
    // 1) instance (WSI extensions + optional debug utils)
    // 2) surface from THIS instance
    // 3) physical device + families queried AGAINST this surface
    // 4) logical device + queues
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        options: &DeviceOptions,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("display handle: {e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("window handle: {e}"))?
            .as_raw();

        let entry = Entry::linked();
        let validation = options.validation && unsafe { has_validation_layer(&entry) };
        if options.validation && !validation {
            warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let instance = unsafe { create_instance(&entry, dh, &options.app_name, validation) }
            .context("create_instance")?;

        let debug = if validation {
            match unsafe { create_debug_messenger(&entry, &instance) } {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
            .context("ash_window::create_surface")?;

        let (physical_device, families) =
            unsafe { pick_physical_device(&instance, &surface_loader, surface) }
                .context("pick_physical_device")?;

        let device = unsafe { create_logical_device(&instance, physical_device, families) }
            .context("create_device")?;
        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "vk: device '{}' api {}.{}, graphics family {}, present family {}",
            name,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            families.graphics,
            families.present
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            physical_device,
            families,
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub(crate) fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub(crate) fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    /// Drains every queue on the device.
    pub fn wait_idle(&self) -> FrameResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| FrameError::SyncWait(format!("device_wait_idle: {e}")))
    }
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            // device, then surface, then messenger, instance last
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(d) = self.debug.take() {
                d.loader.destroy_debug_utils_messenger(d.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("vk: device destroyed");
    }
}

unsafe fn has_validation_layer(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
}

unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> Result<ash::Instance> {
    let app = CString::new(app_name).context("application name contains a NUL byte")?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app)
        .engine_name(&app)
        .api_version(vk::API_VERSION_1_1);

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?
        .to_vec();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }

    #[allow(unused_mut)]
    let mut flags = vk::InstanceCreateFlags::empty();
    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let layers: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    Ok(entry.create_instance(&create_info, None)?)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(entry: &Entry, instance: &ash::Instance) -> Result<DebugMessenger> {
    let loader = debug_utils::Instance::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));
    let messenger = loader.create_debug_utils_messenger(&create_info, None)?;
    Ok(DebugMessenger { loader, messenger })
}

fn required_device_extensions() -> Vec<&'static CStr> {
    #[allow(unused_mut)]
    let mut exts = vec![swapchain::NAME];
    #[cfg(target_os = "macos")]
    exts.push(ash::khr::portability_subset::NAME);
    exts
}

unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let required = required_device_extensions();

    for phys in instance.enumerate_physical_devices()? {
        let available = instance
            .enumerate_device_extension_properties(phys)
            .unwrap_or_default();
        let has_all = required.iter().all(|name| {
            available
                .iter()
                .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == *name))
        });
        if !has_all {
            continue;
        }

        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let graphics = qprops
            .iter()
            .position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS));
        let present = (0..qprops.len() as u32).find(|&i| {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });

        if let (Some(graphics), Some(present)) = (graphics, present) {
            return Ok((
                phys,
                QueueFamilies {
                    graphics: graphics as u32,
                    present,
                },
            ));
        }
    }
    Err(anyhow!("no physical device with graphics + present support"))
}

unsafe fn create_logical_device(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
        .queue_family_index(families.graphics)
        .queue_priorities(&priorities)];
    if !families.is_shared() {
        queue_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(families.present)
                .queue_priorities(&priorities),
        );
    }

    let extensions: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|n| n.as_ptr())
        .collect();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions);

    Ok(instance.create_device(phys, &create_info, None)?)
}
