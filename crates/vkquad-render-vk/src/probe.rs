// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use anyhow::{Context as _, Result};
use ash::khr::surface;
use ash::{vk, Instance};
use tracing::{debug, info, warn};

use crate::config::RequiredCapabilities;
use crate::error::VkError;

/// Queue family index per role; `None` means the device has no family for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

/// The three roles the device builder needs, all resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedQueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Walks the families in order. Graphics, present and compute take the
    /// last matching family. Transfer takes the family carrying the fewest
    /// graphics/compute flags, later families winning ties, so a dedicated
    /// transfer family is preferred when one exists.
    pub fn discover(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut found = Self::default();
        let mut best_transfer_load = u8::MAX;

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            let flags = family.queue_flags;
            let mut load = 0u8;

            if flags.contains(vk::QueueFlags::GRAPHICS) {
                found.graphics = Some(i);
                load += 1;
            }
            if supports_present(i)? {
                found.present = Some(i);
            }
            if flags.contains(vk::QueueFlags::COMPUTE) {
                found.compute = Some(i);
                load += 1;
            }
            if flags.contains(vk::QueueFlags::TRANSFER) && load <= best_transfer_load {
                best_transfer_load = load;
                found.transfer = Some(i);
            }
        }
        Ok(found)
    }

    /// All four roles present; the bar a device must clear to be scored.
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some()
            && self.present.is_some()
            && self.compute.is_some()
            && self.transfer.is_some()
    }

    pub fn resolve(&self) -> Result<ResolvedQueueFamilies, VkError> {
        let need = |idx: Option<u32>, role| idx.ok_or(VkError::UnresolvedQueueFamily { role });
        Ok(ResolvedQueueFamilies {
            graphics: need(self.graphics, "graphics")?,
            present: need(self.present, "present")?,
            transfer: need(self.transfer, "transfer")?,
        })
    }
}

/// Everything scoring looks at, gathered from one physical device.
#[derive(Clone, Debug)]
pub struct DeviceReport {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceReport {
    /// 0 marks the device unsuitable. Otherwise discrete GPUs get +1000 and
    /// the 2D image size limit breaks ties.
    pub fn score(&self) -> u32 {
        if !self.geometry_shader
            || !self.queue_families.is_complete()
            || !self.missing_extensions.is_empty()
            || self.format_count == 0
            || self.present_mode_count == 0
        {
            return 0;
        }
        let discrete = u32::from(self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU);
        1000 * discrete + self.max_image_dimension_2d
    }
}

/// Index of the strictly highest non-zero score; the first one seen wins ties.
pub fn pick_best(scores: impl IntoIterator<Item = u32>) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

pub unsafe fn missing_device_extensions(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    caps: &RequiredCapabilities,
) -> Result<Vec<String>> {
    let props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let available: Vec<&CStr> = props
        .iter()
        .map(|e| CStr::from_ptr(e.extension_name.as_ptr()))
        .collect();

    Ok(caps
        .device_extensions()
        .iter()
        .filter(|name| !available.contains(*name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

pub unsafe fn queue_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices> {
    let families = instance.get_physical_device_queue_family_properties(phys);
    QueueFamilyIndices::discover(&families, |i| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .context("get_physical_device_surface_support")
    })
}

pub unsafe fn report_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    caps: &RequiredCapabilities,
) -> Result<DeviceReport> {
    let props = instance.get_physical_device_properties(phys);
    let features = instance.get_physical_device_features(phys);
    let queue_families = queue_families(instance, surface_loader, phys, surface)?;
    let missing_extensions = missing_device_extensions(instance, phys, caps)?;

    // Without the swapchain extension the surface queries below are meaningless.
    let (format_count, present_mode_count) = if missing_extensions.is_empty() {
        let formats = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .context("get_physical_device_surface_formats")?;
        let modes = surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .context("get_physical_device_surface_present_modes")?;
        (formats.len(), modes.len())
    } else {
        (0, 0)
    };

    Ok(DeviceReport {
        device_type: props.device_type,
        max_image_dimension_2d: props.limits.max_image_dimension2_d,
        geometry_shader: features.geometry_shader == vk::TRUE,
        queue_families,
        missing_extensions,
        format_count,
        present_mode_count,
    })
}

pub unsafe fn score_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    caps: &RequiredCapabilities,
) -> Result<u32> {
    let report = report_device(instance, surface_loader, phys, surface, caps)?;
    for ext in &report.missing_extensions {
        warn!("vk: required device extension not found: {ext}");
    }
    Ok(report.score())
}

pub struct PhysicalDeviceChoice {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub score: u32,
    pub queue_families: QueueFamilyIndices,
}

unsafe fn device_name(instance: &Instance, phys: vk::PhysicalDevice) -> String {
    let props = instance.get_physical_device_properties(phys);
    CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned()
}

pub unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    caps: &RequiredCapabilities,
) -> Result<PhysicalDeviceChoice> {
    let devices = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;

    let mut scores = Vec::with_capacity(devices.len());
    for &phys in &devices {
        let score = score_device(instance, surface_loader, phys, surface, caps)?;
        debug!("vk: device '{}' scored {}", device_name(instance, phys), score);
        scores.push(score);
    }

    let best = pick_best(scores.iter().copied()).ok_or(VkError::NoSuitableDevice)?;
    let handle = devices[best];
    let choice = PhysicalDeviceChoice {
        handle,
        name: device_name(instance, handle),
        score: scores[best],
        queue_families: queue_families(instance, surface_loader, handle, surface)?,
    };
    info!(
        "vk: picked '{}' (score {}, families {:?})",
        choice.name, choice.score, choice.queue_families
    );
    Ok(choice)
}
