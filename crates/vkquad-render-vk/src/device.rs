// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context as _, Result};
use ash::{vk, Instance};
use tracing::info;

use crate::config::RequiredCapabilities;
use crate::probe::ResolvedQueueFamilies;

#[derive(Clone, Copy, Debug)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub transfer: vk::Queue,
}

/// Families to request queues from: graphics first, then present and
/// transfer when they are distinct from everything already listed.
pub fn unique_queue_families(families: &ResolvedQueueFamilies) -> Vec<u32> {
    let mut out = vec![families.graphics];
    for idx in [families.present, families.transfer] {
        if !out.contains(&idx) {
            out.push(idx);
        }
    }
    out
}

pub unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: &ResolvedQueueFamilies,
    caps: &RequiredCapabilities,
) -> Result<(ash::Device, Queues)> {
    let priorities = [1.0_f32];
    let qinfos: Vec<vk::DeviceQueueCreateInfo> = unique_queue_families(families)
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts: Vec<*const std::ffi::c_char> = caps
        .device_extensions()
        .iter()
        .map(|name| name.as_ptr())
        .collect();
    let features = vk::PhysicalDeviceFeatures::default();

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: qinfos.len() as u32,
        p_queue_create_infos: qinfos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;

    let queues = Queues {
        graphics: device.get_device_queue(families.graphics, 0),
        present: device.get_device_queue(families.present, 0),
        transfer: device.get_device_queue(families.transfer, 0),
    };
    info!(
        "vk: device ready ({} queue families: {:?})",
        qinfos.len(),
        families
    );
    Ok((device, queues))
}
