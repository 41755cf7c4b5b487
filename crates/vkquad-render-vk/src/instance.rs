// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr, CString};

use anyhow::{Context as _, Result};
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

use crate::config::RequiredCapabilities;
use crate::error::VkError;

/// Names in `required` that are absent from `available` (exact match).
pub fn missing_layers(required: &[&CStr], available: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(*name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Confirms every required layer is installed. Absence is fatal.
pub unsafe fn probe_layers(entry: &Entry, caps: &RequiredCapabilities) -> Result<()> {
    if !caps.validation_enabled() {
        return Ok(());
    }
    let props = entry
        .enumerate_instance_layer_properties()
        .context("enumerate_instance_layer_properties")?;
    let available: Vec<&CStr> = props
        .iter()
        .map(|p| CStr::from_ptr(p.layer_name.as_ptr()))
        .collect();

    let missing = missing_layers(caps.validation_layers(), &available);
    if !missing.is_empty() {
        return Err(VkError::MissingLayers { missing }.into());
    }
    Ok(())
}

pub unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    caps: &RequiredCapabilities,
    app_name: &str,
) -> Result<Instance> {
    let app = CString::new(app_name).context("application name contains NUL")?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: app.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut ext_vec = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    if caps.validation_enabled() {
        ext_vec.push(debug_utils::NAME.as_ptr());
    }

    let layers: Vec<*const std::ffi::c_char> =
        caps.validation_layers().iter().map(|l| l.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    info!(
        "vk: instance ready (validation={}, {} extensions)",
        caps.validation_enabled(),
        ext_vec.len()
    );
    Ok(instance)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[validation] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[validation] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!("[validation] {msg}"),
        _ => debug!("[validation] {msg}"),
    }
    vk::FALSE
}

/// Every severity is subscribed; the tracing filter decides what is shown.
pub fn messenger_severities() -> vk::DebugUtilsMessageSeverityFlagsEXT {
    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
}

/// Validation output routed into tracing. Only exists when validation is on.
pub struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub unsafe fn new(entry: &Entry, instance: &Instance) -> Result<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: messenger_severities(),
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let handle = loader
            .create_debug_utils_messenger(&ci, None)
            .context("create_debug_utils_messenger")?;
        Ok(Self { loader, handle })
    }

    pub unsafe fn destroy(&mut self) {
        if self.handle != vk::DebugUtilsMessengerEXT::null() {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
            self.handle = vk::DebugUtilsMessengerEXT::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VALIDATION_LAYER;

    #[test]
    fn messenger_hears_verbose_messages() {
        let sev = messenger_severities();
        for level in [
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        ] {
            assert!(sev.contains(level), "{level:?} not subscribed");
        }
    }

    #[test]
    fn all_layers_present() {
        let available = [c"VK_LAYER_LUNARG_monitor", VALIDATION_LAYER];
        assert!(missing_layers(&[VALIDATION_LAYER], &available).is_empty());
    }

    #[test]
    fn reports_missing_layer_by_name() {
        let available = [c"VK_LAYER_LUNARG_monitor"];
        assert_eq!(
            missing_layers(&[VALIDATION_LAYER], &available),
            vec!["VK_LAYER_KHRONOS_validation".to_owned()]
        );
    }

    #[test]
    fn match_is_exact_not_prefix() {
        let available = [c"VK_LAYER_KHRONOS_validation_extra"];
        assert_eq!(missing_layers(&[VALIDATION_LAYER], &available).len(), 1);
    }

    #[test]
    fn nothing_required_nothing_missing() {
        assert!(missing_layers(&[], &[]).is_empty());
    }
}
