// SPDX-License-Identifier: CEPL-1.0
//! Needs a Vulkan driver: `cargo test -p vkquad-render-vk -- --ignored`.
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU32, Ordering};

use ash::ext::debug_utils;
use ash::{vk, Entry};
use vkquad_render_vk::config::VALIDATION_LAYER;
use vkquad_render_vk::geometry::{index_bytes, vertex_bytes, QUAD_INDICES};
use vkquad_render_vk::upload::Uploader;

/// Counts validation errors into the `AtomicU32` behind `user`.
unsafe extern "system" fn count_errors(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user: *mut c_void,
) -> vk::Bool32 {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) && !user.is_null() {
        (*user.cast::<AtomicU32>()).fetch_add(1, Ordering::SeqCst);
        if !data.is_null() && !(*data).p_message.is_null() {
            eprintln!("validation: {}", CStr::from_ptr((*data).p_message).to_string_lossy());
        }
    }
    vk::FALSE
}

struct Validation {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    errors: Box<AtomicU32>,
}

struct Headless {
    _entry: Entry,
    instance: ash::Instance,
    validation: Option<Validation>,
    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
}

impl Headless {
    unsafe fn new() -> Self {
        let entry = Entry::load().expect("libvulkan");
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };
        let layer_available = entry
            .enumerate_instance_layer_properties()
            .expect("enumerate_instance_layer_properties")
            .iter()
            .any(|p| CStr::from_ptr(p.layer_name.as_ptr()) == VALIDATION_LAYER);
        let layers = [VALIDATION_LAYER.as_ptr()];
        let exts = [debug_utils::NAME.as_ptr()];
        let ici = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_layer_count: layer_available as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            enabled_extension_count: layer_available as u32,
            pp_enabled_extension_names: exts.as_ptr(),
            ..Default::default()
        };
        let instance = entry.create_instance(&ici, None).expect("create_instance");

        let validation = layer_available.then(|| {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let errors = Box::new(AtomicU32::new(0));
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                pfn_user_callback: Some(count_errors),
                p_user_data: (&*errors as *const AtomicU32).cast_mut().cast(),
                ..Default::default()
            };
            let messenger = loader
                .create_debug_utils_messenger(&ci, None)
                .expect("create_debug_utils_messenger");
            Validation {
                loader,
                messenger,
                errors,
            }
        });
        if validation.is_none() {
            eprintln!("{} not installed; running without validation", VALIDATION_LAYER.to_string_lossy());
        }

        let (phys, family) = instance
            .enumerate_physical_devices()
            .expect("enumerate_physical_devices")
            .into_iter()
            .find_map(|phys| {
                instance
                    .get_physical_device_queue_family_properties(phys)
                    .iter()
                    .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|i| (phys, i as u32))
            })
            .expect("no device with a graphics queue");

        let priorities = [1.0_f32];
        let qci = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let dci = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qci,
            ..Default::default()
        };
        let device = instance.create_device(phys, &dci, None).expect("create_device");
        let queue = device.get_device_queue(family, 0);
        let pci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: family,
            ..Default::default()
        };
        let pool = device.create_command_pool(&pci, None).expect("create_command_pool");

        Headless {
            _entry: entry,
            instance,
            validation,
            phys,
            device,
            queue,
            pool,
        }
    }
}

impl Headless {
    fn validation_errors(&self) -> u32 {
        self.validation
            .as_ref()
            .map_or(0, |v| v.errors.load(Ordering::SeqCst))
    }
}

impl Drop for Headless {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.pool, None);
            self.device.destroy_device(None);
            if let Some(v) = self.validation.take() {
                v.loader.destroy_debug_utils_messenger(v.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn quad_buffers_read_back_identical() {
    unsafe {
        let gpu = Headless::new();
        let uploader = Uploader::new(&gpu.instance, &gpu.device, gpu.phys, gpu.queue, gpu.pool);
        let mut quad = uploader.upload_quad().expect("upload_quad");

        assert_eq!(quad.index_count, 6);
        let indices = uploader.read_buffer(&quad.indices).expect("read indices");
        assert_eq!(indices, index_bytes());
        let words: Vec<u32> = indices
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, [0, 1, 2, 2, 3, 0]);
        assert_eq!(words, QUAD_INDICES);

        let vertices = uploader.read_buffer(&quad.vertices).expect("read vertices");
        assert_eq!(vertices, vertex_bytes());

        quad.destroy(&gpu.device);
        gpu.device.device_wait_idle().expect("device_wait_idle");
        assert_eq!(gpu.validation_errors(), 0);
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn repeated_uploads_do_not_interfere() {
    unsafe {
        let gpu = Headless::new();
        let uploader = Uploader::new(&gpu.instance, &gpu.device, gpu.phys, gpu.queue, gpu.pool);
        for _ in 0..4 {
            let mut quad = uploader.upload_quad().expect("upload_quad");
            let indices = uploader.read_buffer(&quad.indices).expect("read indices");
            assert_eq!(indices, index_bytes());
            quad.destroy(&gpu.device);
            assert_eq!(quad.indices.buffer, vk::Buffer::null());
        }
        assert_eq!(gpu.validation_errors(), 0);
    }
}
