// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::path::{Path, PathBuf};

use ash::khr::swapchain;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Fixed names the prober and device builder check against. Built once and
/// handed down; nothing here is global.
#[derive(Clone, Debug)]
pub struct RequiredCapabilities {
    validation_layers: Vec<&'static CStr>,
    device_extensions: Vec<&'static CStr>,
}

impl RequiredCapabilities {
    pub fn new(validation: bool) -> Self {
        Self {
            validation_layers: if validation {
                vec![VALIDATION_LAYER]
            } else {
                Vec::new()
            },
            device_extensions: vec![swapchain::NAME],
        }
    }

    pub fn validation_enabled(&self) -> bool {
        !self.validation_layers.is_empty()
    }

    pub fn validation_layers(&self) -> &[&'static CStr] {
        &self.validation_layers
    }

    pub fn device_extensions(&self) -> &[&'static CStr] {
        &self.device_extensions
    }
}

/// Location of the two precompiled SPIR-V blobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    /// `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            vertex: dir.join(format!("{name}.vert.spv")),
            fragment: dir.join(format!("{name}.frag.spv")),
        }
    }
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self::new("res/shaders", "quad")
    }
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub app_name: String,
    pub validation: bool,
    pub shaders: ShaderPaths,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "vkquad".to_owned(),
            validation: cfg!(debug_assertions),
            shaders: ShaderPaths::default(),
        }
    }
}
