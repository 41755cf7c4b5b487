// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Conditions the core treats as fatal. They travel inside `anyhow::Error`
/// up to the application shell, which logs them and exits.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("validation layers requested, but not available: {missing:?}")]
    MissingLayers { missing: Vec<String> },

    #[error("no physical device scored above zero")]
    NoSuitableDevice,

    #[error("queue family for {role} is not resolved on the chosen device")]
    UnresolvedQueueFamily { role: &'static str },

    #[error("no memory type matches bits {type_bits:#x} with properties {required:?}")]
    NoMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("failed to load shader {}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid SPIR-V", path.display())]
    InvalidSpirv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("surface exposes no formats")]
    NoSurfaceFormat,

    #[error("surface format changed across recreation ({old:?} -> {new:?}); render pass is not rebuilt on resize")]
    FormatChanged { old: vk::Format, new: vk::Format },

    #[error("{call} returned {result}")]
    Api {
        call: &'static str,
        result: vk::Result,
    },
}
