// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device negotiation, the presentable chain, one
//! fixed-function pipeline and a single-frame-in-flight present loop that
//! draws the textured quad.

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod geometry;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod probe;
pub mod swapchain;
pub mod upload;

pub use config::{ContextConfig, RequiredCapabilities, ShaderPaths};
pub use context::GpuContext;
pub use error::VkError;
