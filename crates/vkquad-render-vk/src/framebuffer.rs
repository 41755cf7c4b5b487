// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context as _, Result};
use ash::vk;

/// One framebuffer per swapchain image view, rebuilt alongside the chain.
#[derive(Debug, Default)]
pub struct Framebuffers {
    handles: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    pub unsafe fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut out = Framebuffers {
            handles: Vec::with_capacity(views.len()),
        };
        for view in views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            match device.create_framebuffer(&fb_info, None) {
                Ok(fb) => out.handles.push(fb),
                Err(e) => {
                    out.destroy(device);
                    return Err(e).context("create_framebuffer");
                }
            }
        }
        Ok(out)
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for fb in self.handles.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
    }

    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.handles.get(image_index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_no_entries() {
        let fbs = Framebuffers::default();
        assert!(fbs.is_empty());
        assert_eq!(fbs.get(0), None);
    }
}
