// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context as _, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::info;
use vkquad_render::RenderSize;

use crate::error::VkError;
use crate::probe::ResolvedQueueFamilies;

/// Surface properties of the chosen device. Re-queried whenever the chain is
/// rebuilt; the vectors are refilled in place so repeated resizes reuse
/// their storage and the lengths always match what the driver reported.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let mut support = Self::default();
        support.refresh(loader, phys, surface)?;
        Ok(support)
    }

    pub unsafe fn refresh(
        &mut self,
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<()> {
        let caps = loader
            .get_physical_device_surface_capabilities(phys, surface)
            .context("get_physical_device_surface_capabilities")?;
        let formats = loader
            .get_physical_device_surface_formats(phys, surface)
            .context("get_physical_device_surface_formats")?;
        let modes = loader
            .get_physical_device_surface_present_modes(phys, surface)
            .context("get_physical_device_surface_present_modes")?;
        self.replace(caps, &formats, &modes);
        Ok(())
    }

    pub fn replace(
        &mut self,
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
    ) {
        self.capabilities = capabilities;
        self.formats.clear();
        self.formats.extend_from_slice(formats);
        self.present_modes.clear();
        self.present_modes.extend_from_slice(present_modes);
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// B8G8R8A8_SRGB with the sRGB non-linear color space, else the first
/// format offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-dictated extent, unless the surface reports the `u32::MAX`
/// sentinel; then the drawable size clamped into the allowed range.
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: drawable
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: drawable
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub fn resolve_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Concurrent across graphics and present when they differ, exclusive otherwise.
pub fn sharing_mode(families: &ResolvedQueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.graphics != families.present {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// The presentable image chain and one view per image.
#[derive(Debug, Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub unsafe fn create(
        device: &ash::Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        support: &SwapchainSupport,
        families: &ResolvedQueueFamilies,
        drawable: RenderSize,
    ) -> Result<Self> {
        let caps = &support.capabilities;
        let surf_format = choose_surface_format(&support.formats).ok_or(VkError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = resolve_extent(caps, drawable);
        let min_count = resolve_image_count(caps);
        let (sharing, family_indices) = sharing_mode(families);

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let handle = loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        let mut chain = Swapchain {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surf_format.format,
            extent,
        };
        if let Err(e) = chain.create_views(device, loader) {
            chain.destroy(device, loader);
            return Err(e);
        }

        info!(
            "vk: swapchain {}x{}, {:?}/{:?}, {:?}, {} images (min {})",
            extent.width,
            extent.height,
            surf_format.format,
            surf_format.color_space,
            present_mode,
            chain.images.len(),
            caps.min_image_count
        );
        Ok(chain)
    }

    unsafe fn create_views(&mut self, device: &ash::Device, loader: &swapchain::Device) -> Result<()> {
        self.images = loader
            .get_swapchain_images(self.handle)
            .context("get_swapchain_images")?;
        self.image_views.reserve(self.images.len());
        for &img in &self.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: img,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                },
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = device
                .create_image_view(&iv_info, None)
                .context("create_image_view")?;
            self.image_views.push(view);
        }
        Ok(())
    }

    /// Views first, then the chain. Safe to call on an empty or already
    /// destroyed swapchain.
    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }

    pub fn is_live(&self) -> bool {
        self.handle != vk::SwapchainKHR::null()
    }
}
