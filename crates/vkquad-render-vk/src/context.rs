// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context as _, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;
use vkquad_render::{FrameStatus, RenderSize, Renderer};

use crate::config::{ContextConfig, RequiredCapabilities};
use crate::device::{create_device, Queues};
use crate::error::VkError;
use crate::frame::{
    begin_frame, classify_present, plan_tick, record_commands, submit, Acquired, DrawTarget,
    FrameSync, RecreateReason, TickPlan,
};
use crate::framebuffer::Framebuffers;
use crate::instance::{create_instance, probe_layers, DebugMessenger};
use crate::pass::create_render_pass;
use crate::pipeline::GraphicsPipeline;
use crate::probe::{pick_physical_device, ResolvedQueueFamilies};
use crate::swapchain::{Swapchain, SwapchainSupport};
use crate::upload::{StaticGeometry, Uploader};

/// Owns every GPU object of the renderer. Children are created in a fixed
/// order and destroyed in exactly the reverse order.
pub struct GpuContext {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device_name: String,
    families: ResolvedQueueFamilies,
    device: ash::Device,
    queues: Queues,

    swapchain_loader: swapchain::Device,
    support: SwapchainSupport,
    swapchain: Swapchain,
    // format the render pass was built for
    format: vk::Format,

    render_pass: vk::RenderPass,
    pipeline: GraphicsPipeline,
    framebuffers: Framebuffers,

    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    geometry: StaticGeometry,

    drawable: RenderSize,
    pending: Option<RecreateReason>,
    paused: bool,
}

impl GpuContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &ContextConfig,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("display handle: {e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("window handle: {e}"))?
            .as_raw();
        let caps = RequiredCapabilities::new(config.validation);

        unsafe {
            let entry = Entry::load().context("loading the Vulkan library")?;
            probe_layers(&entry, &caps)?;
            let instance = create_instance(&entry, dh, &caps, &config.app_name)?;

            let mut debug = if caps.validation_enabled() {
                match DebugMessenger::new(&entry, &instance) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None)
                .context("ash_window::create_surface")
            {
                Ok(s) => s,
                Err(e) => {
                    if let Some(m) = debug.as_mut() {
                        m.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let device_parts = pick_physical_device(&instance, &surface_loader, surface, &caps)
                .and_then(|choice| {
                    let families = choice.queue_families.resolve()?;
                    let (device, queues) = create_device(&instance, choice.handle, &families, &caps)?;
                    Ok((choice, families, device, queues))
                });
            let (choice, families, device, queues) = match device_parts {
                Ok(parts) => parts,
                Err(e) => {
                    surface_loader.destroy_surface(surface, None);
                    if let Some(m) = debug.as_mut() {
                        m.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            // From here on Drop handles partial construction: every child
            // handle starts null and the destroy paths skip null handles.
            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let mut ctx = GpuContext {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys: choice.handle,
                device_name: choice.name,
                families,
                device,
                queues,
                swapchain_loader,
                support: SwapchainSupport::default(),
                swapchain: Swapchain::default(),
                format: vk::Format::UNDEFINED,
                render_pass: vk::RenderPass::null(),
                pipeline: GraphicsPipeline::default(),
                framebuffers: Framebuffers::default(),
                command_pool: vk::CommandPool::null(),
                command_buffer: vk::CommandBuffer::null(),
                sync: FrameSync::default(),
                geometry: StaticGeometry::default(),
                drawable: size,
                pending: None,
                paused: false,
            };
            ctx.build(config)?;
            Ok(ctx)
        }
    }

    unsafe fn build(&mut self, config: &ContextConfig) -> Result<()> {
        self.support = SwapchainSupport::query(&self.surface_loader, self.phys, self.surface)?;
        self.swapchain = Swapchain::create(
            &self.device,
            &self.swapchain_loader,
            self.surface,
            &self.support,
            &self.families,
            self.drawable,
        )?;
        self.format = self.swapchain.format;

        self.render_pass = create_render_pass(&self.device, self.format)?;
        self.pipeline = GraphicsPipeline::create(&self.device, self.render_pass, &config.shaders)?;
        self.framebuffers = Framebuffers::create(
            &self.device,
            self.render_pass,
            &self.swapchain.image_views,
            self.swapchain.extent,
        )?;

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: self.families.graphics,
            ..Default::default()
        };
        self.command_pool = self
            .device
            .create_command_pool(&pool_info, None)
            .context("create_command_pool")?;
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        self.command_buffer = self
            .device
            .allocate_command_buffers(&alloc_info)
            .context("allocate_command_buffers")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("allocate_command_buffers returned nothing"))?;

        self.sync = FrameSync::create(&self.device)?;

        let uploader = Uploader::new(
            &self.instance,
            &self.device,
            self.phys,
            self.queues.graphics,
            self.command_pool,
        );
        self.geometry = uploader.upload_quad()?;

        info!(
            "vk: context ready on '{}' ({}x{})",
            self.device_name, self.swapchain.extent.width, self.swapchain.extent.height
        );
        Ok(())
    }

    /// Idle the device, drop framebuffers and the chain, then build both
    /// again against the current drawable size. Pass and pipeline stay.
    unsafe fn recreate_swapchain(&mut self, reason: RecreateReason) -> Result<()> {
        self.device
            .device_wait_idle()
            .context("device_wait_idle(recreate)")?;

        self.framebuffers.destroy(&self.device);
        self.swapchain.destroy(&self.device, &self.swapchain_loader);

        self.support
            .refresh(&self.surface_loader, self.phys, self.surface)?;
        self.swapchain = Swapchain::create(
            &self.device,
            &self.swapchain_loader,
            self.surface,
            &self.support,
            &self.families,
            self.drawable,
        )?;
        if self.swapchain.format != self.format {
            return Err(VkError::FormatChanged {
                old: self.format,
                new: self.swapchain.format,
            }
            .into());
        }
        self.framebuffers = Framebuffers::create(
            &self.device,
            self.render_pass,
            &self.swapchain.image_views,
            self.swapchain.extent,
        )?;
        self.pending = None;

        info!(
            "vk: swapchain recreated ({reason}) → {}x{}",
            self.swapchain.extent.width, self.swapchain.extent.height
        );
        Ok(())
    }

    /// Wait → acquire → record → submit → present, one frame in flight.
    unsafe fn draw_frame(&mut self) -> Result<FrameStatus> {
        let acquired = {
            let device = &self.device;
            let fence = self.sync.in_flight;
            begin_frame(
                || {
                    device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .context("wait_for_fences(in_flight)")
                },
                || {
                    self.swapchain_loader.acquire_next_image(
                        self.swapchain.handle,
                        u64::MAX,
                        self.sync.image_available,
                        vk::Fence::null(),
                    )
                },
                || device.reset_fences(&[fence]).context("reset_fences(in_flight)"),
            )?
        };
        let (image_index, acquire_suboptimal) = match acquired {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::OutOfDate => {
                self.recreate_swapchain(RecreateReason::OutOfDate)?;
                return Ok(FrameStatus::Recreated);
            }
        };

        let framebuffer = self
            .framebuffers
            .get(image_index)
            .ok_or_else(|| anyhow!("no framebuffer for swapchain image {image_index}"))?;
        let target = DrawTarget {
            render_pass: self.render_pass,
            framebuffer,
            extent: self.swapchain.extent,
            pipeline: self.pipeline.handle,
            vertex_buffer: self.geometry.vertices.buffer,
            index_buffer: self.geometry.indices.buffer,
            index_count: self.geometry.index_count,
        };
        record_commands(&self.device, self.command_buffer, &target)?;
        submit(&self.device, self.queues.graphics, self.command_buffer, &self.sync)?;

        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync.render_finished,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let after_present = classify_present(
            self.swapchain_loader
                .queue_present(self.queues.present, &present),
        )?;
        let reason = after_present.or(acquire_suboptimal.then_some(RecreateReason::Suboptimal));
        if let Some(reason) = reason {
            self.recreate_swapchain(reason)?;
        }
        Ok(FrameStatus::Presented)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn live_image_views(&self) -> usize {
        self.swapchain.image_views.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_swapchain_images(&self) -> usize {
        self.swapchain.images.len()
    }

    pub fn swapchain_is_live(&self) -> bool {
        self.swapchain.is_live()
    }

    /// Blocks until all submitted work has finished.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("device_wait_idle")
    }

    /// Whether the next frame's wait would return immediately.
    pub fn frame_fence_signaled(&self) -> Result<bool> {
        unsafe { self.device.get_fence_status(self.sync.in_flight) }.context("get_fence_status")
    }
}

impl Renderer for GpuContext {
    fn resize(&mut self, size: RenderSize) {
        self.drawable = size;
        self.pending = Some(RecreateReason::Resize);
    }

    fn render(&mut self) -> Result<FrameStatus> {
        match plan_tick(self.drawable, self.pending) {
            TickPlan::Pause => {
                if !self.paused {
                    info!("vk: drawable is {}x{} → paused", self.drawable.width, self.drawable.height);
                    self.paused = true;
                }
                Ok(FrameStatus::Paused)
            }
            TickPlan::Recreate(reason) => {
                if self.paused {
                    info!("vk: drawable is {}x{} → resumed", self.drawable.width, self.drawable.height);
                    self.paused = false;
                }
                unsafe {
                    self.recreate_swapchain(reason)?;
                    self.draw_frame()
                }
            }
            TickPlan::Draw => unsafe { self.draw_frame() },
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            // nothing may still be executing when handles go away
            d.device_wait_idle().ok();

            self.geometry.destroy(d);
            self.sync.destroy(d);
            if self.command_pool != vk::CommandPool::null() {
                // frees the command buffer with it
                d.destroy_command_pool(self.command_pool, None);
                self.command_pool = vk::CommandPool::null();
                self.command_buffer = vk::CommandBuffer::null();
            }
            self.framebuffers.destroy(d);
            self.pipeline.destroy(d);
            if self.render_pass != vk::RenderPass::null() {
                d.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
            self.swapchain.destroy(d, &self.swapchain_loader);

            d.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(mut debug) = self.debug.take() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
        info!("vk: context destroyed");
    }
}
