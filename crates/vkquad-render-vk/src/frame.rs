// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use anyhow::{Context as _, Result};
use ash::prelude::VkResult;
use ash::vk;
use vkquad_render::RenderSize;

use crate::error::VkError;

/// Why the swapchain is being rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateReason {
    Resize,
    OutOfDate,
    Suboptimal,
}

impl fmt::Display for RecreateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecreateReason::Resize => "resize",
            RecreateReason::OutOfDate => "out of date",
            RecreateReason::Suboptimal => "suboptimal",
        })
    }
}

/// What the next tick should do before touching the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickPlan {
    Pause,
    Recreate(RecreateReason),
    Draw,
}

/// Zero-sized drawables pause everything; a pending rebuild runs before any
/// drawing.
pub fn plan_tick(drawable: RenderSize, pending: Option<RecreateReason>) -> TickPlan {
    if drawable.is_empty() {
        TickPlan::Pause
    } else if let Some(reason) = pending {
        TickPlan::Recreate(reason)
    } else {
        TickPlan::Draw
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<Acquired, VkError> {
    match result {
        Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(result) => Err(VkError::Api {
            call: "acquire_next_image",
            result,
        }),
    }
}

/// Wait and acquire steps. The in-flight fence is reset only once an image
/// is in hand, so a skipped frame leaves it signaled for the next wait.
pub fn begin_frame(
    wait: impl FnOnce() -> Result<()>,
    acquire: impl FnOnce() -> VkResult<(u32, bool)>,
    reset: impl FnOnce() -> Result<()>,
) -> Result<Acquired> {
    wait()?;
    let acquired = classify_acquire(acquire())?;
    if let Acquired::Image { .. } = acquired {
        reset()?;
    }
    Ok(acquired)
}

/// `Some` when the chain has to be rebuilt after this present.
pub fn classify_present(result: VkResult<bool>) -> Result<Option<RecreateReason>, VkError> {
    match result {
        Ok(false) => Ok(None),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(Some(RecreateReason::Suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Some(RecreateReason::OutOfDate)),
        Err(result) => Err(VkError::Api {
            call: "queue_present",
            result,
        }),
    }
}

/// The single frame-in-flight synchronization set.
#[derive(Debug, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub unsafe fn create(device: &ash::Device) -> Result<Self> {
        let sem_ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        // signaled so the very first wait returns immediately
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let mut sync = FrameSync::default();
        let created = (|| -> Result<()> {
            sync.image_available = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(image_available)")?;
            sync.render_finished = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(render_finished)")?;
            sync.in_flight = device
                .create_fence(&fence_ci, None)
                .context("create_fence(in_flight)")?;
            Ok(())
        })();
        if let Err(e) = created {
            sync.destroy(device);
            return Err(e);
        }
        Ok(sync)
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.in_flight != vk::Fence::null() {
            device.destroy_fence(self.in_flight, None);
            self.in_flight = vk::Fence::null();
        }
        if self.render_finished != vk::Semaphore::null() {
            device.destroy_semaphore(self.render_finished, None);
            self.render_finished = vk::Semaphore::null();
        }
        if self.image_available != vk::Semaphore::null() {
            device.destroy_semaphore(self.image_available, None);
            self.image_available = vk::Semaphore::null();
        }
    }
}

/// Handles the recorded commands reference for one frame.
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Re-records the single command buffer for one image. The caller must have
/// waited on the in-flight fence first.
pub unsafe fn record_commands(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &DrawTarget,
) -> Result<()> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .context("reset_command_buffer")?;
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &bi)
        .context("begin_command_buffer")?;

    let clear = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    };
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: target.render_pass,
        framebuffer: target.framebuffer,
        render_area: full_scissor(target.extent),
        clear_value_count: 1,
        p_clear_values: &clear,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

    device.cmd_set_viewport(cmd, 0, &[full_viewport(target.extent)]);
    device.cmd_set_scissor(cmd, 0, &[full_scissor(target.extent)]);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
    device.cmd_bind_vertex_buffers(cmd, 0, &[target.vertex_buffer], &[0]);
    device.cmd_bind_index_buffer(cmd, target.index_buffer, 0, vk::IndexType::UINT32);
    device.cmd_draw_indexed(cmd, target.index_count, 1, 0, 0, 0);

    device.cmd_end_render_pass(cmd);
    device
        .end_command_buffer(cmd)
        .context("end_command_buffer")?;
    Ok(())
}

/// Graphics submit: waits for the acquired image at color output, signals
/// `render_finished` and the in-flight fence.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    sync: &FrameSync,
) -> Result<()> {
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let si = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        wait_semaphore_count: 1,
        p_wait_semaphores: &sync.image_available,
        p_wait_dst_stage_mask: wait_stages.as_ptr(),
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        signal_semaphore_count: 1,
        p_signal_semaphores: &sync.render_finished,
        ..Default::default()
    };
    device
        .queue_submit(queue, std::slice::from_ref(&si), sync.in_flight)
        .context("queue_submit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_pauses_even_with_pending_rebuild() {
        assert_eq!(
            plan_tick(RenderSize::new(0, 0), Some(RecreateReason::Resize)),
            TickPlan::Pause
        );
        assert_eq!(plan_tick(RenderSize::new(640, 0), None), TickPlan::Pause);
    }

    #[test]
    fn pending_rebuild_runs_before_drawing() {
        assert_eq!(
            plan_tick(RenderSize::new(640, 480), Some(RecreateReason::OutOfDate)),
            TickPlan::Recreate(RecreateReason::OutOfDate)
        );
        assert_eq!(plan_tick(RenderSize::new(640, 480), None), TickPlan::Draw);
    }

    #[test]
    fn acquire_results() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            Acquired::Image { index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            Acquired::Image { index: 0, suboptimal: true }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Acquired::OutOfDate
        );
    }

    #[test]
    fn acquire_device_lost_is_fatal() {
        let err = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(matches!(
            err,
            VkError::Api { call: "acquire_next_image", result: vk::Result::ERROR_DEVICE_LOST }
        ));
    }

    /// Host-side model of the in-flight fence.
    struct Fence {
        signaled: std::cell::Cell<bool>,
        waits: std::cell::Cell<u32>,
    }

    impl Fence {
        fn signaled() -> Self {
            Fence {
                signaled: std::cell::Cell::new(true),
                waits: std::cell::Cell::new(0),
            }
        }

        fn begin(&self, acquire: VkResult<(u32, bool)>) -> Result<Acquired> {
            begin_frame(
                || {
                    // an unsignaled wait would block forever
                    anyhow::ensure!(self.signaled.get(), "wait on unsignaled fence");
                    self.waits.set(self.waits.get() + 1);
                    Ok(())
                },
                || acquire,
                || {
                    self.signaled.set(false);
                    Ok(())
                },
            )
        }

        // queue_submit signals it once the GPU finishes
        fn complete_submit(&self) {
            self.signaled.set(true);
        }
    }

    #[test]
    fn out_of_date_acquire_keeps_fence_signaled() {
        let fence = Fence::signaled();
        let got = fence.begin(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(got, Acquired::OutOfDate);
        assert!(fence.signaled.get());

        // the next tick can wait again without deadlock
        let got = fence.begin(Ok((1, false))).unwrap();
        assert_eq!(got, Acquired::Image { index: 1, suboptimal: false });
        assert_eq!(fence.waits.get(), 2);
    }

    #[test]
    fn acquired_image_resets_fence_until_submit_completes() {
        let fence = Fence::signaled();
        fence.begin(Ok((0, false))).unwrap();
        assert!(!fence.signaled.get());
        fence.complete_submit();
        fence.begin(Ok((1, true))).unwrap();
        assert!(!fence.signaled.get());
    }

    #[test]
    fn fatal_acquire_leaves_fence_untouched() {
        let fence = Fence::signaled();
        assert!(fence.begin(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
        assert!(fence.signaled.get());
    }

    #[test]
    fn present_results() {
        assert_eq!(classify_present(Ok(false)).unwrap(), None);
        assert_eq!(
            classify_present(Ok(true)).unwrap(),
            Some(RecreateReason::Suboptimal)
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Some(RecreateReason::OutOfDate)
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D { width: 640, height: 480 };
        let vp = full_viewport(extent);
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 640.0, 480.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
        let sc = full_scissor(extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!(sc.extent, extent);
    }
}
