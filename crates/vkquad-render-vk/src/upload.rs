// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context as _, Result};
use ash::vk;
use tracing::{debug, info};

use crate::error::VkError;
use crate::geometry;

/// First memory type allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, VkError> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(VkError::NoMemoryType {
            type_bits,
            required,
        })
}

const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

// Both static buffers stay copyable-from so they can be read back.
pub const VERTEX_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::VERTEX_BUFFER.as_raw() | vk::BufferUsageFlags::TRANSFER_SRC.as_raw(),
);
pub const INDEX_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::INDEX_BUFFER.as_raw() | vk::BufferUsageFlags::TRANSFER_SRC.as_raw(),
);

/// Usage of a device-local buffer filled by a staged copy.
pub fn staged_usage(usage: vk::BufferUsageFlags) -> vk::BufferUsageFlags {
    usage | vk::BufferUsageFlags::TRANSFER_DST
}

/// A buffer with its own dedicated allocation.
#[derive(Debug, Default)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer, None);
            self.buffer = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
            self.memory = vk::DeviceMemory::null();
        }
        self.size = 0;
    }
}

/// Vertex and index buffers for the quad, created once at startup.
#[derive(Debug, Default)]
pub struct StaticGeometry {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl StaticGeometry {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.indices.destroy(device);
        self.vertices.destroy(device);
        self.index_count = 0;
    }
}

/// Everything a one-shot transfer needs. Borrowed from the context for the
/// duration of startup (and by tests for read-back).
pub struct Uploader<'a> {
    pub device: &'a ash::Device,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,
}

impl<'a> Uploader<'a> {
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &'a ash::Device,
        phys: vk::PhysicalDevice,
        queue: vk::Queue,
        command_pool: vk::CommandPool,
    ) -> Self {
        Self {
            device,
            memory_properties: instance.get_physical_device_memory_properties(phys),
            queue,
            command_pool,
        }
    }

    pub unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer> {
        let d = self.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let mut out = GpuBuffer {
            buffer: d.create_buffer(&bci, None).context("create_buffer")?,
            memory: vk::DeviceMemory::null(),
            size,
        };
        let req = d.get_buffer_memory_requirements(out.buffer);
        let mem_type = match find_memory_type(&self.memory_properties, req.memory_type_bits, props) {
            Ok(i) => i,
            Err(e) => {
                out.destroy(d);
                return Err(e.into());
            }
        };
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: mem_type,
            ..Default::default()
        };
        out.memory = match d.allocate_memory(&mai, None) {
            Ok(m) => m,
            Err(e) => {
                out.destroy(d);
                return Err(e).context("allocate_memory");
            }
        };
        if let Err(e) = d.bind_buffer_memory(out.buffer, out.memory, 0) {
            out.destroy(d);
            return Err(e).context("bind_buffer_memory");
        }
        Ok(out)
    }

    /// Host-visible, host-coherent buffer holding exactly `data`.
    pub unsafe fn create_host_buffer(&self, data: &[u8], usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
        let mut buf = self.create_buffer(data.len() as vk::DeviceSize, usage, HOST_MEMORY)?;
        if let Err(e) = self.write(&buf, data) {
            buf.destroy(self.device);
            return Err(e);
        }
        Ok(buf)
    }

    unsafe fn write(&self, buf: &GpuBuffer, data: &[u8]) -> Result<()> {
        let ptr = self
            .device
            .map_memory(buf.memory, 0, buf.size, vk::MemoryMapFlags::empty())
            .context("map_memory")?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
        self.device.unmap_memory(buf.memory);
        Ok(())
    }

    /// Device-local buffer filled from a temporary staging buffer. The
    /// staging buffer is gone by the time this returns.
    pub unsafe fn create_device_local_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer> {
        let mut staging = self.create_host_buffer(data, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let result = self
            .create_buffer(
                staging.size,
                staged_usage(usage),
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .and_then(|mut dst| match self.copy_buffer(staging.buffer, dst.buffer, staging.size) {
                Ok(()) => Ok(dst),
                Err(e) => {
                    dst.destroy(self.device);
                    Err(e)
                }
            });
        staging.destroy(self.device);
        result
    }

    /// Whole-range copy through a one-shot command buffer, waited on with a
    /// dedicated fence.
    pub unsafe fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        let d = self.device;
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = d
            .allocate_command_buffers(&ai)
            .context("allocate_command_buffers")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("allocate_command_buffers returned nothing"))?;
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            ..Default::default()
        };
        let fence = match d.create_fence(&fence_ci, None) {
            Ok(f) => f,
            Err(e) => {
                d.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd));
                return Err(e).context("create_fence");
            }
        };

        let result = self.record_and_submit(cmd, fence, src, dst, size);

        d.destroy_fence(fence, None);
        d.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd));
        result
    }

    unsafe fn record_and_submit(
        &self,
        cmd: vk::CommandBuffer,
        fence: vk::Fence,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let d = self.device;
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &bi)
            .context("begin_command_buffer(upload)")?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        d.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        d.end_command_buffer(cmd)
            .context("end_command_buffer(upload)")?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        d.queue_submit(self.queue, std::slice::from_ref(&si), fence)
            .context("queue_submit(upload)")?;
        d.wait_for_fences(&[fence], true, u64::MAX)
            .context("wait_for_fences(upload)")?;
        Ok(())
    }

    /// Copies `src` back into host memory and returns its bytes.
    pub unsafe fn read_buffer(&self, src: &GpuBuffer) -> Result<Vec<u8>> {
        let mut staging = self.create_buffer(
            src.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            HOST_MEMORY,
        )?;
        let result = self
            .copy_buffer(src.buffer, staging.buffer, src.size)
            .and_then(|()| {
                let ptr = self
                    .device
                    .map_memory(staging.memory, 0, staging.size, vk::MemoryMapFlags::empty())
                    .context("map_memory(read back)")?;
                let bytes =
                    std::slice::from_raw_parts(ptr.cast::<u8>(), staging.size as usize).to_vec();
                self.device.unmap_memory(staging.memory);
                Ok(bytes)
            });
        staging.destroy(self.device);
        result
    }

    /// Vertices straight into host-visible memory, indices staged into
    /// device-local memory.
    pub unsafe fn upload_quad(&self) -> Result<StaticGeometry> {
        let vertex_bytes = geometry::vertex_bytes();
        let index_bytes = geometry::index_bytes();

        let mut vertices = self
            .create_host_buffer(vertex_bytes, VERTEX_USAGE)
            .context("vertex buffer")?;
        let indices = match self
            .create_device_local_buffer(index_bytes, INDEX_USAGE)
            .context("index buffer")
        {
            Ok(b) => b,
            Err(e) => {
                vertices.destroy(self.device);
                return Err(e);
            }
        };
        debug!(
            "vk: vertex buffer {} bytes (host), index buffer {} bytes (device-local)",
            vertices.size, indices.size
        );
        info!("vk: static geometry uploaded");
        Ok(StaticGeometry {
            vertices,
            indices,
            index_count: geometry::QUAD_INDICES.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &f) in p.memory_types.iter_mut().zip(flags) {
            slot.property_flags = f;
        }
        p
    }

    #[test]
    fn picks_first_allowed_superset() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_MEMORY,
            HOST_MEMORY | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&p, 0b111, HOST_MEMORY).unwrap(), 1);
        assert_eq!(find_memory_type(&p, 0b100, HOST_MEMORY).unwrap(), 2);
        assert_eq!(
            find_memory_type(&p, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn type_bits_mask_excludes_matches() {
        let p = props(&[HOST_MEMORY, HOST_MEMORY]);
        assert_eq!(find_memory_type(&p, 0b10, HOST_MEMORY).unwrap(), 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 0b1, HOST_MEMORY).unwrap_err();
        assert!(matches!(err, VkError::NoMemoryType { type_bits: 1, .. }));
    }

    #[test]
    fn types_past_the_reported_count_are_ignored() {
        let mut p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        p.memory_types[1].property_flags = HOST_MEMORY;
        assert!(find_memory_type(&p, 0b11, HOST_MEMORY).is_err());
    }

    #[test]
    fn static_buffers_are_valid_copy_sources() {
        assert!(VERTEX_USAGE.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(VERTEX_USAGE.contains(vk::BufferUsageFlags::TRANSFER_SRC));

        let index = staged_usage(INDEX_USAGE);
        assert!(index.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert!(index.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(index.contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn empty_geometry_destroy_is_noop_state() {
        let g = StaticGeometry::default();
        assert_eq!(g.index_count, 0);
        assert_eq!(g.vertices.buffer, vk::Buffer::null());
    }
}
