// SPDX-License-Identifier: CEPL-1.0
use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub tex_coord: [f32; 2],
}

// Clockwise in framebuffer space (y down), which is the pipeline's front face.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { pos: [-1.0, -1.0], tex_coord: [0.0, 1.0] },
    Vertex { pos: [1.0, -1.0], tex_coord: [1.0, 1.0] },
    Vertex { pos: [1.0, 1.0], tex_coord: [1.0, 0.0] },
    Vertex { pos: [-1.0, 1.0], tex_coord: [0.0, 0.0] },
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

pub fn vertex_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_VERTICES)
}

pub fn index_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_INDICES)
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, tex_coord) as u32,
        },
    ]
}
