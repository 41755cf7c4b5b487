// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use ash::util::read_spv;
use ash::vk;
use tracing::{debug, info};

use crate::config::ShaderPaths;
use crate::error::VkError;
use crate::geometry;

const ENTRY_POINT: &CStr = c"main";

/// Reads a precompiled SPIR-V blob into 32-bit words.
pub fn load_shader(path: &Path) -> Result<Vec<u32>, VkError> {
    let bytes = std::fs::read(path).map_err(|source| VkError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    read_spv(&mut Cursor::new(&bytes[..])).map_err(|source| VkError::InvalidSpirv {
        path: path.to_path_buf(),
        source,
    })
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let sm_info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    device
        .create_shader_module(&sm_info, None)
        .context("create_shader_module")
}

pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        ..Default::default()
    }
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    }
}

/// The one fixed-function pipeline and its empty layout. Viewport and
/// scissor are dynamic, so the pipeline outlives swapchain recreation.
#[derive(Debug, Default)]
pub struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub handle: vk::Pipeline,
}

impl GraphicsPipeline {
    pub unsafe fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        shaders: &ShaderPaths,
    ) -> Result<Self> {
        let vs_code = load_shader(&shaders.vertex)?;
        let fs_code = load_shader(&shaders.fragment)?;
        debug!(
            "vk: shaders {} ({} words), {} ({} words)",
            shaders.vertex.display(),
            vs_code.len(),
            shaders.fragment.display(),
            fs_code.len()
        );

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 0,
            push_constant_range_count: 0,
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .context("create_pipeline_layout")?;

        let vs = match create_shader_module(device, &vs_code) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(e);
            }
        };
        let fs = match create_shader_module(device, &fs_code) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                device.destroy_pipeline_layout(layout, None);
                return Err(e);
            }
        };

        let result = build_pipeline(device, render_pass, layout, vs, fs);
        // Modules and their words are only needed for the create call.
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);
        drop(vs_code);
        drop(fs_code);

        match result {
            Ok(handle) => {
                info!("vk: graphics pipeline ready");
                Ok(GraphicsPipeline { layout, handle })
            }
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                Err(e)
            }
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Pipeline::null() {
            device.destroy_pipeline(self.handle, None);
            self.handle = vk::Pipeline::null();
        }
        if self.layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.layout, None);
            self.layout = vk::PipelineLayout::null();
        }
    }
}

unsafe fn build_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
    ];

    let binding = geometry::vertex_binding();
    let attributes = geometry::vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    // rectangles come from cmd_set_viewport / cmd_set_scissor
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = rasterization_state();
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        sample_shading_enable: vk::FALSE,
        ..Default::default()
    };
    let blend_attachment = color_blend_attachment();
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op_enable: vk::FALSE,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, err)| anyhow!("create_graphics_pipelines failed: {err:?}"))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("create_graphics_pipelines returned no pipeline"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("vkquad-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_shader_is_a_load_error() {
        let err = load_shader(Path::new("does/not/exist.vert.spv")).unwrap_err();
        assert!(matches!(err, VkError::ShaderLoad { .. }));
    }

    #[test]
    fn reads_words_from_spirv_blob() {
        let path = temp_path("ok.spv");
        let words: [u32; 3] = [0x0723_0203, 0x0001_0000, 0xdead_beef];
        {
            let mut f = std::fs::File::create(&path).unwrap();
            for w in words {
                f.write_all(&w.to_le_bytes()).unwrap();
            }
        }
        let code = load_shader(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(code, words);
    }

    #[test]
    fn truncated_blob_is_invalid_spirv() {
        let path = temp_path("bad.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();
        let err = load_shader(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, VkError::InvalidSpirv { .. }));
    }

    #[test]
    fn fixed_function_state() {
        let blend = color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask.as_raw(), 0b1111);

        let raster = rasterization_state();
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.depth_bias_enable, vk::FALSE);
    }

    #[test]
    fn entry_point_is_main() {
        assert_eq!(ENTRY_POINT.to_bytes(), b"main");
    }
}
