use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::{
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderModuleCache, GfxShaderStageInfo},
    },
};

/// color attachment 的混合方式
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxBlendMode {
    /// 直接覆盖
    Opaque,
    /// 非预乘 alpha：`src.rgb * src.a + dst.rgb * (1 - src.a)`
    Alpha,
}
impl GfxBlendMode {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            Self::Opaque => state.blend_enable(false),
            Self::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// 用于 dynamic rendering 的图形管线：单个 color attachment，可选的 depth attachment，
/// viewport 与 scissor 都是 dynamic state
pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,

    /// 管线存活期间 layout 不能被销毁
    _pipeline_layout: Rc<GfxPipelineLayout>,
}

// new & init
impl GfxGraphicsPipeline {
    pub fn new(
        create_info: &GfxGraphicsPipelineCreateInfo,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let color_formats = [create_info.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(create_info.depth.map_or(vk::Format::UNDEFINED, |(format, _)| format));

        let mut shader_modules = GfxShaderModuleCache::new();
        let stages = match shader_modules.load_stages(&create_info.shader_stages) {
            Ok(stages) => stages,
            Err(e) => {
                shader_modules.destroy();
                return Err(e).with_context(|| format!("load shaders for pipeline: {}", debug_name));
            }
        };

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_bindings)
            .vertex_attribute_descriptions(&create_info.vertex_attributes);
        let input_assembly_state =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        // 数量在这里确定，具体的值在录制时设置
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(create_info.cull_mode)
            .front_face(create_info.front_face);
        let multisample_state =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = create_info.blend_mode.attachment_state();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(std::slice::from_ref(&blend_attachment));

        let depth_stencil_state = match create_info.depth {
            Some((_, compare_op)) => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(compare_op),
            None => vk::PipelineDepthStencilStateCreateInfo::default(),
        };

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .depth_stencil_state(&depth_stencil_state)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout.handle())
            .push_next(&mut rendering_info);

        let gfx_device = Gfx::get().gfx_device();
        let pipelines = unsafe {
            gfx_device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        shader_modules.destroy();

        let pipeline = pipelines
            .map_err(|(_, e)| e)
            .with_context(|| format!("create graphics pipeline: {}", debug_name))?
            .into_iter()
            .next()
            .context("driver returned no pipeline")?;
        let pipeline = Self {
            pipeline,
            _pipeline_layout: pipeline_layout,
        };
        gfx_device.set_debug_name(&pipeline, debug_name);

        Ok(pipeline)
    }
}

// getters
impl GfxGraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

// destroy
impl GfxGraphicsPipeline {
    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

pub struct GfxGraphicsPipelineCreateInfo {
    shader_stages: Vec<GfxShaderStageInfo>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    color_format: vk::Format,
    blend_mode: GfxBlendMode,
    /// None 表示没有 depth attachment，也不做深度测试
    depth: Option<(vk::Format, vk::CompareOp)>,

    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
}

// new & init
impl GfxGraphicsPipelineCreateInfo {
    /// 默认：背面剔除，CCW 为正面，不混合，没有 depth
    pub fn new(
        vertex_shader: impl AsRef<std::path::Path>,
        fragment_shader: impl AsRef<std::path::Path>,
        color_format: vk::Format,
    ) -> Self {
        Self {
            shader_stages: vec![
                GfxShaderStageInfo::new(vk::ShaderStageFlags::VERTEX, vertex_shader),
                GfxShaderStageInfo::new(vk::ShaderStageFlags::FRAGMENT, fragment_shader),
            ],
            vertex_bindings: vec![],
            vertex_attributes: vec![],
            color_format,
            blend_mode: GfxBlendMode::Opaque,
            depth: None,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

// builder
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn vertex_layout(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    #[inline]
    pub fn blend_mode(mut self, blend_mode: GfxBlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// 开启深度测试和深度写入
    #[inline]
    pub fn depth_attachment(mut self, format: vk::Format, compare_op: vk::CompareOp) -> Self {
        self.depth = Some((format, compare_op));
        self
    }

    #[inline]
    pub fn cull_mode(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_blend_state() {
        let state = GfxBlendMode::Alpha.attachment_state();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_opaque_writes_all_channels() {
        let state = GfxBlendMode::Opaque.attachment_state();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_builder_defaults() {
        let ci = GfxGraphicsPipelineCreateInfo::new("a.vert.spv", "a.frag.spv", vk::Format::R8G8B8A8_UNORM)
            .depth_attachment(vk::Format::D32_SFLOAT, vk::CompareOp::LESS);
        assert_eq!(ci.shader_stages.len(), 2);
        assert_eq!(ci.blend_mode, GfxBlendMode::Opaque);
        assert_eq!(ci.depth, Some((vk::Format::D32_SFLOAT, vk::CompareOp::LESS)));
        assert_eq!(ci.cull_mode, vk::CullModeFlags::BACK);
    }
}
