use std::rc::Rc;

use ash::vk;
use truvis_crate_tools::truvis_path::TruvisPath;
use truvis_gfx::{
    basic::color::LabelColor,
    commands::command_buffer::GfxCommandBuffer,
    descriptors::{
        descriptor::{GfxDescriptorBinding, GfxDescriptorSet, GfxDescriptorSetLayout},
        descriptor_pool::{GfxDescriptorPool, GfxDescriptorPoolCreateInfo},
        write_descriptor_set::GfxDescriptorCursor,
    },
    gfx::Gfx,
    pipelines::{
        graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo},
        pipeline_layout::GfxPipelineLayout,
    },
    resources::layout::{GfxVertexLayout, VertexLayoutAoSMesh},
};

use crate::{
    resources::static_resources::StaticResources,
    settings::{DefaultRendererSettings, FrameLabel},
};

const BINDING_SCENE: GfxDescriptorBinding = GfxDescriptorBinding::new(
    0,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw()),
);
const BINDING_TEXTURE: GfxDescriptorBinding =
    GfxDescriptorBinding::new(1, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT);
const BINDING_SAMPLER: GfxDescriptorBinding =
    GfxDescriptorBinding::new(2, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT);

/// raster 路径：将网格绘制到输出 image，带深度测试
pub struct RasterPass {
    pipeline: GfxGraphicsPipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,

    _descriptor_pool: GfxDescriptorPool,
    descriptor_set_layout: GfxDescriptorSetLayout,
    /// 所有 frame 共用，通过 dynamic offset 选择 uniform slot
    descriptor_set: GfxDescriptorSet,
}

// new & init
impl RasterPass {
    pub fn new(static_resources: &StaticResources, depth_format: vk::Format) -> anyhow::Result<Self> {
        let descriptor_set_layout =
            GfxDescriptorSetLayout::new(&[BINDING_SCENE, BINDING_TEXTURE, BINDING_SAMPLER], "raster")?;
        let descriptor_pool = GfxDescriptorPool::new(
            &GfxDescriptorPoolCreateInfo::new(
                vk::DescriptorPoolCreateFlags::empty(),
                1,
                vec![
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                        descriptor_count: 1,
                    },
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::SAMPLED_IMAGE,
                        descriptor_count: 1,
                    },
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::SAMPLER,
                        descriptor_count: 1,
                    },
                ],
            ),
            "raster",
        )?;
        let descriptor_set = GfxDescriptorSet::new(&descriptor_pool, &descriptor_set_layout, "raster")?;

        Gfx::get().gfx_device().write_descriptor_sets(&[
            BINDING_SCENE.write_buffer(descriptor_set.handle(), vec![static_resources.scene_uniforms().descriptor_info()]),
            BINDING_TEXTURE.write_image(
                descriptor_set.handle(),
                vec![
                    vk::DescriptorImageInfo::default()
                        .image_view(static_resources.texture_view().handle())
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                ],
            ),
            BINDING_SAMPLER.write_image(
                descriptor_set.handle(),
                vec![vk::DescriptorImageInfo::default().sampler(static_resources.sampler().handle())],
            ),
        ]);

        // show_texture_lod
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<u32>() as u32);
        let pipeline_layout = Rc::new(GfxPipelineLayout::new(
            &[descriptor_set_layout.handle()],
            &[push_constant_range],
            "raster",
        )?);

        let pipeline_ci = GfxGraphicsPipelineCreateInfo::new(
            TruvisPath::shader_build_path_str("raster/mesh.vert"),
            TruvisPath::shader_build_path_str("raster/mesh.frag"),
            DefaultRendererSettings::OUTPUT_FORMAT,
        )
        .vertex_layout(VertexLayoutAoSMesh::vertex_input_bindings(), VertexLayoutAoSMesh::vertex_input_attributes())
        .depth_attachment(depth_format, vk::CompareOp::LESS);
        let pipeline = GfxGraphicsPipeline::new(&pipeline_ci, pipeline_layout.clone(), "raster")?;

        Ok(Self {
            pipeline,
            pipeline_layout,
            _descriptor_pool: descriptor_pool,
            descriptor_set_layout,
            descriptor_set,
        })
    }
}

// tools
impl RasterPass {
    /// 输出 image 需要处于 COLOR_ATTACHMENT_OPTIMAL，depth 处于 DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        cmd: &GfxCommandBuffer,
        output_view: vk::ImageView,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
        static_resources: &StaticResources,
        frame_label: FrameLabel,
        show_texture_lod: bool,
    ) {
        cmd.begin_label("raster", LabelColor::COLOR_PASS);

        let color_attach = vk::RenderingAttachmentInfo::default()
            .image_view(output_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: DefaultRendererSettings::clear_color(),
                },
            });
        let depth_attach = vk::RenderingAttachmentInfo::default()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: DefaultRendererSettings::DEPTH_CLEAR,
                    stencil: 0,
                },
            });
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attach))
            .depth_attachment(&depth_attach);

        cmd.begin_rendering(&rendering_info);
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        // 负高度的 viewport，y 轴朝上
        cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(render_area);

        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            self.descriptor_set.handle(),
            &[static_resources.scene_uniforms().dynamic_offset(frame_label)],
        );
        cmd.push_constants(
            self.pipeline_layout.handle(),
            vk::ShaderStageFlags::FRAGMENT,
            0,
            &(show_texture_lod as u32),
        );
        cmd.bind_vertex_buffer(static_resources.vertex_buffer());
        cmd.bind_index_buffer::<u32>(static_resources.index_buffer());
        cmd.draw_indexed(static_resources.index_count(), 0, 0);

        cmd.end_rendering();
        cmd.end_label();
    }
}

// destroy
impl RasterPass {
    pub fn destroy(self) {
        let Self {
            pipeline,
            pipeline_layout,
            _descriptor_pool,
            descriptor_set_layout,
            ..
        } = self;
        pipeline.destroy();
        drop(pipeline_layout);
        descriptor_set_layout.destroy();
        _descriptor_pool.destroy();
    }
}
