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
        pipeline_layout::GfxPipelineLayout,
        rt_pipeline::GfxRtPipeline,
        shader::{GfxShaderGroupInfo, GfxShaderStageInfo},
    },
};

use crate::{
    raytracing::{acceleration_builder::AccelerationBuilder, sbt_layout::SbtRegions},
    resources::static_resources::StaticResources,
    settings::FrameLabel,
};

const RT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::RAYGEN_KHR.as_raw() | vk::ShaderStageFlags::CLOSEST_HIT_KHR.as_raw(),
);

const BINDING_OUTPUT: GfxDescriptorBinding =
    GfxDescriptorBinding::new(0, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::RAYGEN_KHR);
const BINDING_TLAS: GfxDescriptorBinding =
    GfxDescriptorBinding::new(1, vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, vk::ShaderStageFlags::RAYGEN_KHR);
const BINDING_INDICES: GfxDescriptorBinding =
    GfxDescriptorBinding::new(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::CLOSEST_HIT_KHR);
const BINDING_VERTICES: GfxDescriptorBinding =
    GfxDescriptorBinding::new(3, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::CLOSEST_HIT_KHR);
const BINDING_TEXTURE: GfxDescriptorBinding =
    GfxDescriptorBinding::new(4, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::CLOSEST_HIT_KHR);
const BINDING_SAMPLER: GfxDescriptorBinding =
    GfxDescriptorBinding::new(5, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::CLOSEST_HIT_KHR);
const BINDING_SCENE: GfxDescriptorBinding =
    GfxDescriptorBinding::new(6, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, RT_STAGES);

/// 光追路径：每个像素发射 1 或 4 条光线，结果直接写入输出 image
///
/// shader group 的顺序为 `[raygen][miss][closest-hit]`，与 SBT 布局一致
pub struct RtPass {
    pipeline: GfxRtPipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,
    sbt: SbtRegions,

    _descriptor_pool: GfxDescriptorPool,
    descriptor_set_layout: GfxDescriptorSetLayout,
    descriptor_set: GfxDescriptorSet,
}

// new & init
impl RtPass {
    pub fn new(static_resources: &StaticResources, acceleration: &AccelerationBuilder) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RtPass::new");

        let descriptor_set_layout = GfxDescriptorSetLayout::new(
            &[
                BINDING_OUTPUT,
                BINDING_TLAS,
                BINDING_INDICES,
                BINDING_VERTICES,
                BINDING_TEXTURE,
                BINDING_SAMPLER,
                BINDING_SCENE,
            ],
            "rt",
        )?;
        let pool_size = |ty: vk::DescriptorType, descriptor_count: u32| vk::DescriptorPoolSize { ty, descriptor_count };
        let descriptor_pool = GfxDescriptorPool::new(
            &GfxDescriptorPoolCreateInfo::new(
                vk::DescriptorPoolCreateFlags::empty(),
                1,
                vec![
                    pool_size(vk::DescriptorType::STORAGE_IMAGE, 1),
                    pool_size(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1),
                    pool_size(vk::DescriptorType::STORAGE_BUFFER, 2),
                    pool_size(vk::DescriptorType::SAMPLED_IMAGE, 1),
                    pool_size(vk::DescriptorType::SAMPLER, 1),
                    pool_size(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
                ],
            ),
            "rt",
        )?;
        let descriptor_set = GfxDescriptorSet::new(&descriptor_pool, &descriptor_set_layout, "rt")?;

        // 与分辨率无关的 binding 只写入一次，输出 image 在 resize 时通过 update_output 写入
        let set = descriptor_set.handle();
        Gfx::get().gfx_device().write_descriptor_sets(&[
            BINDING_TLAS.write_tlas(set, vec![acceleration.tlas().handle()]),
            BINDING_INDICES.write_buffer(
                set,
                vec![
                    vk::DescriptorBufferInfo::default()
                        .buffer(static_resources.index_buffer().vk_buffer())
                        .range(vk::WHOLE_SIZE),
                ],
            ),
            BINDING_VERTICES.write_buffer(
                set,
                vec![
                    vk::DescriptorBufferInfo::default()
                        .buffer(static_resources.vertex_buffer().vk_buffer())
                        .range(vk::WHOLE_SIZE),
                ],
            ),
            BINDING_TEXTURE.write_image(
                set,
                vec![
                    vk::DescriptorImageInfo::default()
                        .image_view(static_resources.texture_view().handle())
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                ],
            ),
            BINDING_SAMPLER.write_image(
                set,
                vec![vk::DescriptorImageInfo::default().sampler(static_resources.sampler().handle())],
            ),
            BINDING_SCENE.write_buffer(set, vec![static_resources.scene_uniforms().descriptor_info()]),
        ]);

        // raygen: spp4; closest hit: show_texture_lod
        let push_constant_ranges = [
            vk::PushConstantRange::default().stage_flags(vk::ShaderStageFlags::RAYGEN_KHR).offset(0).size(4),
            vk::PushConstantRange::default().stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR).offset(4).size(4),
        ];
        let pipeline_layout =
            Rc::new(GfxPipelineLayout::new(&[descriptor_set_layout.handle()], &push_constant_ranges, "rt")?);

        let stages = [
            GfxShaderStageInfo::new(vk::ShaderStageFlags::RAYGEN_KHR, TruvisPath::shader_build_path_str("rt/mesh.rgen")),
            GfxShaderStageInfo::new(vk::ShaderStageFlags::MISS_KHR, TruvisPath::shader_build_path_str("rt/mesh.rmiss")),
            GfxShaderStageInfo::new(
                vk::ShaderStageFlags::CLOSEST_HIT_KHR,
                TruvisPath::shader_build_path_str("rt/mesh.rchit"),
            ),
        ];
        let groups = [
            GfxShaderGroupInfo::general(0),
            GfxShaderGroupInfo::general(1),
            GfxShaderGroupInfo::triangles_hit(2),
        ];
        let pipeline = GfxRtPipeline::new(&stages, &groups, 1, pipeline_layout.clone(), "rt")?;
        let sbt = SbtRegions::new(&pipeline)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
            sbt,
            _descriptor_pool: descriptor_pool,
            descriptor_set_layout,
            descriptor_set,
        })
    }
}

// update
impl RtPass {
    /// 输出 image 重建之后需要重新写入
    pub fn update_output(&self, output_view: vk::ImageView) {
        Gfx::get().gfx_device().write_descriptor_sets(&[BINDING_OUTPUT.write_image(
            self.descriptor_set.handle(),
            vec![
                vk::DescriptorImageInfo::default()
                    .image_view(output_view)
                    .image_layout(vk::ImageLayout::GENERAL),
            ],
        )]);
    }
}

// tools
impl RtPass {
    /// 输出 image 需要处于 GENERAL，TLAS 需要已经完成本帧的 update
    pub fn trace(
        &self,
        cmd: &GfxCommandBuffer,
        extent: vk::Extent2D,
        static_resources: &StaticResources,
        frame_label: FrameLabel,
        spp4: bool,
        show_texture_lod: bool,
    ) {
        cmd.begin_label("ray-tracing", LabelColor::COLOR_PASS);

        cmd.bind_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR, self.pipeline.handle());
        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            self.pipeline_layout.handle(),
            self.descriptor_set.handle(),
            &[static_resources.scene_uniforms().dynamic_offset(frame_label)],
        );
        cmd.push_constants(self.pipeline_layout.handle(), vk::ShaderStageFlags::RAYGEN_KHR, 0, &(spp4 as u32));
        cmd.push_constants(
            self.pipeline_layout.handle(),
            vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            4,
            &(show_texture_lod as u32),
        );
        cmd.trace_rays(self.sbt.raygen(), self.sbt.miss(), self.sbt.hit(), self.sbt.callable(), extent);

        cmd.end_label();
    }
}

// destroy
impl RtPass {
    pub fn destroy(self) {
        let Self {
            pipeline,
            pipeline_layout,
            sbt,
            _descriptor_pool,
            descriptor_set_layout,
            ..
        } = self;
        sbt.destroy();
        pipeline.destroy();
        drop(pipeline_layout);
        descriptor_set_layout.destroy();
        _descriptor_pool.destroy();
    }
}
