//! 将浮点输出 image 拷贝（并转换格式）到 swapchain image 的 compute pass

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
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
    pipelines::{compute_pipeline::GfxComputePipeline, pipeline_layout::GfxPipelineLayout},
};

/// 与 shader 中的 local_size 一致
pub const PRESENT_COPY_GROUP_SIZE: u32 = 32;

/// 覆盖整个 surface 所需的 group 数量
#[inline]
pub fn group_count(extent: vk::Extent2D) -> glam::UVec3 {
    glam::uvec3(
        extent.width.div_ceil(PRESENT_COPY_GROUP_SIZE),
        extent.height.div_ceil(PRESENT_COPY_GROUP_SIZE),
        1,
    )
}

/// 计划中的 group 数量必须覆盖整个 surface，多出的线程由 shader 中的边界检查丢弃
pub fn check_group_count(groups: glam::UVec3, extent: vk::Extent2D) -> anyhow::Result<()> {
    anyhow::ensure!(
        groups.z == 1
            && groups.x * PRESENT_COPY_GROUP_SIZE >= extent.width
            && groups.y * PRESENT_COPY_GROUP_SIZE >= extent.height,
        "present copy groups {:?} do not cover {}x{}",
        groups,
        extent.width,
        extent.height
    );
    Ok(())
}

const BINDING_SRC: GfxDescriptorBinding =
    GfxDescriptorBinding::new(0, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::COMPUTE);
const BINDING_DST: GfxDescriptorBinding =
    GfxDescriptorBinding::new(1, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE);

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PushConstants {
    width: u32,
    height: u32,
}

pub struct PresentCopyPass {
    pipeline: GfxComputePipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,
    descriptor_set_layout: GfxDescriptorSetLayout,

    /// 与 swapchain 一起重建
    descriptor_pool: Option<GfxDescriptorPool>,
    /// 每个 swapchain image 一个
    descriptor_sets: Vec<GfxDescriptorSet>,
}

// new & init
impl PresentCopyPass {
    pub fn new() -> anyhow::Result<Self> {
        let descriptor_set_layout = GfxDescriptorSetLayout::new(&[BINDING_SRC, BINDING_DST], "present-copy")?;
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<PushConstants>() as u32);
        let pipeline_layout = Rc::new(GfxPipelineLayout::new(
            &[descriptor_set_layout.handle()],
            &[push_constant_range],
            "present-copy",
        )?);
        let pipeline = GfxComputePipeline::new(
            TruvisPath::shader_build_path_str("present/copy.comp"),
            pipeline_layout.clone(),
            "present-copy",
        )?;

        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            descriptor_pool: None,
            descriptor_sets: vec![],
        })
    }
}

// update
impl PresentCopyPass {
    /// 输出 image 或 swapchain 重建之后调用：重新分配每个 swapchain image 的 descriptor set
    pub fn rebuild_descriptor_sets(
        &mut self,
        output_view: vk::ImageView,
        swapchain_views: &[vk::ImageView],
    ) -> anyhow::Result<()> {
        self.release_descriptor_sets();

        let image_cnt = swapchain_views.len() as u32;
        let pool = GfxDescriptorPool::new(
            &GfxDescriptorPoolCreateInfo::new(
                vk::DescriptorPoolCreateFlags::empty(),
                image_cnt,
                vec![
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::SAMPLED_IMAGE,
                        descriptor_count: image_cnt,
                    },
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::STORAGE_IMAGE,
                        descriptor_count: image_cnt,
                    },
                ],
            ),
            "present-copy",
        )?;

        let sets = (0..swapchain_views.len())
            .map(|idx| GfxDescriptorSet::new(&pool, &self.descriptor_set_layout, format!("present-copy-{idx}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let writes = sets
            .iter()
            .zip(swapchain_views)
            .flat_map(|(set, swapchain_view)| {
                [
                    BINDING_SRC.write_image(
                        set.handle(),
                        vec![
                            vk::DescriptorImageInfo::default()
                                .image_view(output_view)
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                        ],
                    ),
                    BINDING_DST.write_image(
                        set.handle(),
                        vec![
                            vk::DescriptorImageInfo::default()
                                .image_view(*swapchain_view)
                                .image_layout(vk::ImageLayout::GENERAL),
                        ],
                    ),
                ]
            })
            .collect_vec();
        Gfx::get().gfx_device().write_descriptor_sets(&writes);

        self.descriptor_pool = Some(pool);
        self.descriptor_sets = sets;
        Ok(())
    }

    fn release_descriptor_sets(&mut self) {
        self.descriptor_sets.clear();
        if let Some(pool) = self.descriptor_pool.take() {
            pool.destroy();
        }
    }
}

// tools
impl PresentCopyPass {
    /// 输出 image 需要处于 SHADER_READ_ONLY_OPTIMAL，swapchain image 处于 GENERAL
    pub fn dispatch(
        &self,
        cmd: &GfxCommandBuffer,
        image_index: usize,
        groups: glam::UVec3,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        check_group_count(groups, extent)?;
        let set = self
            .descriptor_sets
            .get(image_index)
            .ok_or_else(|| anyhow::anyhow!("no present copy descriptor set for swapchain image {}", image_index))?;

        cmd.begin_label("present-copy", LabelColor::COLOR_PASS);
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline.handle());
        cmd.bind_descriptor_set(vk::PipelineBindPoint::COMPUTE, self.pipeline_layout.handle(), set.handle(), &[]);
        cmd.push_constants(
            self.pipeline_layout.handle(),
            vk::ShaderStageFlags::COMPUTE,
            0,
            &PushConstants {
                width: extent.width,
                height: extent.height,
            },
        );
        cmd.dispatch(groups);
        cmd.end_label();
        Ok(())
    }
}

// destroy
impl PresentCopyPass {
    pub fn destroy(mut self) {
        self.release_descriptor_sets();
        let Self {
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            ..
        } = self;
        pipeline.destroy();
        drop(pipeline_layout);
        descriptor_set_layout.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count_ceil_div() {
        let cases = [
            ((800, 600), (25, 19)),
            ((1920, 1080), (60, 34)),
            ((32, 32), (1, 1)),
            ((33, 1), (2, 1)),
            ((1, 1), (1, 1)),
        ];
        for ((w, h), (gx, gy)) in cases {
            let groups = group_count(vk::Extent2D { width: w, height: h });
            assert_eq!(groups, glam::uvec3(gx, gy, 1), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_check_group_count() {
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert!(check_group_count(group_count(extent), extent).is_ok());
        assert!(check_group_count(glam::uvec3(60, 34, 1), extent).is_ok());
        // 沿用 resize 之前的 group 数量
        assert!(check_group_count(glam::uvec3(25, 19, 1), extent).is_err());
        assert!(check_group_count(glam::uvec3(60, 34, 0), extent).is_err());
    }

    #[test]
    fn test_push_constant_size() {
        assert_eq!(size_of::<PushConstants>(), 8);
    }
}
