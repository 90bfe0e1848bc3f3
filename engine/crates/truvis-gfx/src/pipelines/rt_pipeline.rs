use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderGroupInfo, GfxShaderModuleCache, GfxShaderStageInfo},
    },
};

/// 光追管线
///
/// shader group 的顺序决定了 shader group handle 的顺序，也就决定了 SBT 的布局
pub struct GfxRtPipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,
    group_count: u32,
}
impl GfxRtPipeline {
    pub fn new(
        stages: &[GfxShaderStageInfo],
        groups: &[GfxShaderGroupInfo],
        max_recursion_depth: u32,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let mut shader_modules_cache = GfxShaderModuleCache::new();
        let stage_infos = match shader_modules_cache.load_stages(stages) {
            Ok(stages) => stages,
            Err(e) => {
                shader_modules_cache.destroy();
                return Err(e).with_context(|| format!("load shaders for pipeline: {}", debug_name));
            }
        };
        let group_infos = groups.iter().map(|g| g.vk_info()).collect_vec();

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stage_infos)
            .groups(&group_infos)
            .max_pipeline_ray_recursion_depth(max_recursion_depth)
            .layout(pipeline_layout.handle());

        let gfx_device = Gfx::get().gfx_device();
        let pipelines = unsafe {
            gfx_device.ray_tracing_pipeline().create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        };
        shader_modules_cache.destroy();

        let pipeline = pipelines
            .map_err(|(_, e)| e)
            .with_context(|| format!("create ray tracing pipeline: {}", debug_name))?
            .into_iter()
            .next()
            .context("driver returned no pipeline")?;
        let pipeline = Self {
            pipeline,
            pipeline_layout,
            group_count: groups.len() as u32,
        };
        gfx_device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    #[inline]
    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    /// 获取所有 shader group 的 handle，紧密排列，每个 handle_size 字节
    pub fn shader_group_handles(&self, handle_size: u32) -> anyhow::Result<Vec<u8>> {
        let data_size = (self.group_count * handle_size) as usize;
        unsafe {
            Gfx::get().gfx_device().ray_tracing_pipeline().get_ray_tracing_shader_group_handles(
                self.pipeline,
                0,
                self.group_count,
                data_size,
            )
        }
        .context("get ray tracing shader group handles")
    }

    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxRtPipeline {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxRtPipeline {
    fn debug_type_name() -> &'static str {
        "GfxRtPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
