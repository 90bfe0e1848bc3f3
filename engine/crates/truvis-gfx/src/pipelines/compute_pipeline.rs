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

pub struct GfxComputePipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,
}
impl GfxComputePipeline {
    pub fn new(
        shader_path: impl AsRef<std::path::Path>,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let mut shader_modules_cache = GfxShaderModuleCache::new();
        let stage_info = GfxShaderStageInfo::new(vk::ShaderStageFlags::COMPUTE, shader_path);
        let stages = match shader_modules_cache.load_stages(std::slice::from_ref(&stage_info)) {
            Ok(stages) => stages,
            Err(e) => {
                shader_modules_cache.destroy();
                return Err(e).with_context(|| format!("load shader for pipeline: {}", debug_name));
            }
        };

        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stages[0]).layout(pipeline_layout.handle());

        let gfx_device = Gfx::get().gfx_device();
        let pipelines = unsafe {
            gfx_device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        shader_modules_cache.destroy();

        let pipeline = pipelines
            .map_err(|(_, e)| e)
            .with_context(|| format!("create compute pipeline: {}", debug_name))?
            .into_iter()
            .next()
            .context("driver returned no pipeline")?;
        let pipeline = Self {
            pipeline,
            pipeline_layout,
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
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxComputePipeline {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxComputePipeline {
    fn debug_type_name() -> &'static str {
        "GfxComputePipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
