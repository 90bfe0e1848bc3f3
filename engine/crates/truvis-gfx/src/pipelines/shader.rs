use std::{collections::HashMap, ffi::CStr};

use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
pub struct GfxShaderModule {
    handle: vk::ShaderModule,

    #[cfg(debug_assertions)]
    destroyed: bool,
}
impl GfxShaderModule {
    /// # param
    /// * path - spv shader 文件路径
    pub fn new(path: &std::path::Path) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let mut file =
            std::fs::File::open(path).with_context(|| format!("failed to open shader: {}", path.display()))?;
        let shader_code =
            ash::util::read_spv(&mut file).with_context(|| format!("invalid spir-v file: {}", path.display()))?;

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&shader_code);

        let shader_module = unsafe { gfx_device.create_shader_module(&shader_module_info, None) }
            .with_context(|| format!("create shader module: {}", path.display()))?;
        let shader_module = Self {
            handle: shader_module,

            #[cfg(debug_assertions)]
            destroyed: false,
        };
        gfx_device.set_debug_name(&shader_module, path.to_string_lossy());
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(mut self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.destroy_shader_module(self.handle, None);
        }
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed, "GfxShaderModule must be destroyed manually before drop.");
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 可以存放多个 GfxShaderModule，使用路径进行索引
///
/// 只在创建 pipeline 期间存在，pipeline 创建完成后即可销毁
pub struct GfxShaderModuleCache {
    shader_modules: HashMap<String, GfxShaderModule>,
    #[cfg(debug_assertions)]
    destroyed: bool,
}
impl Default for GfxShaderModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GfxShaderModuleCache {
    pub fn new() -> Self {
        Self {
            shader_modules: HashMap::new(),
            #[cfg(debug_assertions)]
            destroyed: false,
        }
    }

    pub fn get_or_load(&mut self, path: &std::path::Path) -> anyhow::Result<vk::ShaderModule> {
        let path_str = path.to_string_lossy().into_owned();
        if let Some(module) = self.shader_modules.get(&path_str) {
            return Ok(module.handle());
        }
        let module = GfxShaderModule::new(path)?;
        let handle = module.handle();
        self.shader_modules.insert(path_str, module);
        Ok(handle)
    }

    /// 依次加载所有 stage 的 shader module
    pub fn load_stages(&mut self, stages: &[GfxShaderStageInfo]) -> anyhow::Result<Vec<vk::PipelineShaderStageCreateInfo<'static>>> {
        stages
            .iter()
            .map(|stage| {
                Ok(vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(self.get_or_load(stage.path())?)
                    .name(stage.entry_point))
            })
            .collect()
    }

    pub fn destroy(mut self) {
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }

        // 使用 std::mem::take 来 move 出 HashMap，留下一个空的 HashMap
        let shader_modules = std::mem::take(&mut self.shader_modules);
        shader_modules.into_values().for_each(|module| module.destroy());
    }
}
impl Drop for GfxShaderModuleCache {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed, "GfxShaderModuleCache must be destroyed manually before drop.");
    }
}

#[derive(Clone, Debug)]
pub struct GfxShaderStageInfo {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static CStr,
    pub path: String,
}
impl GfxShaderStageInfo {
    #[inline]
    pub fn new(stage: vk::ShaderStageFlags, path: impl AsRef<std::path::Path>) -> Self {
        Self {
            stage,
            entry_point: c"main",
            path: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    #[inline]
    pub fn path(&self) -> &std::path::Path {
        std::path::Path::new(self.path.as_str())
    }
}

/// 用于 RayTracing Pipeline 的创建
///
/// 在 pipeline create info 的 groups 中，每个 shader group 引用的 stage index
///
/// 每个 shader group 可以由多个 shader 组成，每个 shader group 都是独一无二的
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxShaderGroupInfo {
    pub ty: vk::RayTracingShaderGroupTypeKHR,
    pub general: u32,
    pub closest_hit: u32,
    pub any_hit: u32,
    pub intersection: u32,
}
impl GfxShaderGroupInfo {
    pub const fn unused() -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::GENERAL,
            general: vk::SHADER_UNUSED_KHR,
            closest_hit: vk::SHADER_UNUSED_KHR,
            any_hit: vk::SHADER_UNUSED_KHR,
            intersection: vk::SHADER_UNUSED_KHR,
        }
    }

    /// raygen、miss、callable 使用的 general group
    pub const fn general(stage_index: u32) -> Self {
        Self {
            general: stage_index,
            ..Self::unused()
        }
    }

    /// 只有 closest hit 的三角形 hit group
    pub const fn triangles_hit(closest_hit_index: u32) -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
            closest_hit: closest_hit_index,
            ..Self::unused()
        }
    }

    #[inline]
    pub fn vk_info(&self) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(self.ty)
            .general_shader(self.general)
            .closest_hit_shader(self.closest_hit)
            .any_hit_shader(self.any_hit)
            .intersection_shader(self.intersection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_group_constructors() {
        let raygen = GfxShaderGroupInfo::general(0);
        assert_eq!(raygen.ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(raygen.general, 0);
        assert_eq!(raygen.closest_hit, vk::SHADER_UNUSED_KHR);

        let hit = GfxShaderGroupInfo::triangles_hit(2);
        assert_eq!(hit.ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!(hit.general, vk::SHADER_UNUSED_KHR);
        assert_eq!(hit.closest_hit, 2);
        assert_eq!(hit.vk_info().closest_hit_shader, 2);
    }
}
