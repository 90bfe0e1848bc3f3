use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 描述符池创建信息
///
/// 用于配置描述符池的创建参数，包括：
/// - 标志位
/// - 最大描述符集数量
/// - 每种类型描述符的最大数量
pub struct GfxDescriptorPoolCreateInfo {
    flags: vk::DescriptorPoolCreateFlags,
    max_sets: u32,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
}

impl GfxDescriptorPoolCreateInfo {
    #[inline]
    pub fn new(flags: vk::DescriptorPoolCreateFlags, max_sets: u32, pool_sizes: Vec<vk::DescriptorPoolSize>) -> Self {
        Self {
            flags,
            max_sets,
            pool_sizes,
        }
    }
}

/// 描述符池
///
/// 池子销毁时，从中分配的所有描述符集一起释放
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    name: String,
}
impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        log::debug!("Destroying GfxDescriptorPool: {}", self.name);
        unsafe { Gfx::get().gfx_device().destroy_descriptor_pool(self.handle, None) };
    }
}
// new & init
impl GfxDescriptorPool {
    #[inline]
    pub fn new(ci: &GfxDescriptorPoolCreateInfo, name: &str) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let vk_ci = vk::DescriptorPoolCreateInfo::default()
            .flags(ci.flags)
            .max_sets(ci.max_sets)
            .pool_sizes(&ci.pool_sizes);
        let pool = unsafe { gfx_device.create_descriptor_pool(&vk_ci, None) }
            .with_context(|| format!("create descriptor pool: {}", name))?;
        let pool = Self {
            handle: pool,
            name: name.to_string(),
        };
        gfx_device.set_debug_name(&pool, name);
        Ok(pool)
    }
}
// getters
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }
}
// destroy
impl GfxDescriptorPool {
    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
