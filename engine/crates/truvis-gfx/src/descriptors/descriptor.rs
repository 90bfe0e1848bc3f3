use anyhow::Context;
use ash::vk;

use crate::{descriptors::descriptor_pool::GfxDescriptorPool, foundation::debug_messenger::DebugType, gfx::Gfx};

/// 描述符集布局中的一个 binding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}
impl GfxDescriptorBinding {
    #[inline]
    pub const fn new(binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            descriptor_type,
            descriptor_count: 1,
            stage_flags,
        }
    }

    #[inline]
    pub fn vk_binding(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.descriptor_count)
            .stage_flags(self.stage_flags)
    }
}

/// 描述符集布局
///
/// 描述符集布局定义了描述符集的结构，包括：
/// - 绑定的数量
/// - 每个绑定的类型
/// - 每个绑定的着色器阶段
pub struct GfxDescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<GfxDescriptorBinding>,
}
// new & init
impl GfxDescriptorSetLayout {
    pub fn new(bindings: &[GfxDescriptorBinding], debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        let vk_bindings: Vec<_> = bindings.iter().map(|b| b.vk_binding()).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let gfx_device = Gfx::get().gfx_device();
        let layout = unsafe { gfx_device.create_descriptor_set_layout(&create_info, None) }
            .with_context(|| format!("create descriptor set layout: {}", debug_name.as_ref()))?;
        let layout = Self {
            layout,
            bindings: bindings.to_vec(),
        };
        gfx_device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }
}
// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &[GfxDescriptorBinding] {
        &self.bindings
    }
}
// destroy
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.layout
    }
}

/// 描述符集
///
/// # Destroy
///
/// 跟随 descriptor pool 一起销毁
pub struct GfxDescriptorSet {
    handle: vk::DescriptorSet,
}
impl GfxDescriptorSet {
    pub fn new(
        descriptor_pool: &GfxDescriptorPool,
        layout: &GfxDescriptorSetLayout,
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool.handle())
            .set_layouts(std::slice::from_ref(&layout.layout));
        let gfx_device = Gfx::get().gfx_device();
        let descriptor_sets = unsafe { gfx_device.allocate_descriptor_sets(&alloc_info) }
            .with_context(|| format!("allocate descriptor set: {}", debug_name.as_ref()))?;
        let handle = descriptor_sets.into_iter().next().context("driver returned no descriptor set")?;
        let set = Self { handle };
        gfx_device.set_debug_name(&set, debug_name);
        Ok(set)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }
}
impl DebugType for GfxDescriptorSet {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSet"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
