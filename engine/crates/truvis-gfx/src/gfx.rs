use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer,
        command_pool::GfxCommandPool,
        command_queue::{GfxCommandQueue, GfxQueueFamily},
        submit_info::GfxSubmitInfo,
    },
    foundation::{
        device::GfxDevice, instance::GfxInstance, mem_allocator::GfxMemAllocator,
        physical_device::GfxPhysicalDevice,
    },
    gfx_core::GfxCore,
};

/// Vulkan 图形上下文单例
///
/// 管理所有 Vulkan 核心资源，包括实例、设备、队列、内存分配器等。
/// 采用单例模式简化参数传递和生命周期管理，仅适用于单线程环境。
///
/// # 初始化流程
/// ```ignore
/// Gfx::init("MyApp", &extra_extensions, true)?;
/// let device = Gfx::get().gfx_device();
/// // 使用...
/// Gfx::destroy();
/// ```
pub struct Gfx {
    pub(crate) gfx_core: GfxCore,
    pub(crate) vm_allocator: GfxMemAllocator,

    /// 临时的 graphics command pool，主要用于一次性的命令缓冲区
    pub(crate) temp_graphics_command_pool: GfxCommandPool,
}

// new & init
impl Gfx {
    const ENGINE_NAME: &'static str = "Truvis";

    fn new(app_name: &str, instance_extra_exts: &[&'static CStr], enable_validation: bool) -> anyhow::Result<Self> {
        let gfx_core = GfxCore::new(app_name, Self::ENGINE_NAME, instance_extra_exts, enable_validation)?;

        // 初始化过程中单例还没有准备好，需要显式传递 device
        let gfx_command_pool = GfxCommandPool::new_internal(
            gfx_core.gfx_device.clone(),
            gfx_core.physical_device.gfx_queue_family.clone(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            "gfx-temp-graphics",
        )?;

        let allocator = GfxMemAllocator::new(
            &gfx_core.instance.ash_instance,
            gfx_core.physical_device.vk_handle,
            &gfx_core.gfx_device,
        )?;

        Ok(Self {
            gfx_core,
            vm_allocator: allocator,
            temp_graphics_command_pool: gfx_command_pool,
        })
    }
}

// 此静态变量仅用于单线程环境
static mut G_GFX: Option<Gfx> = None;

// 单例模式
// - Gfx 自身的生命周期管理比较简单，因此适合使用单例模式
// - 让代码变得简单，不再需要考虑复杂的借用规则
// - 其他类的类型签名也会变得更简单
impl Gfx {
    /// 获取单例实例
    ///
    /// # Panics
    /// 如果 Gfx 还未初始化，此方法会 panic
    #[inline]
    pub fn get() -> &'static Gfx {
        unsafe {
            // 使用 addr_of! 避免直接对 static mut 创建引用，编译器不允许这种行为
            let ptr = std::ptr::addr_of!(G_GFX);
            (*ptr).as_ref().expect("Gfx not initialized. Call Gfx::init() first.")
        }
    }

    /// 初始化 Gfx 单例
    ///
    /// # Parameters
    /// - `app_name`: 应用程序名称
    /// - `instance_extra_exts`: 额外的 Vulkan 实例扩展，例如 surface 相关的
    /// - `enable_validation`: 是否启用 validation layer 以及 debug messenger
    pub fn init(app_name: &str, instance_extra_exts: &[&'static CStr], enable_validation: bool) -> anyhow::Result<()> {
        let gfx = Self::new(app_name, instance_extra_exts, enable_validation)?;
        unsafe {
            // 使用 addr_of_mut! 避免直接对 static mut 创建可变引用
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            anyhow::ensure!((*ptr).is_none(), "Gfx already initialized");
            *ptr = Some(gfx);
        }
        Ok(())
    }

    /// 销毁 Gfx 单例
    ///
    /// 调用此方法后，不应再使用 Gfx::get()
    pub fn destroy() {
        unsafe {
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            let Some(gfx) = (*ptr).take() else {
                log::warn!("Gfx is not initialized, skip destroy");
                return;
            };

            gfx.vm_allocator.destroy();
            gfx.temp_graphics_command_pool.destroy_internal(&gfx.gfx_core.gfx_device);
            gfx.gfx_core.destroy();
        }
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.gfx_core.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.gfx_core.instance
    }

    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_core.gfx_device
    }

    #[inline]
    pub fn allocator(&self) -> &GfxMemAllocator {
        &self.vm_allocator
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.gfx_core.physical_device
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> GfxQueueFamily {
        self.gfx_core.physical_device.gfx_queue_family.clone()
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_core.gfx_queue
    }

    /// 是否可以使用光追
    #[inline]
    pub fn rt_supported(&self) -> bool {
        self.gfx_core.physical_device.rt_supported && self.gfx_core.gfx_device.rt_enabled()
    }

    /// 当 uniform buffer 的 descriptor 在更新时，其 offset 必须是这个值的整数倍
    ///
    /// 注：这个值一定是 power of 2
    #[inline]
    pub fn min_ubo_offset_align(&self) -> vk::DeviceSize {
        self.gfx_core.physical_device.basic_props.limits.min_uniform_buffer_offset_alignment
    }

    /// timestamp query 的单位：纳秒 / tick
    #[inline]
    pub fn timestamp_period(&self) -> f32 {
        self.gfx_core.physical_device.basic_props.limits.timestamp_period
    }

    #[inline]
    pub fn rt_pipeline_props(&self) -> &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'_> {
        &self.gfx_core.physical_device.rt_pipeline_props
    }

    #[inline]
    pub fn acc_struct_props(&self) -> &vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'_> {
        &self.gfx_core.physical_device.acc_struct_props
    }
}

// tools
impl Gfx {
    /// 从 candidates 中筛选出支持给定 features 的格式，保持原有的优先顺序
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Vec<vk::Format> {
        candidates
            .iter()
            .filter(|f| {
                let props = unsafe {
                    self.instance()
                        .ash_instance
                        .get_physical_device_format_properties(self.physical_device().vk_handle, **f)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                    _ => false,
                }
            })
            .copied()
            .collect()
    }

    /// 立即执行某个 command，并同步等待执行结果
    pub fn one_time_exec<F, R>(&self, func: F, name: impl AsRef<str>) -> anyhow::Result<R>
    where
        F: FnOnce(&GfxCommandBuffer) -> R,
    {
        let command_buffer =
            GfxCommandBuffer::new(&self.temp_graphics_command_pool, &format!("one-time-{}", name.as_ref()))?;

        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name.as_ref())?;
        let result = func(&command_buffer);
        command_buffer.end()?;

        let submit_result = self
            .gfx_queue()
            .submit(vec![GfxSubmitInfo::new(std::slice::from_ref(&command_buffer))], None)
            .and_then(|_| self.gfx_queue().wait_idle());
        self.temp_graphics_command_pool.free_command_buffers(vec![command_buffer]);
        submit_result.with_context(|| format!("one time exec: {}", name.as_ref()))?;

        Ok(result)
    }

    pub fn wait_idle(&self) -> anyhow::Result<()> {
        self.gfx_device().wait_idle()
    }
}
