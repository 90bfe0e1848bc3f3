use std::{
    cell::Cell,
    ffi::{CStr, CString},
    ops::Deref,
};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    descriptors::write_descriptor_set::GfxWriteDescriptorSet,
    foundation::{debug_messenger::DebugType, physical_device::GfxPhysicalDevice},
};

/// 逻辑设备以及扩展的函数表
///
/// 光追扩展只在物理设备支持时启用；未启用时对应的函数表仍然存在，但是不允许调用。
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 动态渲染扩展 API
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    /// 加速结构扩展 API
    pub(crate) acceleration_structure: ash::khr::acceleration_structure::Device,
    /// 光线追踪管线扩展 API
    pub(crate) ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
    /// 调试工具扩展 API
    pub(crate) debug_utils: ash::ext::debug_utils::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: ash::khr::swapchain::Device,

    /// 创建 device 时是否启用了光追扩展
    rt_enabled: bool,

    #[cfg(debug_assertions)]
    destroyed: Cell<bool>,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        queue_create_info: &[vk::DeviceQueueCreateInfo],
        enable_rt: bool,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        let device_exts = Self::device_exts(enable_rt);
        log::info!("device exts: {}", device_exts.iter().map(|e| format!("{:?}", e)).join(", "));
        let device_ext_ptrs = device_exts.iter().map(|e| e.as_ptr()).collect_vec();

        let mut core_features = vk::PhysicalDeviceFeatures2::default().features(Self::core_features());
        let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true);
        let mut vulkan13_features =
            vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true).synchronization2(true);
        let mut rt_pipeline_features =
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);
        let mut acceleration_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);

        let mut device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_info)
            .enabled_extension_names(&device_ext_ptrs)
            .push_next(&mut core_features)
            .push_next(&mut vulkan12_features)
            .push_next(&mut vulkan13_features);
        if enable_rt {
            device_create_info =
                device_create_info.push_next(&mut rt_pipeline_features).push_next(&mut acceleration_features);
        }

        let device = unsafe { instance.create_device(pdevice, &device_create_info, None) }
            .context("failed to create logical device")?;

        let vk_dynamic_render_pf = ash::khr::dynamic_rendering::Device::new(instance, &device);
        let vk_acceleration_struct_pf = ash::khr::acceleration_structure::Device::new(instance, &device);
        let vk_rt_pipeline_pf = ash::khr::ray_tracing_pipeline::Device::new(instance, &device);
        let vk_debug_utils_device = ash::ext::debug_utils::Device::new(instance, &device);
        let vk_swapchain = ash::khr::swapchain::Device::new(instance, &device);

        Ok(Self {
            device,
            dynamic_rendering: vk_dynamic_render_pf,
            acceleration_structure: vk_acceleration_struct_pf,
            ray_tracing_pipeline: vk_rt_pipeline_pf,
            debug_utils: vk_debug_utils_device,
            swapchain: vk_swapchain,
            rt_enabled: enable_rt,

            #[cfg(debug_assertions)]
            destroyed: Cell::new(false),
        })
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(&self) {
        log::info!("destroying device");

        #[cfg(debug_assertions)]
        self.destroyed.set(true);

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// 创建过程的辅助函数
impl GfxDevice {
    fn core_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            // 用于 buffer device address
            .shader_int64(true)
            // present copy 写入的 swapchain image 格式不固定（BGRA / RGBA）
            .shader_storage_image_write_without_format(true)
    }

    /// 必要的 device extensions
    ///
    /// buffer device address / spirv 1.4 / float controls 已经提升到 core 1.2
    fn device_exts(enable_rt: bool) -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];
        if enable_rt {
            exts.extend(GfxPhysicalDevice::RT_DEVICE_EXTS);
        }
        exts
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn rt_enabled(&self) -> bool {
        self.rt_enabled
    }
    #[inline]
    pub fn dynamic_rendering(&self) -> &ash::khr::dynamic_rendering::Device {
        &self.dynamic_rendering
    }
    #[inline]
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        debug_assert!(self.rt_enabled, "acceleration structure ext is not enabled");
        &self.acceleration_structure
    }
    #[inline]
    pub fn ray_tracing_pipeline(&self) -> &ash::khr::ray_tracing_pipeline::Device {
        debug_assert!(self.rt_enabled, "ray tracing pipeline ext is not enabled");
        &self.ray_tracing_pipeline
    }
    #[inline]
    pub fn debug_utils(&self) -> &ash::ext::debug_utils::Device {
        &self.debug_utils
    }
    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }
}

// tools
impl GfxDevice {
    #[inline]
    pub fn write_descriptor_sets(&self, writes: &[GfxWriteDescriptorSet]) {
        GfxWriteDescriptorSet::with_writes(writes, |writes| unsafe {
            self.device.update_descriptor_sets(writes, &[]);
        })
    }

    /// debug name 只用于调试工具，设置失败不影响运行
    #[inline]
    pub fn set_object_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: impl AsRef<str>) {
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        unsafe {
            if let Err(e) = self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            ) {
                log::warn!("failed to set debug name {:?}: {:?}", name, e);
            }
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        let debug_name = format!("{}::{}", T::debug_type_name(), name.as_ref());
        let Ok(debug_name) = CString::new(debug_name) else {
            return;
        };
        unsafe {
            if let Err(e) = self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default()
                    .object_name(debug_name.as_c_str())
                    .object_handle(handle.vk_handle()),
            ) {
                log::warn!("failed to set debug name {:?}: {:?}", debug_name, e);
            }
        }
    }

    #[inline]
    pub fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe { self.device.device_wait_idle() }.context("device wait idle")
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed.get(), "GfxDevice must be destroyed before being dropped.");
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rt_exts_only_when_enabled() {
        let base = GfxDevice::device_exts(false);
        assert_eq!(base, vec![ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME]);

        let rt = GfxDevice::device_exts(true);
        assert!(rt.contains(&ash::khr::ray_tracing_pipeline::NAME));
        assert!(rt.contains(&ash::khr::acceleration_structure::NAME));
        assert!(rt.contains(&ash::khr::deferred_host_operations::NAME));
    }

    #[test]
    fn test_core_features_allow_formatless_storage_write() {
        let features = GfxDevice::core_features();
        assert_eq!(features.shader_storage_image_write_without_format, vk::TRUE);
        assert_eq!(features.shader_int64, vk::TRUE);
    }
}
