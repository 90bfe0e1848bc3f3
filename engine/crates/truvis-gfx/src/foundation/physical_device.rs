use std::{ffi::CStr, ptr::null_mut};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{commands::command_queue::GfxQueueFamily, foundation::debug_messenger::DebugType};

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// 当前 gpu 的 ray tracing 属性，只有 rt_supported 时才有意义
    pub(crate) rt_pipeline_props: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>,

    /// 当前 gpu 的加速结构属性，只有 rt_supported 时才有意义
    pub(crate) acc_struct_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,

    /// 是否支持 KHR ray tracing pipeline + acceleration structure
    pub(crate) rt_supported: bool,

    pub(crate) gfx_queue_family: GfxQueueFamily,
}

// new & init
impl GfxPhysicalDevice {
    /// 光追需要的 device extensions
    pub const RT_DEVICE_EXTS: [&'static CStr; 3] = [
        ash::khr::acceleration_structure::NAME,
        ash::khr::ray_tracing_pipeline::NAME,
        ash::khr::deferred_host_operations::NAME,
    ];

    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn new_descrete_physical_device(instance: &ash::Instance) -> anyhow::Result<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.context("failed to enumerate gpus")?;
        let candidates = pdevices
            .iter()
            .filter_map(|pdevice| match Self::new(*pdevice, instance) {
                Ok(pdevice) => Some(pdevice),
                Err(e) => {
                    log::warn!("skip gpu: {:#}", e);
                    None
                }
            })
            .collect_vec();

        let mut candidates = candidates.into_iter();
        let mut first = None;
        for candidate in candidates.by_ref() {
            if candidate.is_descrete_gpu() {
                return Ok(candidate);
            }
            if first.is_none() {
                first = Some(candidate);
            }
        }
        first.context("no vulkan gpu with a graphics + compute queue is available")
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> anyhow::Result<Self> {
        unsafe {
            // 找到当前 gpu 支持的 extensions
            let device_extensions = instance.enumerate_device_extension_properties(pdevice)?;
            let has_ext = |name: &CStr| device_extensions.iter().any(|ext| ext.extension_name_as_c_str() == Ok(name));
            let rt_exts_supported = Self::RT_DEVICE_EXTS.iter().all(|ext| has_ext(ext));
            log::debug!(
                "physical device supports extensions: {}",
                device_extensions
                    .iter()
                    .filter_map(|ext| ext.extension_name_as_c_str().ok())
                    .map(|name| name.to_string_lossy())
                    .join("\n")
            );

            let mut rt_props = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
            let mut acc_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
            let basic_props = {
                let mut pdevice_props2 = vk::PhysicalDeviceProperties2::default();
                if rt_exts_supported {
                    pdevice_props2 = pdevice_props2.push_next(&mut rt_props).push_next(&mut acc_props);
                }
                instance.get_physical_device_properties2(pdevice, &mut pdevice_props2);
                pdevice_props2.properties
            };
            rt_props.p_next = null_mut();
            acc_props.p_next = null_mut();
            // dynamic rendering 与 synchronization2 通过 1.3 的 feature 结构体开启
            anyhow::ensure!(
                basic_props.api_version >= vk::API_VERSION_1_3,
                "vulkan {}.{} is too old, 1.3 is required",
                vk::api_version_major(basic_props.api_version),
                vk::api_version_minor(basic_props.api_version)
            );

            // 扩展存在时，还需要确认 feature 本身可用
            let rt_supported = rt_exts_supported && {
                let mut acc_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
                let mut rt_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
                let mut bda_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
                {
                    let mut features2 = vk::PhysicalDeviceFeatures2::default()
                        .push_next(&mut acc_features)
                        .push_next(&mut rt_features)
                        .push_next(&mut bda_features);
                    instance.get_physical_device_features2(pdevice, &mut features2);
                }
                acc_features.acceleration_structure == vk::TRUE
                    && rt_features.ray_tracing_pipeline == vk::TRUE
                    && bda_features.buffer_device_address == vk::TRUE
            };

            // 找到所有的队列信息
            let queue_familiy_props = instance.get_physical_device_queue_family_properties(pdevice);
            log::debug!("physical device: queue family props:\n{:#?}", queue_familiy_props);

            // 全能的 Queue：graphics, compute, transfer
            let gfx_queue_family = queue_familiy_props
                .iter()
                .enumerate()
                .find(|(_, props)| {
                    props.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
                })
                .map(|(family_idx, props)| GfxQueueFamily {
                    name: "gfx".to_string(),
                    queue_family_index: family_idx as u32,
                    queue_flags: props.queue_flags,
                    queue_count: props.queue_count,
                })
                .with_context(|| {
                    format!("gpu {:?} has no graphics + compute queue family", basic_props.device_name_as_c_str())
                })?;

            Ok(Self {
                vk_handle: pdevice,
                basic_props,
                rt_pipeline_props: rt_props,
                acc_struct_props: acc_props,
                rt_supported,
                gfx_queue_family,
            })
        }
    }
}

// destroy
impl GfxPhysicalDevice {
    pub fn destroy(self) {
        // 无需销毁
    }
}

// getters
impl GfxPhysicalDevice {
    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn rt_supported(&self) -> bool {
        self.rt_supported
    }

    #[inline]
    pub fn device_name(&self) -> String {
        self.basic_props.device_name_as_c_str().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

// tools
impl GfxPhysicalDevice {
    /// 设备诊断信息：名称、API 版本以及光追相关属性
    ///
    /// 启动时打印一次，致命错误退出前会再次输出
    pub fn diagnostics(&self) -> String {
        let api_version = self.basic_props.api_version;
        let mut lines = vec![
            format!("Device: {}", self.device_name()),
            format!(
                "Vulkan API version: {}.{}.{}",
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version),
                vk::api_version_patch(api_version)
            ),
            format!("Driver version: {:#x}", self.basic_props.driver_version),
        ];

        if self.rt_supported {
            let rt = &self.rt_pipeline_props;
            let acc = &self.acc_struct_props;
            lines.push("VkPhysicalDeviceRayTracingPipelinePropertiesKHR:".to_string());
            lines.push(format!("  shaderGroupHandleSize = {}", rt.shader_group_handle_size));
            lines.push(format!("  maxRayRecursionDepth = {}", rt.max_ray_recursion_depth));
            lines.push(format!("  maxShaderGroupStride = {}", rt.max_shader_group_stride));
            lines.push(format!("  shaderGroupBaseAlignment = {}", rt.shader_group_base_alignment));
            lines.push("VkPhysicalDeviceAccelerationStructurePropertiesKHR:".to_string());
            lines.push(format!("  maxGeometryCount = {}", acc.max_geometry_count));
            lines.push(format!("  maxInstanceCount = {}", acc.max_instance_count));
            lines.push(format!("  maxPrimitiveCount = {}", acc.max_primitive_count));
            lines.push(format!(
                "  maxDescriptorSetAccelerationStructures = {}",
                acc.max_descriptor_set_acceleration_structures
            ));
            lines.push(format!(
                "  minAccelerationStructureScratchOffsetAlignment = {}",
                acc.min_acceleration_structure_scratch_offset_alignment
            ));
        } else {
            lines.push("Ray tracing: not supported".to_string());
        }

        lines.join("\n")
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
