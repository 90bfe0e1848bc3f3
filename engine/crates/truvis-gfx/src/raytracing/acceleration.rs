//! Ray Tracing 所需的加速结构

use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx, resources::buffer::GfxBuffer};

/// 加速结构以及承载它的 buffer
pub struct GfxAcceleration {
    acceleration_structure: vk::AccelerationStructureKHR,
    buffer: GfxBuffer,
    device_address: vk::DeviceAddress,
}
impl DebugType for GfxAcceleration {
    fn debug_type_name() -> &'static str {
        "GfxAcceleration"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.acceleration_structure
    }
}
// new & init
impl GfxAcceleration {
    /// 创建 AccelerationStructure 以及 buffer，此时内容尚未构建
    pub fn new(size: vk::DeviceSize, ty: vk::AccelerationStructureTypeKHR, debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        let buffer = GfxBuffer::new(
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(256),
            false,
            format!("{}-buffer", debug_name.as_ref()),
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default() //
            .ty(ty)
            .size(size)
            .buffer(buffer.vk_buffer());

        let gfx_device = Gfx::get().gfx_device();
        let acceleration_structure =
            unsafe { gfx_device.acceleration_structure().create_acceleration_structure(&create_info, None) }
                .with_context(|| format!("create acceleration structure: {}", debug_name.as_ref()))?;

        let device_address = unsafe {
            gfx_device.acceleration_structure().get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(acceleration_structure),
            )
        };

        let acc = Self {
            acceleration_structure,
            buffer,
            device_address,
        };
        gfx_device.set_debug_name(&acc, debug_name);
        Ok(acc)
    }
}
// getters
impl GfxAcceleration {
    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.acceleration_structure
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// 承载加速结构的 buffer，用于 buffer barrier
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer.vk_buffer()
    }
}
// tools
impl GfxAcceleration {
    /// 查询构建加速结构所需的尺寸
    ///
    /// - max_primitives: 每一个 geometry 里面的最大 primitive 数量
    pub fn build_sizes(
        build_geometry_info: &vk::AccelerationStructureBuildGeometryInfoKHR,
        max_primitives: &[u32],
    ) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
        let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            Gfx::get().gfx_device().acceleration_structure().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                build_geometry_info,
                max_primitives,
                &mut size_info,
            );
        }
        size_info
    }
}
// destroy
impl GfxAcceleration {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
impl Drop for GfxAcceleration {
    fn drop(&mut self) {
        unsafe {
            Gfx::get()
                .gfx_device()
                .acceleration_structure()
                .destroy_acceleration_structure(self.acceleration_structure, None);
        }
    }
}
