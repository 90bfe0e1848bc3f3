//! Shader Binding Table 的布局
//!
//! 只有三个 shader group：`[raygen][miss][closest-hit]`，每个 region 只放一个 handle，
//! 不携带 user data。

use anyhow::Context;
use ash::vk;
use truvis_gfx::{gfx::Gfx, pipelines::rt_pipeline::GfxRtPipeline, resources::buffer::GfxBuffer};

/// 向上对齐，`align` 需要是 power of 2
#[inline]
pub fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two(), "alignment {} is not power of 2", align);
    (value + align - 1) & !(align - 1)
}

/// SBT 中三个 region 的偏移，单位为字节
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SbtLayout {
    pub handle_size: u64,
    pub raygen_offset: u64,
    pub miss_offset: u64,
    pub hit_offset: u64,
}

impl SbtLayout {
    pub const RAYGEN_GROUP: usize = 0;
    pub const MISS_GROUP: usize = 1;
    pub const HIT_GROUP: usize = 2;
    pub const GROUP_COUNT: usize = 3;

    /// - handle_size: `shaderGroupHandleSize`
    /// - base_alignment: `shaderGroupBaseAlignment`
    pub fn new(handle_size: u32, base_alignment: u32) -> Self {
        let handle_size = handle_size as u64;
        let base_alignment = base_alignment as u64;

        let raygen_offset = 0;
        let miss_offset = round_up(handle_size, base_alignment);
        let hit_offset = round_up(miss_offset + handle_size, base_alignment);

        Self {
            handle_size,
            raygen_offset,
            miss_offset,
            hit_offset,
        }
    }

    /// 整个 SBT buffer 的大小
    #[inline]
    pub fn buffer_size(&self) -> u64 {
        self.hit_offset + self.handle_size
    }

    /// 每个 group 在 SBT 中的起始位置，按 group 的顺序
    #[inline]
    pub fn group_offsets(&self) -> [u64; Self::GROUP_COUNT] {
        [self.raygen_offset, self.miss_offset, self.hit_offset]
    }

    /// 将紧密排列的 group handles 按照布局写入 dst
    pub fn scatter_handles(&self, handles: &[u8], dst: &mut [u8]) -> anyhow::Result<()> {
        let handle_size = self.handle_size as usize;
        anyhow::ensure!(
            handles.len() >= handle_size * Self::GROUP_COUNT,
            "expect {} shader group handles, got {} bytes",
            Self::GROUP_COUNT,
            handles.len()
        );
        anyhow::ensure!(dst.len() as u64 >= self.buffer_size(), "sbt buffer too small");

        for (group_idx, offset) in self.group_offsets().into_iter().enumerate() {
            let src = &handles[group_idx * handle_size..(group_idx + 1) * handle_size];
            let offset = offset as usize;
            dst[offset..offset + handle_size].copy_from_slice(src);
        }
        Ok(())
    }

    /// raygen region 的 stride 必须和 size 相同；这里三个 region 都是 stride = size = handle size
    fn region(&self, sbt_address: vk::DeviceAddress, offset: u64) -> vk::StridedDeviceAddressRegionKHR {
        vk::StridedDeviceAddressRegionKHR::default()
            .device_address(sbt_address + offset)
            .stride(self.handle_size)
            .size(self.handle_size)
    }
}

/// SBT buffer 以及 trace rays 所需的各个 region
///
/// 初始化时创建一次，之后不再重新分配
pub struct SbtRegions {
    layout: SbtLayout,

    raygen: vk::StridedDeviceAddressRegionKHR,
    miss: vk::StridedDeviceAddressRegionKHR,
    hit: vk::StridedDeviceAddressRegionKHR,
    callable: vk::StridedDeviceAddressRegionKHR,

    _sbt_buffer: GfxBuffer,
}

// new & init
impl SbtRegions {
    pub fn new(pipeline: &GfxRtPipeline) -> anyhow::Result<Self> {
        let rt_props = Gfx::get().rt_pipeline_props();
        let layout = SbtLayout::new(rt_props.shader_group_handle_size, rt_props.shader_group_base_alignment);
        log::info!(
            "sbt layout: handle size {}, raygen {}, miss {}, hit {}",
            layout.handle_size,
            layout.raygen_offset,
            layout.miss_offset,
            layout.hit_offset
        );

        let sbt_buffer = GfxBuffer::new(
            layout.buffer_size(),
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(rt_props.shader_group_base_alignment as vk::DeviceSize),
            true,
            "rt-sbt",
        )?;

        // 从 pipeline 中获取 shader group handle，并写入到 SBT 中
        let handles = pipeline.shader_group_handles(rt_props.shader_group_handle_size)?;
        let mapped_ptr = sbt_buffer.mapped_ptr().context("sbt buffer is not mapped")?;
        let dst = unsafe { std::slice::from_raw_parts_mut(mapped_ptr, layout.buffer_size() as usize) };
        layout.scatter_handles(&handles, dst)?;
        sbt_buffer.flush(0, layout.buffer_size())?;

        let sbt_address = sbt_buffer.device_address();
        Ok(Self {
            layout,
            raygen: layout.region(sbt_address, layout.raygen_offset),
            miss: layout.region(sbt_address, layout.miss_offset),
            hit: layout.region(sbt_address, layout.hit_offset),
            callable: vk::StridedDeviceAddressRegionKHR::default(),
            _sbt_buffer: sbt_buffer,
        })
    }
}

// getters
impl SbtRegions {
    #[inline]
    pub fn layout(&self) -> &SbtLayout {
        &self.layout
    }

    #[inline]
    pub fn raygen(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.raygen
    }

    #[inline]
    pub fn miss(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.miss
    }

    #[inline]
    pub fn hit(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.hit
    }

    #[inline]
    pub fn callable(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.callable
    }
}

// destroy
impl SbtRegions {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 64), 0);
        assert_eq!(round_up(1, 64), 64);
        assert_eq!(round_up(64, 64), 64);
        assert_eq!(round_up(65, 64), 128);
    }

    #[test]
    fn test_sbt_offsets_are_ordered_and_aligned() {
        for align_shift in 0..=10 {
            let base_alignment = 1u32 << align_shift;
            for handle_size in 1..=base_alignment.min(128) {
                let layout = SbtLayout::new(handle_size, base_alignment);
                let align = base_alignment as u64;
                let handle = handle_size as u64;

                assert_eq!(layout.raygen_offset, 0);
                assert!(layout.raygen_offset < layout.miss_offset);
                assert!(layout.miss_offset < layout.hit_offset);
                assert_eq!(layout.miss_offset % align, 0);
                assert_eq!(layout.hit_offset % align, 0);
                assert!(layout.miss_offset - layout.raygen_offset >= handle);
                assert!(layout.hit_offset - layout.miss_offset >= handle);
            }
        }
    }

    #[test]
    fn test_common_device_layout() {
        // 常见桌面 GPU：handle 32 字节，base alignment 64 字节
        let layout = SbtLayout::new(32, 64);
        assert_eq!(layout.group_offsets(), [0, 64, 128]);
        assert_eq!(layout.buffer_size(), 160);

        let region = layout.region(0x1000, layout.miss_offset);
        assert_eq!(region.device_address, 0x1040);
        assert_eq!(region.stride, 32);
        assert_eq!(region.size, 32);
    }

    #[test]
    fn test_scatter_handles() {
        let layout = SbtLayout::new(4, 8);
        let handles: Vec<u8> = (0..12).collect();
        let mut dst = vec![0xAA_u8; layout.buffer_size() as usize];
        layout.scatter_handles(&handles, &mut dst).unwrap();

        assert_eq!(&dst[0..4], &[0, 1, 2, 3]);
        assert_eq!(&dst[8..12], &[4, 5, 6, 7]);
        assert_eq!(&dst[16..20], &[8, 9, 10, 11]);
        // padding 不被改写
        assert_eq!(&dst[4..8], &[0xAA; 4]);
    }

    #[test]
    fn test_scatter_handles_rejects_short_input() {
        let layout = SbtLayout::new(4, 8);
        let mut dst = vec![0_u8; layout.buffer_size() as usize];
        assert!(layout.scatter_handles(&[0; 8], &mut dst).is_err());
    }
}
