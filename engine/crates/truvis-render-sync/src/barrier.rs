//! Barrier 描述
//!
//! 由 tracker 在状态转换时生成，录制时再和实际的 vk handle 结合成 GfxImageBarrier / GfxBufferBarrier。

use ash::vk;
use truvis_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

use crate::resource_state::{BufferState, ImageState};

const RAY_TRACING_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR.as_raw()
        | vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR.as_raw(),
);

/// 图像 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrierDesc {
    pub src_state: ImageState,
    pub dst_state: ImageState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl ImageBarrierDesc {
    pub fn new(src_state: ImageState, dst_state: ImageState, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            src_state,
            dst_state,
            aspect,
        }
    }

    /// barrier 的任意一侧是否涉及光追阶段
    #[inline]
    pub fn touches_ray_tracing(&self) -> bool {
        self.src_state.stage.intersects(RAY_TRACING_STAGES) || self.dst_state.stage.intersects(RAY_TRACING_STAGES)
    }

    /// 转换为 GfxImageBarrier，需要提供实际的 vk::Image handle
    pub fn to_gfx_barrier(&self, image: vk::Image) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image)
            .layout_transfer(self.src_state.layout, self.dst_state.layout)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
            .image_aspect_flag(self.aspect)
    }
}

/// 缓冲区 Barrier 描述，覆盖整个 buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrierDesc {
    pub src_state: BufferState,
    pub dst_state: BufferState,
}

impl BufferBarrierDesc {
    pub fn new(src_state: BufferState, dst_state: BufferState) -> Self {
        Self { src_state, dst_state }
    }

    #[inline]
    pub fn touches_ray_tracing(&self) -> bool {
        self.src_state.stage.intersects(RAY_TRACING_STAGES) || self.dst_state.stage.intersects(RAY_TRACING_STAGES)
    }

    pub fn to_gfx_barrier(&self, buffer: vk::Buffer) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer, 0, vk::WHOLE_SIZE)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
    }
}

/// 根据 format 推断图像的 aspect flags
pub fn infer_image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }

        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }

        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_barrier_masks() {
        let desc = ImageBarrierDesc::new(
            ImageState::STORAGE_WRITE_RAY_TRACING,
            ImageState::COLOR_ATTACHMENT_READ_WRITE,
            vk::ImageAspectFlags::COLOR,
        );
        let barrier = desc.to_gfx_barrier(vk::Image::null());
        let inner = barrier.inner();
        assert_eq!(inner.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(inner.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(inner.src_stage_mask, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
        assert_eq!(inner.src_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(inner.dst_access_mask, ImageState::COLOR_ATTACHMENT_READ_WRITE.access);
        assert!(desc.touches_ray_tracing());
    }

    #[test]
    fn test_raster_barrier_is_not_ray_tracing() {
        let desc = ImageBarrierDesc::new(
            ImageState::COLOR_ATTACHMENT_WRITE,
            ImageState::SHADER_READ_COMPUTE,
            vk::ImageAspectFlags::COLOR,
        );
        assert!(!desc.touches_ray_tracing());
    }

    #[test]
    fn test_infer_aspect() {
        assert_eq!(infer_image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            infer_image_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(infer_image_aspect(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
    }
}
