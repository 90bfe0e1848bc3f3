use anyhow::Context;
use ash::vk::{self, Handle};
use vk_mem::Alloc;

use crate::{
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

/// 完整 mip chain 的层数：floor(log2(max(w, h))) + 1
#[inline]
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    u32::BITS - max_dim.leading_zeros()
}

/// 纹理的读取者：raster 的 fragment shader，以及开启 ray tracing 时的 closest hit
#[inline]
pub fn texture_consumer_stages(rt_supported: bool) -> vk::PipelineStageFlags2 {
    if rt_supported {
        vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR
    } else {
        vk::PipelineStageFlags2::FRAGMENT_SHADER
    }
}

/// 将单个 mip level 从 transfer 布局转为 shader 采样布局
fn mip_to_shader_read(
    image: vk::Image,
    level: u32,
    old_layout: vk::ImageLayout,
    src_access: vk::AccessFlags2,
    consumer_stages: vk::PipelineStageFlags2,
) -> GfxImageBarrier {
    GfxImageBarrier::new()
        .image(image)
        .mip_range(level, 1)
        .src_mask(vk::PipelineStageFlags2::TRANSFER, src_access)
        .dst_mask(consumer_stages, vk::AccessFlags2::SHADER_SAMPLED_READ)
        .layout_transfer(old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .image_aspect_flag(vk::ImageAspectFlags::COLOR)
}

/// 第 level 层 mip 的尺寸，每一维至少为 1
#[inline]
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

pub struct GfxImage {
    handle: vk::Image,
    allocation: Option<vk_mem::Allocation>,

    extent: vk::Extent3D,
    format: vk::Format,
    mip_levels: u32,

    name: String,
}
// getters
impl GfxImage {
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}
// new & init
impl GfxImage {
    pub fn new(
        image_info: &GfxImageCreateInfo,
        alloc_info: &vk_mem::AllocationCreateInfo,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let allocator = Gfx::get().allocator();
        let gfx_device = Gfx::get().gfx_device();
        let (image, alloc) = unsafe { allocator.create_image(&image_info.inner, alloc_info) }
            .with_context(|| format!("create image: {}", debug_name))?;
        let image = Self {
            handle: image,
            allocation: Some(alloc),
            extent: image_info.inner.extent,
            format: image_info.inner.format,
            mip_levels: image_info.inner.mip_levels,

            name: debug_name.to_string(),
        };
        gfx_device.set_debug_name(&image, debug_name);
        Ok(image)
    }

    /// 根据 RGBA8_UNORM 的 data 创建 image，并通过 blit 生成完整的 mip chain
    ///
    /// 执行完毕后，所有 mip level 都处于 SHADER_READ_ONLY_OPTIMAL
    pub fn from_rgba8_mipmapped(width: u32, height: u32, data: &[u8], name: impl AsRef<str>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            data.len() == width as usize * height as usize * 4,
            "texture {} data size mismatch: {} bytes for {}x{} rgba8",
            name.as_ref(),
            data.len(),
            width,
            height
        );

        let mip_levels = mip_level_count(width, height);
        let image_create_info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width, height },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
        .mip_levels(mip_levels);
        let image = Self::new(
            &image_create_info,
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            name.as_ref(),
        )?;

        let stage_buffer = GfxBuffer::new_stage_buffer(data.len() as vk::DeviceSize, "image-stage-buffer")?;
        stage_buffer.transfer_data_by_mmap(data)?;

        Gfx::get().one_time_exec(
            |cmd| {
                image.record_upload(cmd, &stage_buffer);
                image.record_generate_mipmaps(cmd);
            },
            name.as_ref(),
        )?;

        Ok(image)
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// destroy
impl GfxImage {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }
    pub fn destroy_mut(&mut self) {
        log::debug!("Destroying GfxImage: {}", self.name);

        if let Some(mut allocation) = self.allocation.take() {
            unsafe { Gfx::get().allocator().destroy_image(self.handle, &mut allocation) }
        }
        self.handle = vk::Image::null();
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage must be destroyed manually: {}", self.name);
    }
}
// tools
impl GfxImage {
    /// 将 stage buffer 的内容拷贝到 mip 0
    ///
    /// 执行后 mip 0 处于 TRANSFER_DST_OPTIMAL，其余 level 处于 UNDEFINED
    fn record_upload(&self, cmd: &GfxCommandBuffer, stage_buffer: &GfxBuffer) {
        let image_barrier = GfxImageBarrier::new()
            .image(self.handle)
            .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image_aspect_flag(vk::ImageAspectFlags::COLOR);
        cmd.image_barriers(std::slice::from_ref(&image_barrier));

        let buffer_image_copy = vk::BufferImageCopy2::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(self.extent)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            });
        cmd.copy_buffer_to_image(
            &vk::CopyBufferToImageInfo2::default()
                .src_buffer(stage_buffer.vk_buffer())
                .dst_image(self.handle)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(std::slice::from_ref(&buffer_image_copy)),
        );
    }

    /// 逐级 blit 生成 mipmap
    ///
    /// 每一级：先把 level-1 转为 TRANSFER_SRC，blit 到 level，再把 level-1 转为 SHADER_READ_ONLY
    fn record_generate_mipmaps(&self, cmd: &GfxCommandBuffer) {
        let (width, height) = (self.width(), self.height());
        let consumer_stages = texture_consumer_stages(Gfx::get().rt_supported());
        for level in 1..self.mip_levels {
            let to_src = GfxImageBarrier::new()
                .image(self.handle)
                .mip_range(level - 1, 1)
                .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .image_aspect_flag(vk::ImageAspectFlags::COLOR);
            let dst_init = GfxImageBarrier::new()
                .image(self.handle)
                .mip_range(level, 1)
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image_aspect_flag(vk::ImageAspectFlags::COLOR);
            cmd.image_barriers(&[to_src, dst_init]);

            let (src_w, src_h) = mip_extent(width, height, level - 1);
            let (dst_w, dst_h) = mip_extent(width, height, level);
            let blit = vk::ImageBlit2::default()
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: src_w as i32,
                        y: src_h as i32,
                        z: 1,
                    },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: dst_w as i32,
                        y: dst_h as i32,
                        z: 1,
                    },
                ]);
            cmd.blit_image(
                &vk::BlitImageInfo2::default()
                    .src_image(self.handle)
                    .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .dst_image(self.handle)
                    .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .regions(std::slice::from_ref(&blit))
                    .filter(vk::Filter::LINEAR),
            );

            let to_read = mip_to_shader_read(
                self.handle,
                level - 1,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags2::TRANSFER_READ,
                consumer_stages,
            );
            cmd.image_barriers(std::slice::from_ref(&to_read));
        }

        // 最后一级只做过 transfer dst
        let last_to_read = mip_to_shader_read(
            self.handle,
            self.mip_levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags2::TRANSFER_WRITE,
            consumer_stages,
        );
        cmd.image_barriers(std::slice::from_ref(&last_to_read));
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
}
impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
        }
    }

    // builder
    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.inner.mip_levels = mip_levels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(1000, 600), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_extent_clamps_to_one() {
        assert_eq!(mip_extent(1024, 512, 0), (1024, 512));
        assert_eq!(mip_extent(1024, 512, 1), (512, 256));
        assert_eq!(mip_extent(1024, 512, 10), (1, 1));
        assert_eq!(mip_extent(300, 7, 3), (37, 1));
    }

    #[test]
    fn test_texture_consumer_stages() {
        assert_eq!(texture_consumer_stages(false), vk::PipelineStageFlags2::FRAGMENT_SHADER);
        let rt = texture_consumer_stages(true);
        assert!(rt.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(rt.contains(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR));
        assert!(!rt.contains(vk::PipelineStageFlags2::VERTEX_SHADER));
        assert!(!rt.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    }

    #[test]
    fn test_mip_to_shader_read_masks() {
        let image = vk::Image::from_raw(0x42);
        let barrier = mip_to_shader_read(
            image,
            3,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags2::TRANSFER_READ,
            texture_consumer_stages(false),
        );
        let inner = barrier.inner();
        assert_eq!(inner.image, image);
        assert_eq!(inner.subresource_range.base_mip_level, 3);
        assert_eq!(inner.subresource_range.level_count, 1);
        assert_eq!(inner.src_stage_mask, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(inner.src_access_mask, vk::AccessFlags2::TRANSFER_READ);
        assert_eq!(inner.dst_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(inner.dst_access_mask, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(inner.old_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(inner.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
