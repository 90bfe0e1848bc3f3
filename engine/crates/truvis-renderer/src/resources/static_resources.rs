//! 启动时创建一次、退出时销毁一次的资源：网格 buffer、纹理、采样器、scene uniform

use ash::vk;
use truvis_gfx::{
    descriptors::sampler::{GfxSampler, GfxSamplerCreateInfo},
    gfx::Gfx,
    resources::{
        buffer::GfxBuffer,
        image::GfxImage,
        image_view::{GfxImageView, GfxImageViewDesc},
        layout::MeshVertex,
    },
};

use crate::{
    raytracing::{acceleration_builder::AccelerationGeometry, sbt_layout::round_up},
    settings::{DefaultRendererSettings, FrameLabel},
};

/// 外部加载好的网格数据：u32 索引的三角形列表
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

/// 外部解码好的 RGBA8 像素
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// 每帧更新的场景数据，raster 与 ray tracing 共用
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    pub model_view_proj: glam::Mat4,
    pub model: glam::Mat4,
    /// 3x4 row-major，每一行是一个 Vec4
    pub camera_to_world: [glam::Vec4; 3],
    /// x: tan(fov_y / 2) * aspect; y: tan(fov_y / 2); z: near; w: far
    pub projection_params: glam::Vec4,
}

/// 所有 frame slot 共享一个 host 可见的 buffer，通过 dynamic offset 区分
pub struct SceneUniformBuffer {
    buffer: GfxBuffer,
    /// 每个 slot 的大小，按照 minUniformBufferOffsetAlignment 对齐
    slot_stride: vk::DeviceSize,
}
impl SceneUniformBuffer {
    pub fn new() -> anyhow::Result<Self> {
        let slot_stride = Self::slot_stride(Gfx::get().min_ubo_offset_align());
        let buffer = GfxBuffer::new(
            slot_stride * DefaultRendererSettings::FRAMES_IN_FLIGHT as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            None,
            true,
            "scene-uniforms",
        )?;
        Ok(Self { buffer, slot_stride })
    }

    #[inline]
    pub fn slot_stride(min_ubo_offset_align: vk::DeviceSize) -> vk::DeviceSize {
        round_up(size_of::<SceneUniforms>() as vk::DeviceSize, min_ubo_offset_align)
    }

    /// bind descriptor set 时使用的 dynamic offset
    #[inline]
    pub fn dynamic_offset(&self, frame_label: FrameLabel) -> u32 {
        (self.slot_stride * *frame_label as vk::DeviceSize) as u32
    }

    pub fn write(&self, frame_label: FrameLabel, uniforms: &SceneUniforms) -> anyhow::Result<()> {
        self.buffer.write_by_mmap(self.dynamic_offset(frame_label) as vk::DeviceSize, std::slice::from_ref(uniforms))
    }

    /// UNIFORM_BUFFER_DYNAMIC 的 descriptor，range 为单个 slot
    #[inline]
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer.vk_buffer())
            .offset(0)
            .range(size_of::<SceneUniforms>() as vk::DeviceSize)
    }
}

pub struct StaticResources {
    vertex_buffer: GfxBuffer,
    index_buffer: GfxBuffer,
    vertex_count: u32,
    index_count: u32,

    texture: GfxImage,
    texture_view: GfxImageView,
    sampler: GfxSampler,

    scene_uniforms: SceneUniformBuffer,
}

// new & init
impl StaticResources {
    pub fn new(mesh: &MeshData, texture: &TextureData) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("StaticResources::new");
        anyhow::ensure!(!mesh.vertices.is_empty(), "mesh has no vertices");
        anyhow::ensure!(
            !mesh.indices.is_empty() && mesh.indices.len() % 3 == 0,
            "mesh index count {} is not a triangle list",
            mesh.indices.len()
        );

        // ray tracing 需要通过 device address 读取，并且作为 storage buffer 在 closest hit 中访问
        let rt_usage = if Gfx::get().rt_supported() {
            vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::STORAGE_BUFFER
        } else {
            vk::BufferUsageFlags::empty()
        };

        let vertex_buffer = GfxBuffer::new(
            size_of_val(mesh.vertices.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | rt_usage,
            None,
            false,
            "mesh-vertex-buffer",
        )?;
        vertex_buffer.transfer_data_sync(&mesh.vertices)?;

        let index_buffer = GfxBuffer::new(
            size_of_val(mesh.indices.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | rt_usage,
            None,
            false,
            "mesh-index-buffer",
        )?;
        index_buffer.transfer_data_sync(&mesh.indices)?;

        let texture_image = GfxImage::from_rgba8_mipmapped(texture.width, texture.height, &texture.rgba, "diffuse")?;
        let texture_view = GfxImageView::new(
            texture_image.handle(),
            GfxImageViewDesc::new_2d(texture_image.format(), vk::ImageAspectFlags::COLOR)
                .mip_levels(texture_image.mip_levels()),
            "diffuse",
        )?;
        let sampler = GfxSampler::new(
            &GfxSamplerCreateInfo::new().max_lod(DefaultRendererSettings::TEXTURE_MAX_LOD),
            "diffuse-sampler",
        )?;

        log::info!(
            "static resources: {} vertices, {} triangles, texture {}x{} ({} mips)",
            mesh.vertices.len(),
            mesh.indices.len() / 3,
            texture.width,
            texture.height,
            texture_image.mip_levels()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
            texture: texture_image,
            texture_view,
            sampler,
            scene_uniforms: SceneUniformBuffer::new()?,
        })
    }
}

// getters
impl StaticResources {
    #[inline]
    pub fn vertex_buffer(&self) -> &GfxBuffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &GfxBuffer {
        &self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn texture_view(&self) -> &GfxImageView {
        &self.texture_view
    }

    #[inline]
    pub fn sampler(&self) -> &GfxSampler {
        &self.sampler
    }

    #[inline]
    pub fn scene_uniforms(&self) -> &SceneUniformBuffer {
        &self.scene_uniforms
    }

    /// 构建 BLAS 所需的几何信息
    pub fn acceleration_geometry(&self) -> AccelerationGeometry {
        AccelerationGeometry {
            vertex_address: self.vertex_buffer.device_address(),
            vertex_stride: size_of::<MeshVertex>() as vk::DeviceSize,
            vertex_count: self.vertex_count,
            index_address: self.index_buffer.device_address(),
            triangle_count: self.index_count / 3,
        }
    }
}

// destroy
impl StaticResources {
    pub fn destroy(self) {
        let Self {
            vertex_buffer,
            index_buffer,
            texture,
            texture_view,
            sampler,
            scene_uniforms,
            ..
        } = self;

        texture_view.destroy();
        texture.destroy();
        sampler.destroy();
        vertex_buffer.destroy();
        index_buffer.destroy();
        scene_uniforms.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_uniforms_layout() {
        // std140：两个 mat4 + 三个 vec4 + 一个 vec4
        assert_eq!(size_of::<SceneUniforms>(), 64 + 64 + 48 + 16);
    }

    #[test]
    fn test_uniform_slot_stride_respects_alignment() {
        assert_eq!(SceneUniformBuffer::slot_stride(64), 192);
        assert_eq!(SceneUniformBuffer::slot_stride(256), 256);
        assert_eq!(SceneUniformBuffer::slot_stride(16), 192);
    }
}
