use std::ffi::CString;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    basic::color::LabelColor,
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        command_pool::GfxCommandPool,
    },
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    query::query_pool::GfxQueryPool,
    resources::{buffer::GfxBuffer, layout::GfxIndexType},
};

/// primary command buffer，由所属的 [`GfxCommandPool`] 统一回收
///
/// 所有的 pass 都只绑定 set 0、vertex binding 0、单个 viewport/scissor，
/// 录制接口按照这个用法做了收窄。
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(command_pool: &GfxCommandPool, debug_name: &str) -> anyhow::Result<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let vk_handle = unsafe { Gfx::get().gfx_device().allocate_command_buffers(&info) }
            .with_context(|| format!("allocate command buffer: {}", debug_name))?
            .into_iter()
            .next()
            .context("driver returned no command buffer")?;

        let cmd = Self { vk_handle };
        Gfx::get().gfx_device().set_debug_name(&cmd, debug_name);
        Ok(cmd)
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}

// 录制的开始与结束
impl GfxCommandBuffer {
    /// 开始录制，并且用 `label` 包住整个 command buffer
    pub fn begin(&self, usage: vk::CommandBufferUsageFlags, label: &str) -> anyhow::Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { Gfx::get().gfx_device().begin_command_buffer(self.vk_handle, &begin_info) }
            .with_context(|| format!("begin command buffer: {}", label))?;
        self.begin_label(label, LabelColor::COLOR_CMD);
        Ok(())
    }

    pub fn end(&self) -> anyhow::Result<()> {
        self.end_label();
        unsafe { Gfx::get().gfx_device().end_command_buffer(self.vk_handle) }.context("end command buffer")
    }
}

// 传输
impl GfxCommandBuffer {
    #[inline]
    pub fn copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            Gfx::get().gfx_device().cmd_copy_buffer(self.vk_handle, src.vk_buffer(), dst.vk_buffer(), regions);
        }
    }

    #[inline]
    pub fn copy_buffer_to_image(&self, copy_info: &vk::CopyBufferToImageInfo2) {
        unsafe { Gfx::get().gfx_device().cmd_copy_buffer_to_image2(self.vk_handle, copy_info) }
    }

    /// 只能在 graphics queue 上使用，用于生成 mipmap
    #[inline]
    pub fn blit_image(&self, blit_info: &vk::BlitImageInfo2) {
        unsafe { Gfx::get().gfx_device().cmd_blit_image2(self.vk_handle, blit_info) }
    }
}

// pipeline 状态
impl GfxCommandBuffer {
    #[inline]
    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// 绑定到 set 0
    ///
    /// `dynamic_offsets` 按照 binding 的顺序给出，没有 dynamic descriptor 时传空 slice
    #[inline]
    pub fn bind_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                0,
                std::slice::from_ref(&descriptor_set),
                dynamic_offsets,
            );
        }
    }

    /// `offset` 需要和 shader 中 push constant 的 offset 对应
    #[inline]
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        value: &T,
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_push_constants(
                self.vk_handle,
                pipeline_layout,
                stages,
                offset,
                bytemuck::bytes_of(value),
            );
        }
    }
}

// 光栅化
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_rendering(&self, render_info: &vk::RenderingInfo) {
        unsafe {
            Gfx::get().gfx_device().dynamic_rendering.cmd_begin_rendering(self.vk_handle, render_info);
        }
    }

    #[inline]
    pub fn end_rendering(&self) {
        unsafe {
            Gfx::get().gfx_device().dynamic_rendering.cmd_end_rendering(self.vk_handle);
        }
    }

    #[inline]
    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe {
            Gfx::get().gfx_device().cmd_set_viewport(self.vk_handle, 0, std::slice::from_ref(&viewport));
        }
    }

    #[inline]
    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe {
            Gfx::get().gfx_device().cmd_set_scissor(self.vk_handle, 0, std::slice::from_ref(&scissor));
        }
    }

    /// 绑定到 vertex binding 0
    #[inline]
    pub fn bind_vertex_buffer(&self, buffer: &GfxBuffer) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_vertex_buffers(self.vk_handle, 0, &[buffer.vk_buffer()], &[0]);
        }
    }

    #[inline]
    pub fn bind_index_buffer<T: GfxIndexType>(&self, buffer: &GfxBuffer) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_index_buffer(self.vk_handle, buffer.vk_buffer(), 0, T::VK_INDEX_TYPE);
        }
    }

    /// 单个 instance
    #[inline]
    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            Gfx::get().gfx_device().cmd_draw_indexed(self.vk_handle, index_count, 1, first_index, vertex_offset, 0);
        }
    }
}

// compute 与 ray tracing
impl GfxCommandBuffer {
    #[inline]
    pub fn dispatch(&self, group_count: glam::UVec3) {
        unsafe {
            Gfx::get().gfx_device().cmd_dispatch(self.vk_handle, group_count.x, group_count.y, group_count.z);
        }
    }

    /// 一次只构建一个加速结构
    #[inline]
    pub fn build_acceleration_structure(
        &self,
        geometry: &vk::AccelerationStructureBuildGeometryInfoKHR,
        ranges: &[vk::AccelerationStructureBuildRangeInfoKHR],
    ) {
        unsafe {
            Gfx::get().gfx_device().acceleration_structure().cmd_build_acceleration_structures(
                self.vk_handle,
                std::slice::from_ref(geometry),
                &[ranges],
            )
        }
    }

    /// 每个像素一个 launch，depth 固定为 1
    pub fn trace_rays(
        &self,
        raygen: &vk::StridedDeviceAddressRegionKHR,
        miss: &vk::StridedDeviceAddressRegionKHR,
        hit: &vk::StridedDeviceAddressRegionKHR,
        callable: &vk::StridedDeviceAddressRegionKHR,
        extent: vk::Extent2D,
    ) {
        unsafe {
            Gfx::get().gfx_device().ray_tracing_pipeline().cmd_trace_rays(
                self.vk_handle,
                raygen,
                miss,
                hit,
                callable,
                extent.width,
                extent.height,
                1,
            );
        }
    }
}

// query
impl GfxCommandBuffer {
    #[inline]
    pub fn reset_query_pool(&self, query_pool: &GfxQueryPool, first_query: u32, query_count: u32) {
        unsafe {
            Gfx::get().gfx_device().cmd_reset_query_pool(self.vk_handle, query_pool.handle(), first_query, query_count);
        }
    }

    #[inline]
    pub fn write_timestamp(&self, stage: vk::PipelineStageFlags2, query_pool: &GfxQueryPool, query_index: u32) {
        unsafe {
            Gfx::get().gfx_device().cmd_write_timestamp2(self.vk_handle, stage, query_pool.handle(), query_index);
        }
    }
}

// 同步
impl GfxCommandBuffer {
    fn pipeline_barrier(&self, dependency_info: &vk::DependencyInfo) {
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, dependency_info);
        }
    }

    pub fn memory_barrier(&self, barriers: &[vk::MemoryBarrier2]) {
        self.pipeline_barrier(&vk::DependencyInfo::default().memory_barriers(barriers));
    }

    /// 所有的 barrier 合并到一次 vkCmdPipelineBarrier2 中
    pub fn image_barriers(&self, barriers: &[GfxImageBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        self.pipeline_barrier(&vk::DependencyInfo::default().image_memory_barriers(&barriers));
    }

    pub fn buffer_barriers(&self, barriers: &[GfxBufferBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        self.pipeline_barrier(&vk::DependencyInfo::default().buffer_memory_barriers(&barriers));
    }
}

// debug label
impl GfxCommandBuffer {
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Ok(name) = CString::new(label_name) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into());
        unsafe {
            Gfx::get().gfx_device().debug_utils.cmd_begin_debug_utils_label(self.vk_handle, &label);
        }
    }

    pub fn end_label(&self) {
        unsafe {
            Gfx::get().gfx_device().debug_utils.cmd_end_debug_utils_label(self.vk_handle);
        }
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
