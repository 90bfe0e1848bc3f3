//! 两层加速结构：一个 BLAS（静态三角形网格）+ 一个只有单个 instance 的 TLAS
//!
//! # 生命周期
//! 1. [`AccelerationBuilder::create`]：同步构建 BLAS 和 TLAS，分配共享的 scratch buffer
//! 2. 每帧 [`AccelerationBuilder::update_instance`]：把新的 transform 写入 host 可见的 instance buffer
//! 3. 每帧 [`AccelerationBuilder::rebuild_top_level`]：在主 command buffer 上以 UPDATE 模式刷新 TLAS
//!
//! TLAS 每一帧都会无条件 update，即使 transform 没有变化。

use anyhow::Context;
use ash::vk;
use truvis_gfx::{
    basic::color::LabelColor,
    commands::command_buffer::GfxCommandBuffer,
    gfx::Gfx,
    raytracing::acceleration::GfxAcceleration,
    resources::buffer::GfxBuffer,
};
use truvis_render_sync::{
    barrier::BufferBarrierDesc,
    resource_state::BufferState,
    tracker::TrackedBuffer,
};

use crate::settings::{DefaultRendererSettings, FrameLabel};

const INSTANCE_SIZE: usize = size_of::<vk::AccelerationStructureInstanceKHR>();

/// 构建 BLAS 需要的三角形网格信息，buffer 需要带有 SHADER_DEVICE_ADDRESS
#[derive(Copy, Clone, Debug)]
pub struct AccelerationGeometry {
    pub vertex_address: vk::DeviceAddress,
    pub vertex_stride: vk::DeviceSize,
    pub vertex_count: u32,
    pub index_address: vk::DeviceAddress,
    pub triangle_count: u32,
}

/// scratch buffer 的内存需求
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScratchRequirement {
    pub size: vk::DeviceSize,
    pub alignment: vk::DeviceSize,
    pub memory_type_bits: u32,
}

/// 多次构建共用一个 scratch buffer：大小取最大值，对齐和 memory type 必须完全一致
pub fn merge_scratch_requirements(requirements: &[ScratchRequirement]) -> anyhow::Result<ScratchRequirement> {
    let first = requirements.first().context("no scratch requirement")?;
    let mut merged = *first;
    for req in &requirements[1..] {
        if req.alignment != first.alignment {
            anyhow::bail!("scratch alignment mismatch: {} vs {}", first.alignment, req.alignment);
        }
        if req.memory_type_bits != first.memory_type_bits {
            anyhow::bail!(
                "scratch memory type mismatch: {:#b} vs {:#b}",
                first.memory_type_bits,
                req.memory_type_bits
            );
        }
        merged.size = merged.size.max(req.size);
    }
    Ok(merged)
}

/// 3x4 row-major 矩阵，丢弃最后一行
pub fn get_rt_matrix(trans: &glam::Mat4) -> vk::TransformMatrixKHR {
    let c1 = &trans.x_axis;
    let c2 = &trans.y_axis;
    let c3 = &trans.z_axis;
    let c4 = &trans.w_axis;

    vk::TransformMatrixKHR {
        matrix: [
            c1.x, c2.x, c3.x, c4.x, // row 1
            c1.y, c2.y, c3.y, c4.y, // row 2
            c1.z, c2.z, c3.z, c4.z, // row 3
        ],
    }
}

/// 唯一的 instance：custom index 0，mask 0xff，hit group 0，关闭背面剔除
pub fn pack_instance(transform: &glam::Mat4, blas_address: vk::DeviceAddress) -> vk::AccelerationStructureInstanceKHR {
    vk::AccelerationStructureInstanceKHR {
        transform: get_rt_matrix(transform),
        instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xFF),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            0,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: blas_address,
        },
    }
}

/// 将 instance 按照 GPU 读取的内存布局写入 dst
pub fn write_instance(dst: &mut [u8], instance: &vk::AccelerationStructureInstanceKHR) {
    let src = unsafe {
        std::slice::from_raw_parts(instance as *const vk::AccelerationStructureInstanceKHR as *const u8, INSTANCE_SIZE)
    };
    dst[..INSTANCE_SIZE].copy_from_slice(src);
}

/// 每个 frame slot 在 instance buffer 中的偏移
///
/// host 写入当前帧的 instance 时，上一帧的 TLAS update 可能仍在 GPU 上读取它自己的那一份
#[inline]
pub fn instance_offset(frame_label: FrameLabel) -> vk::DeviceSize {
    (*frame_label * INSTANCE_SIZE) as vk::DeviceSize
}

/// 每帧 TLAS update 前后的同步
///
/// - update 之前：TLAS 从光追读取转换到 build 写入（WAR），scratch 等待上一次 build（WAW）
/// - update 之后：TLAS 从 build 写入转换到光追读取
pub struct TopLevelSync {
    tlas: TrackedBuffer,
    scratch: TrackedBuffer,
}
impl TopLevelSync {
    /// 初始构建是同步完成的，之后 TLAS 只会被光追读取
    pub fn new() -> Self {
        Self {
            tlas: TrackedBuffer::new("tlas", BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING),
            scratch: TrackedBuffer::new("as-scratch", BufferState::ACCELERATION_STRUCTURE_BUILD_WRITE),
        }
    }

    /// 返回 [tlas barrier, scratch barrier]
    pub fn before_update(&mut self) -> [BufferBarrierDesc; 2] {
        [
            self.tlas.transition(BufferState::ACCELERATION_STRUCTURE_BUILD_WRITE),
            self.scratch.transition(BufferState::ACCELERATION_STRUCTURE_BUILD_WRITE),
        ]
    }

    pub fn after_update(&mut self) -> BufferBarrierDesc {
        self.tlas.transition(BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING)
    }

    #[inline]
    pub fn tlas_state(&self) -> BufferState {
        self.tlas.state()
    }
}
impl Default for TopLevelSync {
    fn default() -> Self {
        Self::new()
    }
}

/// 构建 TLAS 需要的 geometry，instances 的数据来自 instance buffer 的某个 slot
fn top_level_geometry(instance_address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR::default()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                // false: data 是 &[vk::AccelerationStructureInstanceKHR]
                .array_of_pointers(false)
                .data(vk::DeviceOrHostAddressConstKHR {
                    device_address: instance_address,
                }),
        })
}

const TOP_LEVEL_FLAGS: vk::BuildAccelerationStructureFlagsKHR = vk::BuildAccelerationStructureFlagsKHR::from_raw(
    vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE.as_raw()
        | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE.as_raw(),
);

const SCRATCH_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::STORAGE_BUFFER.as_raw() | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS.as_raw(),
);

pub struct AccelerationBuilder {
    blas: GfxAcceleration,
    tlas: GfxAcceleration,

    /// 每个 frame slot 一个 instance，常驻映射
    instance_buffer: GfxBuffer,
    /// BLAS build、TLAS build 和 TLAS update 共用
    scratch_buffer: GfxBuffer,

    /// 最近一次 update_instance 写入的 slot
    active_slot: FrameLabel,
    sync: TopLevelSync,
}

// new & init
impl AccelerationBuilder {
    /// 同步构建 BLAS 和 TLAS
    pub fn create(geometry: &AccelerationGeometry, initial_transform: &glam::Mat4) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("AccelerationBuilder::create");
        let gfx = Gfx::get();

        // BLAS
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.vertex_address,
            })
            .vertex_stride(geometry.vertex_stride)
            .max_vertex(geometry.vertex_count.saturating_sub(1))
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.index_address,
            });
        let blas_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(vk::GeometryFlagsKHR::OPAQUE);
        let blas_range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(geometry.triangle_count);

        let mut blas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&blas_geometry));
        let blas_sizes = GfxAcceleration::build_sizes(&blas_build_info, &[geometry.triangle_count]);
        let blas = GfxAcceleration::new(
            blas_sizes.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            "mesh-blas",
        )?;

        // instance buffer，GPU 直接读取，不经过 stage buffer
        let instance_buffer = GfxBuffer::new(
            (INSTANCE_SIZE * DefaultRendererSettings::FRAMES_IN_FLIGHT) as vk::DeviceSize,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(16),
            true,
            "tlas-instance-buffer",
        )?;
        let instance = pack_instance(initial_transform, blas.device_address());
        for label in FrameLabel::all() {
            instance_buffer.write_by_mmap(instance_offset(label), std::slice::from_ref(&instance))?;
        }

        // TLAS
        let active_slot = FrameLabel::A;
        let tlas_geometry = top_level_geometry(instance_buffer.device_address() + instance_offset(active_slot));
        let mut tlas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TOP_LEVEL_FLAGS)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&tlas_geometry));
        let tlas_sizes = GfxAcceleration::build_sizes(&tlas_build_info, &[1]);
        let tlas = GfxAcceleration::new(
            tlas_sizes.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            "mesh-tlas",
        )?;

        // 共享的 scratch buffer
        let scratch_offset_align =
            gfx.acc_struct_props().min_acceleration_structure_scratch_offset_alignment as vk::DeviceSize;
        let scratch_requirement = |size: vk::DeviceSize| {
            let mem_req = GfxBuffer::query_memory_requirements(size, SCRATCH_USAGE);
            ScratchRequirement {
                size,
                alignment: mem_req.alignment.max(scratch_offset_align),
                memory_type_bits: mem_req.memory_type_bits,
            }
        };
        let scratch = merge_scratch_requirements(&[
            scratch_requirement(blas_sizes.build_scratch_size),
            scratch_requirement(tlas_sizes.build_scratch_size),
            scratch_requirement(tlas_sizes.update_scratch_size),
        ])
        .context("blas and tlas can not share one scratch buffer")?;
        log::info!(
            "acceleration structure sizes: blas {}, tlas {}, scratch {} (align {})",
            blas_sizes.acceleration_structure_size,
            tlas_sizes.acceleration_structure_size,
            scratch.size,
            scratch.alignment
        );
        let scratch_buffer = GfxBuffer::new(scratch.size, SCRATCH_USAGE, Some(scratch.alignment), false, "as-scratch")?;

        blas_build_info.dst_acceleration_structure = blas.handle();
        blas_build_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(),
        };
        tlas_build_info.dst_acceleration_structure = tlas.handle();
        tlas_build_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(),
        };
        let tlas_range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(1);

        gfx.one_time_exec(
            |cmd| {
                cmd.build_acceleration_structure(&blas_build_info, std::slice::from_ref(&blas_range));
                // TLAS 的构建会读取 BLAS，并且复用同一个 scratch buffer
                cmd.memory_barrier(std::slice::from_ref(&vk::MemoryBarrier2 {
                    src_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
                    dst_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
                    src_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
                    dst_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                        | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
                    ..Default::default()
                }));
                cmd.build_acceleration_structure(&tlas_build_info, std::slice::from_ref(&tlas_range));
            },
            "build-acceleration-structure",
        )?;

        Ok(Self {
            blas,
            tlas,
            instance_buffer,
            scratch_buffer,
            active_slot,
            sync: TopLevelSync::new(),
        })
    }
}

// getters
impl AccelerationBuilder {
    #[inline]
    pub fn tlas(&self) -> &GfxAcceleration {
        &self.tlas
    }
}

// update
impl AccelerationBuilder {
    /// 覆盖 frame slot 对应的 instance transform
    ///
    /// 写入后 flush，随后的 queue submit 保证 host 写入对 TLAS update 可见
    pub fn update_instance(&mut self, frame_label: FrameLabel, transform: &glam::Mat4) -> anyhow::Result<()> {
        let instance = pack_instance(transform, self.blas.device_address());
        let offset = instance_offset(frame_label);
        let mapped_ptr = self.instance_buffer.mapped_ptr().context("instance buffer is not mapped")?;
        let dst = unsafe { std::slice::from_raw_parts_mut(mapped_ptr.add(offset as usize), INSTANCE_SIZE) };
        write_instance(dst, &instance);
        self.instance_buffer.flush(offset, INSTANCE_SIZE as vk::DeviceSize)?;

        self.active_slot = frame_label;
        Ok(())
    }

    /// 在主 command buffer 上以 UPDATE 模式刷新 TLAS，之后光追 shader 才能读取 TLAS
    pub fn rebuild_top_level(&mut self, cmd: &GfxCommandBuffer) {
        cmd.begin_label("rebuild-tlas", LabelColor::COLOR_CMD);

        let [tlas_before, scratch_before] = self.sync.before_update();
        cmd.buffer_barriers(&[
            tlas_before.to_gfx_barrier(self.tlas.vk_buffer()),
            scratch_before.to_gfx_barrier(self.scratch_buffer.vk_buffer()),
        ]);

        let geometry =
            top_level_geometry(self.instance_buffer.device_address() + instance_offset(self.active_slot));
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TOP_LEVEL_FLAGS)
            .mode(vk::BuildAccelerationStructureModeKHR::UPDATE)
            .src_acceleration_structure(self.tlas.handle())
            .dst_acceleration_structure(self.tlas.handle())
            .geometries(std::slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: self.scratch_buffer.device_address(),
            });
        let range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(1);
        cmd.build_acceleration_structure(&build_info, std::slice::from_ref(&range));

        let tlas_after = self.sync.after_update();
        cmd.buffer_barriers(&[tlas_after.to_gfx_barrier(self.tlas.vk_buffer())]);

        cmd.end_label();
    }
}

// destroy
impl AccelerationBuilder {
    pub fn destroy(self) {
        let Self {
            blas,
            tlas,
            instance_buffer,
            scratch_buffer,
            ..
        } = self;
        tlas.destroy();
        blas.destroy();
        instance_buffer.destroy();
        scratch_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_bytes(transform: &glam::Mat4) -> Vec<u8> {
        let mut bytes = vec![0_u8; INSTANCE_SIZE];
        write_instance(&mut bytes, &pack_instance(transform, 0xdead_0000));
        bytes
    }

    #[test]
    fn test_rt_matrix_is_row_major() {
        let trans = glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0));
        let m = get_rt_matrix(&trans).matrix;
        assert_eq!(m[3], 1.0);
        assert_eq!(m[7], 2.0);
        assert_eq!(m[11], 3.0);
        assert_eq!(m[0], 1.0);
        assert_eq!(m[5], 1.0);
        assert_eq!(m[10], 1.0);
    }

    #[test]
    fn test_instance_layout() {
        assert_eq!(INSTANCE_SIZE, 64);
        assert_eq!(instance_offset(FrameLabel::A), 0);
        assert_eq!(instance_offset(FrameLabel::B), 64);

        let bytes = instance_bytes(&glam::Mat4::IDENTITY);
        // mask 位于 custom index 之后的高 8 位
        assert_eq!(bytes[48..52], [0x00, 0x00, 0x00, 0xFF]);
        assert_eq!(bytes[55], vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8);
        assert_eq!(u64::from_le_bytes(bytes[56..64].try_into().unwrap()), 0xdead_0000);
    }

    #[test]
    fn test_update_instance_is_idempotent() {
        let transform = glam::Mat4::from_rotation_y(35_f32.to_radians());
        let blas_address = 0x1234_5600;

        let mut once = vec![0_u8; INSTANCE_SIZE];
        write_instance(&mut once, &pack_instance(&transform, blas_address));

        let mut twice = vec![0_u8; INSTANCE_SIZE];
        write_instance(&mut twice, &pack_instance(&transform, blas_address));
        write_instance(&mut twice, &pack_instance(&transform, blas_address));
        assert_eq!(once, twice);

        // 中间写入过其他 transform 也不影响结果
        let mut overwritten = vec![0_u8; INSTANCE_SIZE];
        write_instance(&mut overwritten, &pack_instance(&glam::Mat4::IDENTITY, blas_address));
        write_instance(&mut overwritten, &pack_instance(&transform, blas_address));
        assert_eq!(once, overwritten);
    }

    #[test]
    fn test_merge_scratch_takes_max_size() {
        let merged = merge_scratch_requirements(&[
            ScratchRequirement {
                size: 1024,
                alignment: 128,
                memory_type_bits: 0b0110,
            },
            ScratchRequirement {
                size: 4096,
                alignment: 128,
                memory_type_bits: 0b0110,
            },
            ScratchRequirement {
                size: 512,
                alignment: 128,
                memory_type_bits: 0b0110,
            },
        ])
        .unwrap();
        assert_eq!(merged.size, 4096);
        assert_eq!(merged.alignment, 128);
    }

    #[test]
    fn test_merge_scratch_rejects_mismatch() {
        let base = ScratchRequirement {
            size: 256,
            alignment: 128,
            memory_type_bits: 0b0110,
        };
        let other_align = ScratchRequirement { alignment: 256, ..base };
        let other_type = ScratchRequirement {
            memory_type_bits: 0b0001,
            ..base
        };
        assert!(merge_scratch_requirements(&[base, other_align]).is_err());
        assert!(merge_scratch_requirements(&[base, other_type]).is_err());
        assert!(merge_scratch_requirements(&[]).is_err());
    }

    #[test]
    fn test_top_level_sync_barriers() {
        let mut sync = TopLevelSync::new();
        for _ in 0..3 {
            let [tlas, scratch] = sync.before_update();
            assert_eq!(tlas.src_state, BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING);
            assert_eq!(tlas.dst_state, BufferState::ACCELERATION_STRUCTURE_BUILD_WRITE);
            assert_eq!(scratch.src_state.src_access(), vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR);

            let after = sync.after_update();
            assert_eq!(after.src_state.src_access(), vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR);
            assert_eq!(after.dst_state.stage, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
            assert_eq!(after.dst_state.access, vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
            assert_eq!(sync.tlas_state(), BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING);
        }
    }
}
