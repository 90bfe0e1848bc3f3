use ash::vk;
use itertools::Itertools;

use crate::descriptors::descriptor::GfxDescriptorBinding;

/// 对 vk::WriteDescriptorSet 的封装，持有 buffer / image / tlas 信息的内存
pub struct GfxWriteDescriptorSet {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
    pub acceleration_structures: Vec<vk::AccelerationStructureKHR>,
}
impl GfxWriteDescriptorSet {
    /// buffer_infos、image_infos、acceleration_structures 只有一个非空
    fn descriptor_count(&self) -> u32 {
        debug_assert_eq!(
            [
                !self.buffer_infos.is_empty(),
                !self.image_infos.is_empty(),
                !self.acceleration_structures.is_empty()
            ]
            .iter()
            .filter(|b| **b)
            .count(),
            1,
            "Only one of buffer_infos, image_infos, or acceleration_structures should be set in GfxWriteDescriptorSet"
        );

        if !self.buffer_infos.is_empty() {
            self.buffer_infos.len() as u32
        } else if !self.image_infos.is_empty() {
            self.image_infos.len() as u32
        } else {
            self.acceleration_structures.len() as u32
        }
    }

    pub fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        vk::WriteDescriptorSet {
            dst_set: self.dst_set,
            dst_binding: self.dst_binding,
            dst_array_element: self.dst_array_element,
            descriptor_count: self.descriptor_count(),
            descriptor_type: self.descriptor_type,
            // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
            p_buffer_info: self.buffer_infos.as_ptr(),
            p_image_info: self.image_infos.as_ptr(),
            ..Default::default()
        }
    }

    /// tlas 的写入需要通过 p_next 挂上 WriteDescriptorSetAccelerationStructureKHR
    pub fn with_writes(writes: &[Self], cbk: impl Fn(&[vk::WriteDescriptorSet])) {
        let mut write_accs = writes
            .iter()
            .map(|w| {
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(&w.acceleration_structures)
            })
            .collect_vec();
        let writes = writes
            .iter()
            .map(|w| w.to_vk_type())
            .zip(write_accs.iter_mut())
            .map(|(w, write_acc)| if write_acc.acceleration_structure_count > 0 { w.push_next(write_acc) } else { w })
            .collect_vec();
        cbk(&writes);
    }
}

/// 通过 binding 描述来生成对应 descriptor set 的写入
pub trait GfxDescriptorCursor {
    fn get_binding(&self) -> &GfxDescriptorBinding;

    fn write_buffer(&self, dst_set: vk::DescriptorSet, buffers: Vec<vk::DescriptorBufferInfo>) -> GfxWriteDescriptorSet {
        let item = self.get_binding();
        GfxWriteDescriptorSet {
            dst_set,
            dst_binding: item.binding,
            dst_array_element: 0,
            buffer_infos: buffers,
            descriptor_type: item.descriptor_type,
            image_infos: vec![],
            acceleration_structures: vec![],
        }
    }

    fn write_image(&self, dst_set: vk::DescriptorSet, images: Vec<vk::DescriptorImageInfo>) -> GfxWriteDescriptorSet {
        let item = self.get_binding();
        GfxWriteDescriptorSet {
            dst_set,
            dst_binding: item.binding,
            dst_array_element: 0,
            descriptor_type: item.descriptor_type,
            buffer_infos: vec![],
            image_infos: images,
            acceleration_structures: vec![],
        }
    }

    fn write_tlas(&self, dst_set: vk::DescriptorSet, tlas: Vec<vk::AccelerationStructureKHR>) -> GfxWriteDescriptorSet {
        let item = self.get_binding();
        GfxWriteDescriptorSet {
            dst_set,
            dst_binding: item.binding,
            dst_array_element: 0,
            descriptor_type: item.descriptor_type,
            buffer_infos: vec![],
            image_infos: vec![],
            acceleration_structures: tlas,
        }
    }
}

impl GfxDescriptorCursor for GfxDescriptorBinding {
    fn get_binding(&self) -> &GfxDescriptorBinding {
        self
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_tlas_write_chains_acceleration_structure() {
        let binding = GfxDescriptorBinding::new(
            1,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            vk::ShaderStageFlags::RAYGEN_KHR,
        );
        let set = vk::DescriptorSet::from_raw(7);
        let writes = [
            binding.write_tlas(set, vec![vk::AccelerationStructureKHR::from_raw(42)]),
            GfxDescriptorBinding::new(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .write_buffer(
                    set,
                    vec![vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(3),
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    }],
                ),
        ];

        GfxWriteDescriptorSet::with_writes(&writes, |vk_writes| {
            assert_eq!(vk_writes.len(), 2);
            assert_eq!(vk_writes[0].dst_binding, 1);
            assert_eq!(vk_writes[0].descriptor_count, 1);
            assert!(!vk_writes[0].p_next.is_null());
            assert_eq!(vk_writes[1].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
            assert!(vk_writes[1].p_next.is_null());
        });
    }
}
