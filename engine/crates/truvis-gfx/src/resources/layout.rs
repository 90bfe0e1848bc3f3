use std::mem::offset_of;

use ash::vk;

/// 索引类型 Trait (u16 或 u32)
pub trait GfxIndexType: Sized + Copy {
    const VK_INDEX_TYPE: vk::IndexType;
    fn byte_size() -> usize;
}

impl GfxIndexType for u16 {
    const VK_INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;
    fn byte_size() -> usize {
        size_of::<u16>()
    }
}

impl GfxIndexType for u32 {
    const VK_INDEX_TYPE: vk::IndexType = vk::IndexType::UINT32;
    fn byte_size() -> usize {
        size_of::<u32>()
    }
}

/// Vertex Buffer 中顶点布局的 trait 定义
///
/// 定义了顶点数据的内存布局，包括 Binding 和 Attribute 描述，
/// 以及构建 BLAS 时需要的 position 信息
pub trait GfxVertexLayout {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription>;

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription>;

    /// 整个 Buffer 的大小
    fn buffer_size(vertex_cnt: usize) -> usize;

    /// position 属性的 stride
    fn pos_stride() -> u32;

    /// position 属性在 Buffer 中的偏移量
    fn pos_offset() -> vk::DeviceSize;

    /// position 属性的格式
    fn pos_format() -> vk::Format {
        vk::Format::R32G32B32_SFLOAT
    }
}

/// 网格顶点：位置、法线、纹理坐标，紧密排列的 8 个 f32
///
/// 光追的 closest hit shader 会把 vertex buffer 当作 float 数组读取，因此不能有 padding
#[repr(C)]
#[derive(Clone, Debug, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// AoS 的顶点 buffer 布局，包含：Positions, Normals, UVs
pub struct VertexLayoutAoSMesh;

impl GfxVertexLayout for VertexLayoutAoSMesh {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<MeshVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // positions
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(MeshVertex, position) as u32,
            },
            // normals
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(MeshVertex, normal) as u32,
            },
            // uvs
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(MeshVertex, uv) as u32,
            },
        ]
    }

    fn buffer_size(vertex_cnt: usize) -> usize {
        vertex_cnt * size_of::<MeshVertex>()
    }

    fn pos_stride() -> u32 {
        size_of::<MeshVertex>() as u32
    }

    fn pos_offset() -> vk::DeviceSize {
        offset_of!(MeshVertex, position) as vk::DeviceSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_vertex_is_tightly_packed() {
        assert_eq!(size_of::<MeshVertex>(), 8 * size_of::<f32>());
        assert_eq!(VertexLayoutAoSMesh::pos_stride(), 32);
        assert_eq!(VertexLayoutAoSMesh::buffer_size(3), 96);
    }

    #[test]
    fn test_mesh_vertex_attribute_offsets() {
        let attrs = VertexLayoutAoSMesh::vertex_input_attributes();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_index_type_size() {
        assert_eq!(<u32 as GfxIndexType>::byte_size(), 4);
        assert_eq!(<u16 as GfxIndexType>::VK_INDEX_TYPE, vk::IndexType::UINT16);
    }
}
