use std::mem::offset_of;

use ash::vk;
use truvis_gfx::resources::layout::GfxVertexLayout;

/// 和 `imgui::DrawVert` 的内存布局一致
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ImGuiVertex {
    pos: [f32; 2],
    uv: [f32; 2],
    /// R8G8B8A8
    color: [u8; 4],
}

/// AoS: Array of Structs
pub struct ImGuiVertexLayoutAoS;
impl GfxVertexLayout for ImGuiVertexLayoutAoS {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<ImGuiVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(ImGuiVertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(ImGuiVertex, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: offset_of!(ImGuiVertex, color) as u32,
            },
        ]
    }

    fn buffer_size(vertex_cnt: usize) -> usize {
        vertex_cnt * size_of::<ImGuiVertex>()
    }

    fn pos_stride() -> u32 {
        size_of::<ImGuiVertex>() as u32
    }

    fn pos_offset() -> vk::DeviceSize {
        offset_of!(ImGuiVertex, pos) as vk::DeviceSize
    }

    fn pos_format() -> vk::Format {
        vk::Format::R32G32_SFLOAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_imgui_draw_vert() {
        assert_eq!(size_of::<ImGuiVertex>(), size_of::<imgui::DrawVert>());
        assert_eq!(ImGuiVertexLayoutAoS::buffer_size(3), 3 * 20);
        let offsets = ImGuiVertexLayoutAoS::vertex_input_attributes().iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, [0, 8, 16]);
    }
}
