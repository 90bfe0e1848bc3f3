use ash::vk;
use truvis_gfx::resources::buffer::GfxBuffer;

/// 按需扩容后的容量：至少为 `min_capacity`，且为 2 的幂，避免每帧重新分配
#[inline]
pub fn grown_capacity(current: usize, required: usize, min_capacity: usize) -> usize {
    if required <= current {
        current
    } else {
        required.max(min_capacity).next_power_of_two()
    }
}

/// imgui 绘制所需的 vertex buffer 和 index buffer
///
/// 每个 frame slot 一份，host 可见，每帧直接 mmap 写入
pub struct GuiMesh {
    pub vertex_buffer: Option<GfxBuffer>,
    vertex_capacity: usize,

    pub index_buffer: Option<GfxBuffer>,
    index_capacity: usize,

    name: String,
}

// new & init
impl GuiMesh {
    const MIN_VERTEX_CAPACITY: usize = 4096;
    const MIN_INDEX_CAPACITY: usize = 8192;

    pub fn new(frame_name: &str) -> Self {
        Self {
            vertex_buffer: None,
            vertex_capacity: 0,
            index_buffer: None,
            index_capacity: 0,
            name: format!("{frame_name}-imgui"),
        }
    }
}

// update
impl GuiMesh {
    /// 容量不足时重新创建 buffer；调用前需要保证该 slot 的上一帧已经执行完毕
    pub fn grow_if_needed(&mut self, draw_data: &imgui::DrawData) -> anyhow::Result<()> {
        let vertex_count = draw_data.total_vtx_count as usize;
        let new_vertex_capacity = grown_capacity(self.vertex_capacity, vertex_count, Self::MIN_VERTEX_CAPACITY);
        if new_vertex_capacity != self.vertex_capacity || self.vertex_buffer.is_none() {
            self.vertex_buffer = Some(GfxBuffer::new(
                (new_vertex_capacity * size_of::<imgui::DrawVert>()) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                None,
                true,
                format!("{}-vertex", self.name),
            )?);
            self.vertex_capacity = new_vertex_capacity;
            log::debug!("{}: vertex capacity -> {}", self.name, new_vertex_capacity);
        }

        let index_count = draw_data.total_idx_count as usize;
        let new_index_capacity = grown_capacity(self.index_capacity, index_count, Self::MIN_INDEX_CAPACITY);
        if new_index_capacity != self.index_capacity || self.index_buffer.is_none() {
            self.index_buffer = Some(GfxBuffer::new(
                (new_index_capacity * size_of::<imgui::DrawIdx>()) as vk::DeviceSize,
                vk::BufferUsageFlags::INDEX_BUFFER,
                None,
                true,
                format!("{}-index", self.name),
            )?);
            self.index_capacity = new_index_capacity;
            log::debug!("{}: index capacity -> {}", self.name, new_index_capacity);
        }

        Ok(())
    }

    /// 把所有 draw list 的顶点和索引依次写入 buffer
    pub fn fill(&self, draw_data: &imgui::DrawData) -> anyhow::Result<()> {
        let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer) else {
            anyhow::bail!("{}: buffers are not allocated", self.name);
        };

        let mut vertex_offset = 0;
        let mut index_offset = 0;
        for draw_list in draw_data.draw_lists() {
            let vertices = draw_list.vtx_buffer();
            let indices = draw_list.idx_buffer();
            vertex_buffer.write_by_mmap(vertex_offset, vertices)?;
            index_buffer.write_by_mmap(index_offset, indices)?;
            vertex_offset += size_of_val(vertices) as vk::DeviceSize;
            index_offset += size_of_val(indices) as vk::DeviceSize;
        }
        Ok(())
    }
}

// destroy
impl GuiMesh {
    pub fn destroy(self) {
        if let Some(buffer) = self.vertex_buffer {
            buffer.destroy();
        }
        if let Some(buffer) = self.index_buffer {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_growth() {
        assert_eq!(grown_capacity(0, 10, 4096), 4096);
        assert_eq!(grown_capacity(4096, 4000, 4096), 4096);
        assert_eq!(grown_capacity(4096, 5000, 4096), 8192);
        assert_eq!(grown_capacity(8192, 100, 4096), 8192);
    }
}
