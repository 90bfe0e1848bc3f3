//! 资源状态跟踪
//!
//! 资源的当前状态是 barrier 计算的唯一依据，只允许在录制线程上按程序顺序修改。

use ash::vk;

use crate::{
    barrier::{BufferBarrierDesc, ImageBarrierDesc},
    resource_state::{BufferState, ImageState},
};

/// 带有当前状态的 image
#[derive(Clone, Debug)]
pub struct TrackedImage {
    name: String,
    aspect: vk::ImageAspectFlags,
    state: ImageState,
}

// new & init
impl TrackedImage {
    /// 新创建的 image 处于 UNDEFINED
    pub fn new(name: impl Into<String>, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            name: name.into(),
            aspect,
            state: ImageState::UNDEFINED,
        }
    }
}

// getters
impl TrackedImage {
    #[inline]
    pub fn state(&self) -> ImageState {
        self.state
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }
}

// transition
impl TrackedImage {
    /// 从当前状态转换到 `required`，返回对应的 barrier，并将当前状态更新为 `required`
    pub fn transition(&mut self, required: ImageState) -> ImageBarrierDesc {
        let barrier = ImageBarrierDesc::new(self.state, required, self.aspect);
        log::trace!("image barrier [{}]: {:?} -> {:?}", self.name, self.state.layout, required.layout);
        self.state = required;
        barrier
    }

    /// 同 [`Self::transition`]，但是不保留原有内容：old layout 视为 UNDEFINED
    ///
    /// 原有的 stage/access 仍然作为 src，用于避免 WAW / WAR
    pub fn transition_discard(&mut self, required: ImageState) -> ImageBarrierDesc {
        let mut barrier = self.transition(required);
        barrier.src_state.layout = vk::ImageLayout::UNDEFINED;
        barrier
    }

    /// 资源的所有权由 barrier 以外的机制交接（例如 swapchain 的 acquire semaphore），
    /// 直接覆盖当前状态，不产生 barrier
    pub fn reset(&mut self, state: ImageState) {
        self.state = state;
    }
}

/// 带有当前状态的 buffer，也用于承载加速结构的 buffer
#[derive(Clone, Debug)]
pub struct TrackedBuffer {
    name: String,
    state: BufferState,
}

impl TrackedBuffer {
    pub fn new(name: impl Into<String>, state: BufferState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    #[inline]
    pub fn state(&self) -> BufferState {
        self.state
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 从当前状态转换到 `required`，返回对应的 barrier，并将当前状态更新为 `required`
    pub fn transition(&mut self, required: BufferState) -> BufferBarrierDesc {
        let barrier = BufferBarrierDesc::new(self.state, required);
        log::trace!("buffer barrier [{}]: {:?} -> {:?}", self.name, self.state.access, required.access);
        self.state = required;
        barrier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_operation_log_keeps_state_consistent() {
        let script = [
            ImageState::COLOR_ATTACHMENT_WRITE,
            ImageState::COLOR_ATTACHMENT_READ_WRITE,
            ImageState::SHADER_READ_COMPUTE,
            ImageState::STORAGE_WRITE_RAY_TRACING,
            ImageState::COLOR_ATTACHMENT_READ_WRITE,
            ImageState::SHADER_READ_COMPUTE,
            ImageState::SHADER_READ_COMPUTE,
            ImageState::COLOR_ATTACHMENT_WRITE,
        ];

        let mut image = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let mut previous = image.state();
        for required in script {
            let barrier = image.transition(required);
            assert_eq!(barrier.src_state, previous);
            assert_eq!(barrier.dst_state, required);
            assert_eq!(image.state(), required);
            assert_eq!(image.state().layout, required.layout);
            previous = required;
        }
    }

    #[test]
    fn test_every_transition_emits_exactly_one_barrier() {
        let mut image = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let barriers: Vec<_> = [ImageState::SHADER_READ_COMPUTE, ImageState::SHADER_READ_COMPUTE]
            .into_iter()
            .map(|s| image.transition(s))
            .collect();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[1].src_state, barriers[1].dst_state);
    }

    #[test]
    fn test_discard_keeps_src_masks() {
        let mut depth = TrackedImage::new("depth", vk::ImageAspectFlags::DEPTH);
        depth.transition(ImageState::DEPTH_ATTACHMENT_READ_WRITE);
        let barrier = depth.transition_discard(ImageState::DEPTH_ATTACHMENT_READ_WRITE);
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.src_state.stage, ImageState::DEPTH_ATTACHMENT_READ_WRITE.stage);
        assert_eq!(barrier.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth.state(), ImageState::DEPTH_ATTACHMENT_READ_WRITE);
    }

    #[test]
    fn test_reset_does_not_emit() {
        let mut swapchain_image = TrackedImage::new("swapchain-0", vk::ImageAspectFlags::COLOR);
        swapchain_image.reset(ImageState::SWAPCHAIN_ACQUIRED);
        let barrier = swapchain_image.transition(ImageState::STORAGE_WRITE_COMPUTE);
        assert_eq!(barrier.src_state, ImageState::SWAPCHAIN_ACQUIRED);
    }

    #[test]
    fn test_buffer_transition() {
        let mut tlas = TrackedBuffer::new("tlas", BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING);
        let before = tlas.transition(BufferState::ACCELERATION_STRUCTURE_BUILD_WRITE);
        let after = tlas.transition(BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING);
        assert_eq!(before.dst_state, after.src_state);
        assert_eq!(after.src_state.src_access(), vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR);
        assert_eq!(after.dst_state.access, vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
        assert_eq!(tlas.state(), BufferState::ACCELERATION_STRUCTURE_READ_RAY_TRACING);
    }
}
