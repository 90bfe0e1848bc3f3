//! 每帧的阶段编排
//!
//! `BEGIN → ACQUIRE → RENDER(RASTER | RAYTRACE) → OVERLAY → PRESENT_COPY → SUBMIT/PRESENT`
//!
//! 这里只负责 RENDER 到 PRESENT_COPY 之间的命令顺序和 image barrier，
//! acquire / submit / present 由 renderer 完成。

use ash::vk;
use truvis_render_sync::{resource_state::ImageState, tracker::TrackedImage};

use crate::{
    frame::plan::{BarrierPurpose, BarrierTarget, FramePlan, FrameStep, PlannedBarrier, TimingPhase},
    passes::present_copy_pass::group_count,
};

/// 当前帧使用的渲染路径
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderPath {
    Rasterize,
    RayTrace,
}
impl RenderPath {
    /// 设备不支持光追时始终使用 raster
    #[inline]
    pub fn select(raytracing_enabled: bool, rt_supported: bool) -> Self {
        if raytracing_enabled && rt_supported { Self::RayTrace } else { Self::Rasterize }
    }

    /// 渲染开始时，输出 image 应当处于的状态
    #[inline]
    pub fn expected_state(self) -> ImageState {
        match self {
            Self::Rasterize => ImageState::COLOR_ATTACHMENT_WRITE,
            Self::RayTrace => ImageState::STORAGE_WRITE_RAY_TRACING,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FrameRequest {
    pub path: RenderPath,
    /// 本帧 acquire 到的 swapchain image
    pub image_index: usize,
    pub extent: vk::Extent2D,
}

/// 本帧涉及的所有 image 的状态，plan 过程中会按录制顺序更新
pub struct FrameStates<'a> {
    pub output: &'a mut TrackedImage,
    pub depth: &'a mut TrackedImage,
    pub swapchain_image: &'a mut TrackedImage,
}

fn image_barrier(
    steps: &mut Vec<FrameStep>,
    target: BarrierTarget,
    desc: truvis_render_sync::barrier::ImageBarrierDesc,
    purpose: BarrierPurpose,
) {
    steps.push(FrameStep::ImageBarrier(PlannedBarrier { target, desc, purpose }));
}

/// 生成一帧的录制计划
pub fn plan_frame(request: &FrameRequest, states: FrameStates<'_>) -> FramePlan {
    let FrameStates {
        output,
        depth,
        swapchain_image,
    } = states;
    let mut plan = FramePlan::default();

    // RENDER
    {
        let steps = plan.push_phase(TimingPhase::Draw);
        let expected = request.path.expected_state();
        if output.state() != expected {
            if output.state().layout == vk::ImageLayout::UNDEFINED {
                // 新创建的输出 image，内容无意义
                image_barrier(steps, BarrierTarget::Output, output.transition_discard(expected), BarrierPurpose::RenderInput);
            } else {
                // 上一帧交接给了另一条路径
                image_barrier(steps, BarrierTarget::Output, output.transition(expected), BarrierPurpose::ModeTransition);
            }
        }

        match request.path {
            RenderPath::Rasterize => {
                image_barrier(
                    steps,
                    BarrierTarget::Depth,
                    depth.transition_discard(ImageState::DEPTH_ATTACHMENT_READ_WRITE),
                    BarrierPurpose::RenderInput,
                );
                steps.push(FrameStep::DrawRaster);
            }
            RenderPath::RayTrace => {
                steps.push(FrameStep::RebuildTopLevel);
                steps.push(FrameStep::TraceRays { extent: request.extent });
            }
        }
    }

    // OVERLAY
    {
        let steps = plan.push_phase(TimingPhase::Ui);
        image_barrier(
            steps,
            BarrierTarget::Output,
            output.transition(ImageState::COLOR_ATTACHMENT_READ_WRITE),
            BarrierPurpose::Overlay,
        );
        steps.push(FrameStep::DrawOverlay);
        image_barrier(
            steps,
            BarrierTarget::Output,
            output.transition(ImageState::SHADER_READ_COMPUTE),
            BarrierPurpose::Overlay,
        );
    }

    // PRESENT_COPY
    {
        let steps = plan.push_phase(TimingPhase::PresentCopy);
        let swapchain_target = BarrierTarget::Swapchain(request.image_index);

        // acquire semaphore 已经完成了所有权交接，之前的内容不需要保留
        swapchain_image.reset(ImageState::SWAPCHAIN_ACQUIRED);
        image_barrier(
            steps,
            swapchain_target,
            swapchain_image.transition(ImageState::STORAGE_WRITE_COMPUTE),
            BarrierPurpose::PresentCopy,
        );
        steps.push(FrameStep::PresentCopy {
            image_index: request.image_index,
            group_count: group_count(request.extent),
            extent: request.extent,
        });
        image_barrier(
            steps,
            swapchain_target,
            swapchain_image.transition(ImageState::PRESENT),
            BarrierPurpose::PresentCopy,
        );

        // 下一帧大概率继续使用当前路径；路径切换时由下一帧的 ModeTransition 处理
        image_barrier(
            steps,
            BarrierTarget::Output,
            output.transition(request.path.expected_state()),
            BarrierPurpose::Handoff,
        );
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 模拟 renderer 中各个 image 的状态，不依赖 GPU
    struct SimulatedFrames {
        output: TrackedImage,
        depth: TrackedImage,
        swapchain: Vec<TrackedImage>,
        extent: vk::Extent2D,
        frame_id: usize,
    }
    impl SimulatedFrames {
        fn new(width: u32, height: u32) -> Self {
            Self {
                output: TrackedImage::new("output", vk::ImageAspectFlags::COLOR),
                depth: TrackedImage::new("depth", vk::ImageAspectFlags::DEPTH),
                swapchain: (0..3)
                    .map(|idx| TrackedImage::new(format!("swapchain-{idx}"), vk::ImageAspectFlags::COLOR))
                    .collect(),
                extent: vk::Extent2D { width, height },
                frame_id: 0,
            }
        }

        fn run_frame(&mut self, path: RenderPath) -> FramePlan {
            let image_index = self.frame_id % self.swapchain.len();
            self.frame_id += 1;
            plan_frame(
                &FrameRequest {
                    path,
                    image_index,
                    extent: self.extent,
                },
                FrameStates {
                    output: &mut self.output,
                    depth: &mut self.depth,
                    swapchain_image: &mut self.swapchain[image_index],
                },
            )
        }

        /// 与 renderer 的 resize 相同：render target 重新创建，状态回到 UNDEFINED
        fn resize(&mut self, width: u32, height: u32) {
            self.output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
            self.depth = TrackedImage::new("depth", vk::ImageAspectFlags::DEPTH);
            self.swapchain.iter_mut().for_each(|image| image.reset(ImageState::UNDEFINED));
            self.extent = vk::Extent2D { width, height };
        }
    }

    fn mode_transitions(plan: &FramePlan) -> usize {
        plan.barriers_for(BarrierPurpose::ModeTransition).count()
    }

    #[test]
    fn test_raster_frame_has_no_ray_tracing_sync() {
        let mut frames = SimulatedFrames::new(800, 600);
        let plan = frames.run_frame(RenderPath::Rasterize);

        assert!(!plan.touches_ray_tracing());
        assert_eq!(mode_transitions(&plan), 0);

        let steps: Vec<_> = plan.steps().filter(|s| !matches!(s, FrameStep::ImageBarrier(_))).collect();
        assert_eq!(steps.len(), 3);
        assert_eq!(*steps[0], FrameStep::DrawRaster);
        assert_eq!(*steps[1], FrameStep::DrawOverlay);
        assert!(matches!(steps[2], FrameStep::PresentCopy { image_index: 0, .. }));

        let phases: Vec<_> = plan.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, [TimingPhase::Draw, TimingPhase::Ui, TimingPhase::PresentCopy]);
        assert_eq!(frames.swapchain[0].state(), ImageState::PRESENT);
    }

    #[test]
    fn test_toggle_ray_tracing_emits_one_mode_transition() {
        let mut frames = SimulatedFrames::new(800, 600);
        for frame in 1..=5 {
            let plan = frames.run_frame(RenderPath::Rasterize);
            assert_eq!(mode_transitions(&plan), 0, "frame {frame}");
        }

        // frame 6：切换到光追
        let plan = frames.run_frame(RenderPath::RayTrace);
        let transitions: Vec<_> = plan.barriers_for(BarrierPurpose::ModeTransition).collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].target, BarrierTarget::Output);
        assert_eq!(transitions[0].desc.dst_state, ImageState::STORAGE_WRITE_RAY_TRACING);

        // 这个 barrier 位于 trace rays 之前
        let steps: Vec<_> = plan.steps().collect();
        let transition_pos = steps
            .iter()
            .position(|s| matches!(s, FrameStep::ImageBarrier(b) if b.purpose == BarrierPurpose::ModeTransition))
            .unwrap();
        let trace_pos = steps.iter().position(|s| matches!(s, FrameStep::TraceRays { .. })).unwrap();
        let rebuild_pos = steps.iter().position(|s| matches!(s, FrameStep::RebuildTopLevel)).unwrap();
        assert!(transition_pos < rebuild_pos && rebuild_pos < trace_pos);

        for frame in 7..=12 {
            let plan = frames.run_frame(RenderPath::RayTrace);
            assert_eq!(mode_transitions(&plan), 0, "frame {frame}");
            assert!(plan.touches_ray_tracing());
        }
    }

    #[test]
    fn test_toggle_back_to_raster() {
        let mut frames = SimulatedFrames::new(800, 600);
        frames.run_frame(RenderPath::RayTrace);
        frames.run_frame(RenderPath::RayTrace);

        let plan = frames.run_frame(RenderPath::Rasterize);
        assert_eq!(mode_transitions(&plan), 1);
        let plan = frames.run_frame(RenderPath::Rasterize);
        assert_eq!(mode_transitions(&plan), 0);
        assert!(!plan.touches_ray_tracing());
    }

    #[test]
    fn test_resize_updates_present_copy_groups() {
        let mut frames = SimulatedFrames::new(800, 600);
        let plan = frames.run_frame(RenderPath::Rasterize);
        assert_eq!(plan.present_copy_group_count(), Some(glam::uvec3(25, 19, 1)));

        frames.resize(1920, 1080);
        let plan = frames.run_frame(RenderPath::Rasterize);
        assert_eq!(plan.present_copy_group_count(), Some(glam::uvec3(1920_u32.div_ceil(32), 1080_u32.div_ceil(32), 1)));
        assert_eq!(plan.present_copy_group_count(), Some(glam::uvec3(60, 34, 1)));

        // 新的输出 image 只需要初始化，不算路径切换
        assert_eq!(mode_transitions(&plan), 0);
        let init = plan.barriers().find(|b| b.target == BarrierTarget::Output).unwrap();
        assert_eq!(init.purpose, BarrierPurpose::RenderInput);
        assert_eq!(init.desc.src_state.layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_every_barrier_chains_from_previous_state() {
        let mut frames = SimulatedFrames::new(640, 480);
        let paths = [
            RenderPath::Rasterize,
            RenderPath::RayTrace,
            RenderPath::RayTrace,
            RenderPath::Rasterize,
            RenderPath::RayTrace,
        ];

        let mut last_output = frames.output.state();
        for path in paths {
            let plan = frames.run_frame(path);
            for barrier in plan.barriers().filter(|b| b.target == BarrierTarget::Output) {
                if barrier.purpose != BarrierPurpose::RenderInput {
                    assert_eq!(barrier.desc.src_state, last_output);
                }
                last_output = barrier.desc.dst_state;
            }
            assert_eq!(frames.output.state(), last_output);
            assert_eq!(frames.output.state(), path.expected_state());
        }
    }

    #[test]
    fn test_render_path_select() {
        assert_eq!(RenderPath::select(true, true), RenderPath::RayTrace);
        assert_eq!(RenderPath::select(true, false), RenderPath::Rasterize);
        assert_eq!(RenderPath::select(false, true), RenderPath::Rasterize);
    }
}
