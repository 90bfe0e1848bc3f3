//! 一帧要录制的内容
//!
//! plan 只描述"做什么、按什么顺序、需要哪些 barrier"，不接触任何 vk handle，
//! 由 executor 负责把它录制到 command buffer 中。

use ash::vk;
use truvis_render_sync::barrier::ImageBarrierDesc;

/// 需要 GPU 计时的阶段；Frame 包住其余所有阶段
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimingPhase {
    Frame,
    Draw,
    Ui,
    PresentCopy,
}
impl TimingPhase {
    pub const COUNT: usize = 4;
    pub const ALL: [TimingPhase; Self::COUNT] = [Self::Frame, Self::Draw, Self::Ui, Self::PresentCopy];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Draw => "draw",
            Self::Ui => "ui",
            Self::PresentCopy => "present-copy",
        }
    }
}

/// barrier 作用的 image
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierTarget {
    Output,
    Depth,
    /// swapchain image 的 index
    Swapchain(usize),
}

/// barrier 产生的原因，只用于调试和测试
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierPurpose {
    /// 渲染路径切换后，输出 image 需要进入新路径期望的状态
    ModeTransition,
    /// 渲染之前的准备（初次使用的输出 image、每帧的 depth）
    RenderInput,
    Overlay,
    PresentCopy,
    /// present copy 之后，把输出 image 交给下一帧的渲染路径
    Handoff,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlannedBarrier {
    pub target: BarrierTarget,
    pub desc: ImageBarrierDesc,
    pub purpose: BarrierPurpose,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStep {
    ImageBarrier(PlannedBarrier),
    /// TLAS update，包含其自身的 buffer barrier
    RebuildTopLevel,
    DrawRaster,
    TraceRays { extent: vk::Extent2D },
    DrawOverlay,
    PresentCopy {
        image_index: usize,
        group_count: glam::UVec3,
        extent: vk::Extent2D,
    },
}

#[derive(Clone, Debug)]
pub struct PlannedPhase {
    pub phase: TimingPhase,
    pub steps: Vec<FrameStep>,
}

/// 一帧的所有阶段，按录制顺序排列；整体包在 [`TimingPhase::Frame`] 中
#[derive(Clone, Debug, Default)]
pub struct FramePlan {
    pub phases: Vec<PlannedPhase>,
}

impl FramePlan {
    pub(crate) fn push_phase(&mut self, phase: TimingPhase) -> &mut Vec<FrameStep> {
        let idx = self.phases.len();
        self.phases.push(PlannedPhase { phase, steps: vec![] });
        &mut self.phases[idx].steps
    }

    /// 按顺序遍历所有 step
    pub fn steps(&self) -> impl Iterator<Item = &FrameStep> {
        self.phases.iter().flat_map(|phase| phase.steps.iter())
    }

    pub fn barriers(&self) -> impl Iterator<Item = &PlannedBarrier> {
        self.steps().filter_map(|step| match step {
            FrameStep::ImageBarrier(barrier) => Some(barrier),
            _ => None,
        })
    }

    pub fn barriers_for(&self, purpose: BarrierPurpose) -> impl Iterator<Item = &PlannedBarrier> {
        self.barriers().filter(move |barrier| barrier.purpose == purpose)
    }

    /// 帧内是否有任何涉及光追阶段的同步或者命令
    pub fn touches_ray_tracing(&self) -> bool {
        self.steps().any(|step| match step {
            FrameStep::ImageBarrier(barrier) => barrier.desc.touches_ray_tracing(),
            FrameStep::RebuildTopLevel | FrameStep::TraceRays { .. } => true,
            _ => false,
        })
    }

    pub fn present_copy_group_count(&self) -> Option<glam::UVec3> {
        self.steps().find_map(|step| match step {
            FrameStep::PresentCopy { group_count, .. } => Some(*group_count),
            _ => None,
        })
    }
}
