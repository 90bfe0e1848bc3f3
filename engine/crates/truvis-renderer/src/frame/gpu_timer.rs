//! 基于 timestamp query 的 GPU 计时
//!
//! 每个 frame slot 占用 `TimingPhase::COUNT * 2` 个 query，
//! 在 slot 的 fence 被 signal 之后读取，因此读取时不会阻塞。

use ash::vk;
use truvis_gfx::{basic::color::LabelColor, commands::command_buffer::GfxCommandBuffer, gfx::Gfx, query::query_pool::GfxQueryPool};

use crate::{
    frame::plan::TimingPhase,
    settings::{DefaultRendererSettings, FrameLabel},
};

const QUERIES_PER_SLOT: u32 = TimingPhase::COUNT as u32 * 2;

/// 某个 phase 的 begin / end 在 query pool 中的位置
#[inline]
pub fn query_index(frame_label: FrameLabel, phase: TimingPhase, is_end: bool) -> u32 {
    (*frame_label as u32 * TimingPhase::COUNT as u32 + phase.index() as u32) * 2 + is_end as u32
}

/// 两个 timestamp 之间的毫秒数；timestamp 计数器允许回绕
#[inline]
pub fn interval_ms(begin: u64, end: u64, timestamp_period_ns: f32) -> f32 {
    (end.wrapping_sub(begin) as f64 * timestamp_period_ns as f64 / 1e6) as f32
}

/// 一帧中各个阶段的 GPU 耗时（毫秒）
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrameTimings {
    pub frame_id: u64,
    pub phase_ms: [f32; TimingPhase::COUNT],
}
impl FrameTimings {
    /// 从一个 slot 的原始 timestamp 计算
    pub fn from_raw(frame_id: u64, raw: &[u64], timestamp_period_ns: f32) -> Self {
        let mut phase_ms = [0.0; TimingPhase::COUNT];
        for (phase_ms, pair) in phase_ms.iter_mut().zip(raw.chunks_exact(2)) {
            *phase_ms = interval_ms(pair[0], pair[1], timestamp_period_ns);
        }
        Self { frame_id, phase_ms }
    }

    #[inline]
    pub fn get(&self, phase: TimingPhase) -> f32 {
        self.phase_ms[phase.index()]
    }
}

pub struct GpuTimer {
    query_pool: GfxQueryPool,
    timestamp_period_ns: f32,

    /// 每个 slot 记录的是哪一帧，None 表示该 slot 还没有可读取的结果
    pending: [Option<u64>; DefaultRendererSettings::FRAMES_IN_FLIGHT],
    latest: FrameTimings,
}

// new & init
impl GpuTimer {
    pub fn new() -> anyhow::Result<Self> {
        let query_pool = GfxQueryPool::new(
            vk::QueryType::TIMESTAMP,
            QUERIES_PER_SLOT * DefaultRendererSettings::FRAMES_IN_FLIGHT as u32,
            "gpu-timer",
        )?;
        Ok(Self {
            query_pool,
            timestamp_period_ns: Gfx::get().timestamp_period(),
            pending: [None; DefaultRendererSettings::FRAMES_IN_FLIGHT],
            latest: FrameTimings::default(),
        })
    }
}

// getters
impl GpuTimer {
    /// 最近一次读取到的结果
    #[inline]
    pub fn latest(&self) -> &FrameTimings {
        &self.latest
    }
}

// update
impl GpuTimer {
    /// 录制当前 slot 的第一个命令之前调用
    pub fn reset_slot(&mut self, cmd: &GfxCommandBuffer, frame_label: FrameLabel, frame_id: u64) {
        cmd.reset_query_pool(&self.query_pool, *frame_label as u32 * QUERIES_PER_SLOT, QUERIES_PER_SLOT);
        self.pending[*frame_label] = Some(frame_id);
    }

    /// 需要在该 slot 的 fence signal 之后调用
    pub fn collect(&mut self, frame_label: FrameLabel) -> anyhow::Result<Option<FrameTimings>> {
        let Some(frame_id) = self.pending[*frame_label].take() else {
            return Ok(None);
        };
        let raw = self.query_pool.get_query_result_u64(*frame_label as u32 * QUERIES_PER_SLOT, QUERIES_PER_SLOT)?;
        self.latest = FrameTimings::from_raw(frame_id, &raw, self.timestamp_period_ns);
        Ok(Some(self.latest))
    }

    /// 开始一个计时区间，区间在返回值 drop 时结束
    pub fn scope<'a>(
        &'a self,
        cmd: &'a GfxCommandBuffer,
        frame_label: FrameLabel,
        phase: TimingPhase,
    ) -> GpuTimerScope<'a> {
        cmd.begin_label(phase.name(), LabelColor::COLOR_STAGE);
        cmd.write_timestamp(
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            &self.query_pool,
            query_index(frame_label, phase, false),
        );
        GpuTimerScope {
            timer: self,
            cmd,
            frame_label,
            phase,
        }
    }
}

// destroy
impl GpuTimer {
    pub fn destroy(self) {
        self.query_pool.destroy();
    }
}

/// RAII 的计时区间，同时也是一个 debug label 区间
pub struct GpuTimerScope<'a> {
    timer: &'a GpuTimer,
    cmd: &'a GfxCommandBuffer,
    frame_label: FrameLabel,
    phase: TimingPhase,
}
impl Drop for GpuTimerScope<'_> {
    fn drop(&mut self) {
        self.cmd.write_timestamp(
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            &self.timer.query_pool,
            query_index(self.frame_label, self.phase, true),
        );
        self.cmd.end_label();
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_query_indices_are_unique_and_in_range() {
        let indices = FrameLabel::all()
            .into_iter()
            .cartesian_product(TimingPhase::ALL)
            .flat_map(|(label, phase)| [query_index(label, phase, false), query_index(label, phase, true)])
            .collect_vec();

        assert_eq!(indices.len(), 16);
        assert!(indices.iter().all_unique());
        assert!(indices.iter().all(|idx| *idx < QUERIES_PER_SLOT * DefaultRendererSettings::FRAMES_IN_FLIGHT as u32));

        // 每个 slot 的 query 是连续的一段，可以一次 reset
        assert_eq!(query_index(FrameLabel::B, TimingPhase::Frame, false), QUERIES_PER_SLOT);
    }

    #[test]
    fn test_interval_with_period() {
        assert!((interval_ms(1_000, 2_000_000, 1.0) - 1.999).abs() < 1e-6);
        assert!((interval_ms(0, 1_000_000, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_interval_wraps_around() {
        let ms = interval_ms(u64::MAX - 499_999, 500_000, 1.0);
        assert!((ms - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_timings_from_raw() {
        let raw = [0, 4_000_000, 0, 2_000_000, 2_000_000, 3_000_000, 3_000_000, 4_000_000];
        let timings = FrameTimings::from_raw(7, &raw, 1.0);
        assert_eq!(timings.frame_id, 7);
        assert_eq!(timings.get(TimingPhase::Frame), 4.0);
        assert_eq!(timings.get(TimingPhase::Draw), 2.0);
        assert_eq!(timings.get(TimingPhase::Ui), 1.0);
        assert_eq!(timings.get(TimingPhase::PresentCopy), 1.0);
    }
}
