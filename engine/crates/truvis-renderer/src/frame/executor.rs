//! 按照 [`FramePlan`] 的顺序录制命令
//!
//! executor 只负责遍历和分组：每个阶段包在一个计时区间中，整帧再包一层 [`TimingPhase::Frame`]，
//! 连续的 image barrier 合并为一次 pipeline barrier。具体命令由 [`FrameRecorder`] 录制。

use anyhow::Context;
use ash::vk;

use crate::frame::plan::{FramePlan, FrameStep, PlannedBarrier, TimingPhase};

pub trait FrameRecorder {
    fn begin_phase(&mut self, phase: TimingPhase);
    fn end_phase(&mut self, phase: TimingPhase);

    fn image_barriers(&mut self, barriers: &[PlannedBarrier]);

    fn rebuild_top_level(&mut self) -> anyhow::Result<()>;
    fn draw_raster(&mut self) -> anyhow::Result<()>;
    fn trace_rays(&mut self, extent: vk::Extent2D) -> anyhow::Result<()>;
    fn draw_overlay(&mut self) -> anyhow::Result<()>;
    fn present_copy(&mut self, image_index: usize, group_count: glam::UVec3, extent: vk::Extent2D)
    -> anyhow::Result<()>;
}

/// 把 `pending` 中累积的 barrier 一次性录制
fn flush_barriers(recorder: &mut impl FrameRecorder, pending: &mut Vec<PlannedBarrier>) {
    if !pending.is_empty() {
        recorder.image_barriers(pending);
        pending.clear();
    }
}

fn record_step(recorder: &mut impl FrameRecorder, step: &FrameStep) -> anyhow::Result<()> {
    match *step {
        FrameStep::ImageBarrier(barrier) => {
            recorder.image_barriers(&[barrier]);
            Ok(())
        }
        FrameStep::RebuildTopLevel => recorder.rebuild_top_level(),
        FrameStep::DrawRaster => recorder.draw_raster(),
        FrameStep::TraceRays { extent } => recorder.trace_rays(extent),
        FrameStep::DrawOverlay => recorder.draw_overlay(),
        FrameStep::PresentCopy {
            image_index,
            group_count,
            extent,
        } => recorder.present_copy(image_index, group_count, extent),
    }
}

fn record_phase_steps(recorder: &mut impl FrameRecorder, steps: &[FrameStep]) -> anyhow::Result<()> {
    let mut pending = Vec::new();
    for step in steps {
        if let FrameStep::ImageBarrier(barrier) = step {
            pending.push(*barrier);
        } else {
            flush_barriers(recorder, &mut pending);
            record_step(recorder, step)?;
        }
    }
    // barrier 不跨越阶段，保证计时区间包含本阶段的同步
    flush_barriers(recorder, &mut pending);
    Ok(())
}

fn record_phases(recorder: &mut impl FrameRecorder, plan: &FramePlan) -> anyhow::Result<()> {
    for phase in &plan.phases {
        recorder.begin_phase(phase.phase);
        let result = record_phase_steps(recorder, &phase.steps);
        recorder.end_phase(phase.phase);
        result.with_context(|| format!("record phase: {}", phase.phase.name()))?;
    }
    Ok(())
}

/// 出错时同样会按照由内向外的顺序关闭所有已经打开的计时区间
pub fn execute_plan(plan: &FramePlan, recorder: &mut impl FrameRecorder) -> anyhow::Result<()> {
    let _span = tracy_client::span!("execute_plan");

    recorder.begin_phase(TimingPhase::Frame);
    let result = record_phases(recorder, plan);
    recorder.end_phase(TimingPhase::Frame);

    result
}

#[cfg(test)]
mod tests {
    use truvis_render_sync::tracker::TrackedImage;

    use super::*;
    use crate::frame::{
        orchestrator::{FrameRequest, FrameStates, RenderPath, plan_frame},
        plan::BarrierPurpose,
    };

    #[derive(Debug, PartialEq)]
    enum Event {
        Begin(TimingPhase),
        End(TimingPhase),
        Barriers(Vec<BarrierPurpose>),
        Rebuild,
        Raster,
        Trace,
        Overlay,
        Copy(glam::UVec3),
    }

    #[derive(Default)]
    struct LogRecorder {
        events: Vec<Event>,
    }
    impl FrameRecorder for LogRecorder {
        fn begin_phase(&mut self, phase: TimingPhase) {
            self.events.push(Event::Begin(phase));
        }
        fn end_phase(&mut self, phase: TimingPhase) {
            self.events.push(Event::End(phase));
        }
        fn image_barriers(&mut self, barriers: &[PlannedBarrier]) {
            self.events.push(Event::Barriers(barriers.iter().map(|b| b.purpose).collect()));
        }
        fn rebuild_top_level(&mut self) -> anyhow::Result<()> {
            self.events.push(Event::Rebuild);
            Ok(())
        }
        fn draw_raster(&mut self) -> anyhow::Result<()> {
            self.events.push(Event::Raster);
            Ok(())
        }
        fn trace_rays(&mut self, _extent: vk::Extent2D) -> anyhow::Result<()> {
            self.events.push(Event::Trace);
            Ok(())
        }
        fn draw_overlay(&mut self) -> anyhow::Result<()> {
            self.events.push(Event::Overlay);
            Ok(())
        }
        fn present_copy(
            &mut self,
            _image_index: usize,
            group_count: glam::UVec3,
            _extent: vk::Extent2D,
        ) -> anyhow::Result<()> {
            self.events.push(Event::Copy(group_count));
            Ok(())
        }
    }

    fn make_plan(path: RenderPath, output: &mut TrackedImage) -> FramePlan {
        let mut depth = TrackedImage::new("depth", vk::ImageAspectFlags::DEPTH);
        let mut swapchain = TrackedImage::new("swapchain", vk::ImageAspectFlags::COLOR);
        plan_frame(
            &FrameRequest {
                path,
                image_index: 0,
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
            },
            FrameStates {
                output,
                depth: &mut depth,
                swapchain_image: &mut swapchain,
            },
        )
    }

    #[test]
    fn test_raster_frame_recording_order() {
        let mut output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let plan = make_plan(RenderPath::Rasterize, &mut output);

        let mut recorder = LogRecorder::default();
        execute_plan(&plan, &mut recorder).unwrap();

        use BarrierPurpose::*;
        assert_eq!(
            recorder.events,
            [
                Event::Begin(TimingPhase::Frame),
                Event::Begin(TimingPhase::Draw),
                Event::Barriers(vec![RenderInput, RenderInput]),
                Event::Raster,
                Event::End(TimingPhase::Draw),
                Event::Begin(TimingPhase::Ui),
                Event::Barriers(vec![Overlay]),
                Event::Overlay,
                Event::Barriers(vec![Overlay]),
                Event::End(TimingPhase::Ui),
                Event::Begin(TimingPhase::PresentCopy),
                Event::Barriers(vec![PresentCopy]),
                Event::Copy(glam::uvec3(25, 19, 1)),
                Event::Barriers(vec![PresentCopy, Handoff]),
                Event::End(TimingPhase::PresentCopy),
                Event::End(TimingPhase::Frame),
            ]
        );
    }

    #[test]
    fn test_ray_tracing_frame_rebuilds_before_trace() {
        let mut output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        make_plan(RenderPath::Rasterize, &mut output);
        let plan = make_plan(RenderPath::RayTrace, &mut output);

        let mut recorder = LogRecorder::default();
        execute_plan(&plan, &mut recorder).unwrap();

        let draw_events: Vec<_> = recorder
            .events
            .iter()
            .skip_while(|e| **e != Event::Begin(TimingPhase::Draw))
            .take_while(|e| **e != Event::End(TimingPhase::Draw))
            .collect();
        assert_eq!(
            draw_events,
            [
                &Event::Begin(TimingPhase::Draw),
                &Event::Barriers(vec![BarrierPurpose::ModeTransition]),
                &Event::Rebuild,
                &Event::Trace,
            ]
        );
    }

    /// 每个 End 都必须关闭最内层的 Begin，结束时没有打开的区间
    fn assert_phases_balanced(events: &[Event]) {
        let mut open = Vec::new();
        for event in events {
            match event {
                Event::Begin(phase) => open.push(*phase),
                Event::End(phase) => assert_eq!(open.pop(), Some(*phase), "events: {:?}", events),
                _ => {}
            }
        }
        assert!(open.is_empty(), "unclosed phases {:?}", open);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Raster,
        Copy,
    }

    struct FailingRecorder {
        log: LogRecorder,
        fail_at: FailAt,
    }
    impl FrameRecorder for FailingRecorder {
        fn begin_phase(&mut self, phase: TimingPhase) {
            self.log.begin_phase(phase)
        }
        fn end_phase(&mut self, phase: TimingPhase) {
            self.log.end_phase(phase)
        }
        fn image_barriers(&mut self, barriers: &[PlannedBarrier]) {
            self.log.image_barriers(barriers)
        }
        fn rebuild_top_level(&mut self) -> anyhow::Result<()> {
            self.log.rebuild_top_level()
        }
        fn draw_raster(&mut self) -> anyhow::Result<()> {
            if self.fail_at == FailAt::Raster {
                anyhow::bail!("raster pipeline is not created");
            }
            self.log.draw_raster()
        }
        fn trace_rays(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
            self.log.trace_rays(extent)
        }
        fn draw_overlay(&mut self) -> anyhow::Result<()> {
            self.log.draw_overlay()
        }
        fn present_copy(&mut self, image_index: usize, groups: glam::UVec3, extent: vk::Extent2D) -> anyhow::Result<()> {
            if self.fail_at == FailAt::Copy {
                anyhow::bail!("no descriptor set for swapchain image {image_index}");
            }
            self.log.present_copy(image_index, groups, extent)
        }
    }

    #[test]
    fn test_successful_frame_phases_balanced() {
        let mut output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let plan = make_plan(RenderPath::Rasterize, &mut output);
        let mut recorder = LogRecorder::default();
        execute_plan(&plan, &mut recorder).unwrap();
        assert_phases_balanced(&recorder.events);
    }

    #[test]
    fn test_present_copy_error_propagates() {
        let mut output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let plan = make_plan(RenderPath::Rasterize, &mut output);
        let mut recorder = FailingRecorder {
            log: LogRecorder::default(),
            fail_at: FailAt::Copy,
        };
        assert!(execute_plan(&plan, &mut recorder).is_err());

        let events = &recorder.log.events;
        assert_phases_balanced(events);
        assert_eq!(
            events[events.len() - 2..],
            [Event::End(TimingPhase::PresentCopy), Event::End(TimingPhase::Frame)]
        );
    }

    #[test]
    fn test_draw_error_closes_open_phases() {
        let mut output = TrackedImage::new("output", vk::ImageAspectFlags::COLOR);
        let plan = make_plan(RenderPath::Rasterize, &mut output);
        let mut recorder = FailingRecorder {
            log: LogRecorder::default(),
            fail_at: FailAt::Raster,
        };
        let err = execute_plan(&plan, &mut recorder).unwrap_err();
        assert!(format!("{:#}", err).contains("raster pipeline is not created"));

        let events = &recorder.log.events;
        assert_phases_balanced(events);
        // 后续阶段不再录制
        assert!(!events.contains(&Event::Begin(TimingPhase::Ui)));
        assert!(!events.contains(&Event::Overlay));
        assert_eq!(
            events[events.len() - 2..],
            [Event::End(TimingPhase::Draw), Event::End(TimingPhase::Frame)]
        );
    }
}
