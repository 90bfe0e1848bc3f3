//! 渲染器：持有所有 GPU 资源，驱动每一帧的录制、提交与呈现

use ash::vk;
use itertools::Itertools;
use truvis_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, submit_info::GfxSubmitInfo,
    },
    gfx::Gfx,
};
use truvis_gui_backend::gui_pass::GuiPass;

use crate::{
    frame::{
        executor::{FrameRecorder, execute_plan},
        frame_counter::FrameCounter,
        gpu_timer::{FrameTimings, GpuTimer, GpuTimerScope},
        orchestrator::{FrameRequest, FrameStates, RenderPath, plan_frame},
        plan::{BarrierTarget, PlannedBarrier, TimingPhase},
    },
    passes::{present_copy_pass::PresentCopyPass, raster_pass::RasterPass, rt_pass::RtPass},
    present::{AcquireOutcome, PresentContext},
    raytracing::acceleration_builder::AccelerationBuilder,
    resources::{
        render_targets::{GpuRenderTargetAllocator, RenderTargetSet, ResolutionResources},
        static_resources::{MeshData, SceneUniforms, StaticResources, TextureData},
    },
    settings::{DefaultRendererSettings, FrameLabel, RendererSettings},
};

/// 每个 frame slot 独占的命令资源
struct FrameSlot {
    command_pool: GfxCommandPool,
    cmd: GfxCommandBuffer,
    /// 该 slot 上一次提交的命令是否执行完毕
    fence: GfxFence,
}
impl FrameSlot {
    fn new(frame_label: FrameLabel) -> anyhow::Result<Self> {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{}", frame_label),
        )?;
        let cmd = GfxCommandBuffer::new(&command_pool, &format!("frame-{}", frame_label))?;
        // signaled：第一次使用时不需要等待
        let fence = GfxFence::new(true, &format!("frame-{}", frame_label))?;
        Ok(Self {
            command_pool,
            cmd,
            fence,
        })
    }

    fn destroy(self) {
        self.command_pool.free_command_buffers(vec![self.cmd]);
        self.command_pool.destroy();
        self.fence.destroy();
    }
}

/// 一帧所需的外部输入
pub struct FrameInput<'a> {
    pub settings: &'a RendererSettings,
    pub uniforms: SceneUniforms,
    /// 光追 instance 使用的 model 矩阵
    pub model: glam::Mat4,
    pub draw_data: &'a imgui::DrawData,
    /// swapchain 过期时按照该尺寸重建
    pub window_extent: vk::Extent2D,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// swapchain 过期或者窗口最小化，本帧没有渲染
    Skipped,
}

pub struct Renderer {
    frame_counter: FrameCounter,
    present: PresentContext,

    static_resources: StaticResources,
    acceleration: Option<AccelerationBuilder>,
    raster_pass: RasterPass,
    rt_pass: Option<RtPass>,
    present_copy_pass: PresentCopyPass,
    gui_pass: GuiPass,

    targets: ResolutionResources<GpuRenderTargetAllocator>,

    frame_slots: Vec<FrameSlot>,
    gpu_timer: GpuTimer,
}

// new & init
impl Renderer {
    /// `Gfx` 需要已经初始化
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        window_extent: vk::Extent2D,
        vsync: bool,
        mesh: &MeshData,
        texture: &TextureData,
        imgui: &mut imgui::Context,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Renderer::new");
        let present = PresentContext::new(raw_display_handle, raw_window_handle, window_extent, vsync)?;

        let static_resources = StaticResources::new(mesh, texture)?;
        let acceleration = if Gfx::get().rt_supported() {
            Some(AccelerationBuilder::create(&static_resources.acceleration_geometry(), &glam::Mat4::IDENTITY)?)
        } else {
            log::warn!("ray tracing is not supported by this device, fall back to rasterization");
            None
        };

        let depth_format = Gfx::get()
            .find_supported_format(
                DefaultRendererSettings::DEPTH_FORMAT_CANDIDATES,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("none of the depth formats is supported"))?;
        log::info!("depth format: {:?}", depth_format);

        let raster_pass = RasterPass::new(&static_resources, depth_format)?;
        let rt_pass = acceleration.as_ref().map(|acc| RtPass::new(&static_resources, acc)).transpose()?;
        let present_copy_pass = PresentCopyPass::new()?;
        let gui_pass =
            GuiPass::new(imgui, DefaultRendererSettings::OUTPUT_FORMAT, DefaultRendererSettings::FRAMES_IN_FLIGHT)?;

        let frame_slots = FrameLabel::all().into_iter().map(FrameSlot::new).collect::<anyhow::Result<Vec<_>>>()?;

        let mut renderer = Self {
            frame_counter: FrameCounter::new(1),
            present,
            static_resources,
            acceleration,
            raster_pass,
            rt_pass,
            present_copy_pass,
            gui_pass,
            targets: ResolutionResources::new(GpuRenderTargetAllocator, depth_format),
            frame_slots,
            gpu_timer: GpuTimer::new()?,
        };
        let extent = renderer.present.extent()?;
        renderer.targets.create_resolution_dependent_resources(extent)?;
        renderer.bind_resolution_dependent_resources()?;

        Ok(renderer)
    }

    /// render target 或者 swapchain 重建之后，更新引用它们的 descriptor
    fn bind_resolution_dependent_resources(&mut self) -> anyhow::Result<()> {
        let targets = self.targets.targets()?;
        if let Some(rt_pass) = &self.rt_pass {
            rt_pass.update_output(targets.output_view().handle());
        }
        self.present_copy_pass.rebuild_descriptor_sets(targets.output_view().handle(), &self.present.image_views()?)
    }
}

// getters
impl Renderer {
    #[inline]
    pub fn rt_supported(&self) -> bool {
        self.acceleration.is_some()
    }

    /// 最近一次读取到的 GPU 耗时，来自两帧之前
    #[inline]
    pub fn gpu_timings(&self) -> &FrameTimings {
        self.gpu_timer.latest()
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }

    pub fn extent(&self) -> anyhow::Result<vk::Extent2D> {
        Ok(self.targets.targets()?.extent())
    }
}

// update
impl Renderer {
    /// 等待 GPU idle，重建 swapchain 以及所有与分辨率相关的资源
    ///
    /// 窗口最小化时不做任何事，返回 false
    pub fn resize(&mut self, window_extent: vk::Extent2D) -> anyhow::Result<bool> {
        if window_extent.width == 0 || window_extent.height == 0 {
            return Ok(false);
        }
        let _span = tracy_client::span!("Renderer::resize");
        log::info!("resize to {}x{}", window_extent.width, window_extent.height);

        Gfx::get().wait_idle()?;
        self.present.rebuild_swapchain(window_extent)?;
        self.targets.destroy_resolution_dependent_resources();
        self.targets.create_resolution_dependent_resources(self.present.extent()?)?;
        self.bind_resolution_dependent_resources()?;
        Ok(true)
    }

    /// vsync 改变时通过 resize 流程重建 swapchain
    pub fn set_vsync(&mut self, vsync: bool, window_extent: vk::Extent2D) -> anyhow::Result<()> {
        if self.present.vsync() == vsync {
            return Ok(());
        }
        log::info!("vsync: {}", vsync);
        self.present.set_vsync(vsync);
        self.resize(window_extent)?;
        Ok(())
    }

    pub fn render_frame(&mut self, input: &FrameInput) -> anyhow::Result<FrameOutcome> {
        let _span = tracy_client::span!("render_frame");
        let frame_label = self.frame_counter.frame_label();
        let frame_id = self.frame_counter.frame_id();

        // BEGIN：slot 上一次的命令执行完毕之后才能复用它的资源
        {
            let _span = tracy_client::span!("wait_frame_slot");
            self.frame_slots[*frame_label].fence.wait()?;
        }
        self.gpu_timer.collect(frame_label)?;

        // ACQUIRE
        let image_index = match self.present.acquire(frame_label)? {
            AcquireOutcome::Acquired { image_index } => image_index,
            AcquireOutcome::NeedRecreate => {
                self.resize(input.window_extent)?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        let slot = &self.frame_slots[*frame_label];
        slot.fence.reset()?;
        slot.command_pool.reset_all_buffers()?;

        let path = RenderPath::select(input.settings.raytracing, self.rt_supported());
        self.static_resources.scene_uniforms().write(frame_label, &input.uniforms)?;
        if path == RenderPath::RayTrace {
            if let Some(acceleration) = &mut self.acceleration {
                acceleration.update_instance(frame_label, &input.model)?;
            }
        }
        if input.settings.show_ui {
            self.gui_pass.prepare(*frame_label, input.draw_data)?;
        }

        // RENDER / OVERLAY / PRESENT_COPY
        let targets = self.targets.targets_mut()?;
        let extent = targets.extent();
        let plan = {
            let (output, depth) = targets.states_mut();
            plan_frame(
                &FrameRequest {
                    path,
                    image_index,
                    extent,
                },
                FrameStates {
                    output,
                    depth,
                    swapchain_image: self.present.image_state_mut(image_index)?,
                },
            )
        };

        let swapchain_images = self.present.images()?;
        let slot = &self.frame_slots[*frame_label];
        let cmd = &slot.cmd;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &self.frame_counter.frame_name())?;
        self.gpu_timer.reset_slot(cmd, frame_label, frame_id);
        {
            let mut recorder = GpuFrameRecorder {
                cmd,
                frame_label,
                settings: input.settings,
                draw_data: input.draw_data,
                timer: &self.gpu_timer,
                scopes: vec![],
                static_resources: &self.static_resources,
                raster_pass: &self.raster_pass,
                rt_pass: self.rt_pass.as_ref(),
                acceleration: self.acceleration.as_mut(),
                present_copy_pass: &self.present_copy_pass,
                gui_pass: &self.gui_pass,
                targets: self.targets.targets()?,
                swapchain_images: &swapchain_images,
            };
            execute_plan(&plan, &mut recorder)?;
        }
        cmd.end()?;

        // SUBMIT / PRESENT
        // present copy 是第一个写 swapchain image 的操作
        let submit_info = GfxSubmitInfo::new(std::slice::from_ref(cmd))
            .wait(self.present.acquire_semaphore(frame_label), vk::PipelineStageFlags2::COMPUTE_SHADER)
            .signal(self.present.render_complete_semaphore(image_index)?, vk::PipelineStageFlags2::ALL_COMMANDS);
        Gfx::get().gfx_queue().submit(vec![submit_info], Some(&slot.fence))?;

        let need_recreate = self.present.present(image_index)?;
        self.frame_counter.next_frame();
        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }

        if need_recreate {
            self.resize(input.window_extent)?;
        }
        Ok(FrameOutcome::Presented)
    }
}

// destroy
impl Renderer {
    pub fn destroy(self) {
        if let Err(e) = Gfx::get().wait_idle() {
            log::error!("wait idle before renderer destroy: {:?}", e);
        }

        let Self {
            present,
            static_resources,
            acceleration,
            raster_pass,
            rt_pass,
            present_copy_pass,
            gui_pass,
            mut targets,
            frame_slots,
            gpu_timer,
            ..
        } = self;

        gui_pass.destroy();
        targets.destroy_resolution_dependent_resources();

        present_copy_pass.destroy();
        if let Some(rt_pass) = rt_pass {
            rt_pass.destroy();
        }
        raster_pass.destroy();
        if let Some(acceleration) = acceleration {
            acceleration.destroy();
        }
        static_resources.destroy();
        gpu_timer.destroy();
        frame_slots.into_iter().for_each(FrameSlot::destroy);

        present.destroy();
    }
}

/// 把 plan 中的 step 录制到 GPU command buffer
struct GpuFrameRecorder<'a> {
    cmd: &'a GfxCommandBuffer,
    frame_label: FrameLabel,
    settings: &'a RendererSettings,
    draw_data: &'a imgui::DrawData,

    timer: &'a GpuTimer,
    /// 当前打开的计时区间，按照嵌套顺序
    scopes: Vec<GpuTimerScope<'a>>,

    static_resources: &'a StaticResources,
    raster_pass: &'a RasterPass,
    rt_pass: Option<&'a RtPass>,
    acceleration: Option<&'a mut AccelerationBuilder>,
    present_copy_pass: &'a PresentCopyPass,
    gui_pass: &'a GuiPass,

    targets: &'a RenderTargetSet<GpuRenderTargetAllocator>,
    swapchain_images: &'a [vk::Image],
}
impl GpuFrameRecorder<'_> {
    fn image_handle(&self, target: BarrierTarget) -> vk::Image {
        match target {
            BarrierTarget::Output => self.targets.output_image().handle(),
            BarrierTarget::Depth => self.targets.depth_image().handle(),
            BarrierTarget::Swapchain(idx) => self.swapchain_images.get(idx).copied().unwrap_or_default(),
        }
    }
}
impl FrameRecorder for GpuFrameRecorder<'_> {
    fn begin_phase(&mut self, phase: TimingPhase) {
        self.scopes.push(self.timer.scope(self.cmd, self.frame_label, phase));
    }

    fn end_phase(&mut self, _phase: TimingPhase) {
        self.scopes.pop();
    }

    fn image_barriers(&mut self, barriers: &[PlannedBarrier]) {
        let barriers = barriers.iter().map(|b| b.desc.to_gfx_barrier(self.image_handle(b.target))).collect_vec();
        self.cmd.image_barriers(&barriers);
    }

    fn rebuild_top_level(&mut self) -> anyhow::Result<()> {
        let acceleration =
            self.acceleration.as_deref_mut().ok_or_else(|| anyhow::anyhow!("acceleration structures are not built"))?;
        acceleration.rebuild_top_level(self.cmd);
        Ok(())
    }

    fn draw_raster(&mut self) -> anyhow::Result<()> {
        self.raster_pass.draw(
            self.cmd,
            self.targets.output_view().handle(),
            self.targets.depth_view().handle(),
            self.targets.extent(),
            self.static_resources,
            self.frame_label,
            self.settings.show_texture_lod,
        );
        Ok(())
    }

    fn trace_rays(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
        let rt_pass = self.rt_pass.ok_or_else(|| anyhow::anyhow!("ray tracing pipeline is not created"))?;
        rt_pass.trace(
            self.cmd,
            extent,
            self.static_resources,
            self.frame_label,
            self.settings.spp4,
            self.settings.show_texture_lod,
        );
        Ok(())
    }

    fn draw_overlay(&mut self) -> anyhow::Result<()> {
        if self.settings.show_ui {
            self.gui_pass.draw(
                self.cmd,
                *self.frame_label,
                self.targets.overlay_view().handle(),
                self.targets.extent(),
                self.draw_data,
            );
        }
        Ok(())
    }

    fn present_copy(&mut self, image_index: usize, group_count: glam::UVec3, extent: vk::Extent2D) -> anyhow::Result<()> {
        self.present_copy_pass.dispatch(self.cmd, image_index, group_count, extent)
    }
}
impl Drop for GpuFrameRecorder<'_> {
    fn drop(&mut self) {
        // 由内向外关闭计时区间
        while let Some(scope) = self.scopes.pop() {
            drop(scope);
        }
    }
}
