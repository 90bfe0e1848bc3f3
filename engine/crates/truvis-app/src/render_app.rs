use std::{ffi::CStr, time::Instant};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use truvis_crate_tools::{init_log::init_log, truvis_path::TruvisPath};
use truvis_gfx::gfx::Gfx;
use truvis_renderer::{
    renderer::{FrameInput, Renderer},
    resources::static_resources::{MeshData, TextureData},
    settings::RendererSettings,
};

use crate::{
    app_config::AppConfig,
    assets::{load_mesh_or_cube, load_texture_or_checkerboard},
    gui_front::GuiHost,
    overlay::{OverlayPanel, OverlayStats},
    platform::input_event::{ElementState, InputEvent, KeyCode},
    scene::{CAMERA_STEP, SceneAnimation},
};

/// 按键对应的操作
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyAction {
    ToggleOverlay,
    /// 相机靠近原点
    CameraForward,
    CameraBackward,
}
impl KeyAction {
    pub fn from_key(key_code: KeyCode) -> Option<Self> {
        match key_code {
            KeyCode::F10 => Some(Self::ToggleOverlay),
            KeyCode::KeyW | KeyCode::ArrowUp => Some(Self::CameraForward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(Self::CameraBackward),
            KeyCode::Other => None,
        }
    }

    pub fn apply(self, settings: &mut RendererSettings, scene: &mut SceneAnimation) {
        match self {
            Self::ToggleOverlay => settings.show_ui = !settings.show_ui,
            Self::CameraForward => scene.move_camera_z(-CAMERA_STEP),
            Self::CameraBackward => scene.move_camera_z(CAMERA_STEP),
        }
    }
}

pub struct RenderApp {
    config: AppConfig,
    settings: RendererSettings,
    scene: SceneAnimation,
    gui_host: GuiHost,
    overlay: OverlayPanel,

    /// window 创建之后才能创建
    renderer: Option<Renderer>,
    /// 在 renderer 创建之后释放
    pending_assets: Option<(MeshData, TextureData)>,

    window_extent: vk::Extent2D,
    last_frame_time: Instant,
    /// 启动时记录，用于致命错误的诊断输出
    device_diagnostics: String,
}
// new & init
impl RenderApp {
    pub fn init_env() {
        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }

    /// 初始化 Gfx 并加载资源，此时还没有 window
    pub fn new(raw_display_handle: RawDisplayHandle, config: AppConfig) -> anyhow::Result<Self> {
        // 追加 window system 需要的 extension，在 windows 下也就是 khr::Surface
        let extra_instance_ext = ash_window::enumerate_required_extensions(raw_display_handle)?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect_vec();
        Gfx::init(&config.window.title, &extra_instance_ext, config.validation)?;
        let device_diagnostics = Gfx::get().physical_device().diagnostics();

        let mesh = load_mesh_or_cube(&TruvisPath::assets_path(&config.assets.mesh), config.assets.mesh_scale);
        let texture = load_texture_or_checkerboard(&TruvisPath::assets_path(&config.assets.texture));

        Ok(Self {
            settings: config.initial_settings(),
            window_extent: vk::Extent2D {
                width: config.window.width,
                height: config.window.height,
            },
            config,
            scene: SceneAnimation::default(),
            gui_host: GuiHost::new(),
            overlay: OverlayPanel::default(),
            renderer: None,
            pending_assets: Some((mesh, texture)),
            last_frame_time: Instant::now(),
            device_diagnostics,
        })
    }

    pub fn init_after_window(
        &mut self,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        let (mesh, texture) =
            self.pending_assets.take().ok_or_else(|| anyhow::anyhow!("renderer is already initialized"))?;

        self.window_extent = window_extent;
        self.gui_host.set_display_size(window_extent.width, window_extent.height);
        let renderer = Renderer::new(
            raw_display_handle,
            raw_window_handle,
            window_extent,
            self.settings.vsync,
            &mesh,
            &texture,
            &mut self.gui_host.imgui_ctx,
        )?;

        if self.settings.raytracing && !renderer.rt_supported() {
            log::warn!("ray tracing is requested but not supported");
            self.settings.raytracing = false;
        }
        self.renderer = Some(renderer);
        self.last_frame_time = Instant::now();
        Ok(())
    }
}
// getters
impl RenderApp {
    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[inline]
    pub fn device_diagnostics(&self) -> &str {
        &self.device_diagnostics
    }
}
// update
impl RenderApp {
    pub fn handle_event(&mut self, event: &InputEvent) {
        self.gui_host.handle_event(event);

        let InputEvent::KeyboardInput {
            key_code,
            state: ElementState::Pressed,
            ..
        } = event
        else {
            return;
        };
        if self.gui_host.want_capture_keyboard() {
            return;
        }
        if let Some(action) = KeyAction::from_key(*key_code) {
            action.apply(&mut self.settings, &mut self.scene);
        }
    }

    pub fn on_window_resized(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.window_extent = vk::Extent2D { width, height };
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(self.window_extent)?;
        }
        Ok(())
    }

    /// 一帧：更新动画，构建 UI，渲染并呈现
    pub fn big_update(&mut self) -> anyhow::Result<()> {
        let Some(renderer) = &mut self.renderer else {
            return Ok(());
        };
        // 最小化时不渲染
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let delta = now - self.last_frame_time;
        self.last_frame_time = now;
        self.scene.advance(delta, self.settings.animate);

        // build Gui ==================================
        {
            let _span = tracy_client::span!("Update Gui");
            let framerate = self.gui_host.framerate();
            let settings = &mut self.settings;
            let overlay = &mut self.overlay;
            let stats = OverlayStats {
                framerate,
                gpu_timings: renderer.gpu_timings(),
                rt_supported: renderer.rt_supported(),
            };
            self.gui_host.new_frame(delta, |ui| {
                if settings.show_ui {
                    overlay.build(ui, settings, &stats);
                }
            });
        }
        if !renderer.rt_supported() {
            self.settings.raytracing = false;
        }
        renderer.set_vsync(self.settings.vsync, self.window_extent)?;

        // Renderer: Render ================================
        let uniforms = self.scene.uniforms(renderer.extent()?);
        let draw_data = self.gui_host.compile_ui();
        renderer.render_frame(&FrameInput {
            settings: &self.settings,
            uniforms,
            model: self.scene.model_matrix(),
            draw_data,
            window_extent: self.window_extent,
        })?;

        Ok(())
    }
}
// destroy
impl RenderApp {
    pub fn destroy(mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy();
        }
        Gfx::destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(KeyCode::F10), Some(KeyAction::ToggleOverlay));
        assert_eq!(KeyAction::from_key(KeyCode::KeyW), Some(KeyAction::CameraForward));
        assert_eq!(KeyAction::from_key(KeyCode::ArrowUp), Some(KeyAction::CameraForward));
        assert_eq!(KeyAction::from_key(KeyCode::KeyS), Some(KeyAction::CameraBackward));
        assert_eq!(KeyAction::from_key(KeyCode::ArrowDown), Some(KeyAction::CameraBackward));
        assert_eq!(KeyAction::from_key(KeyCode::Other), None);
    }

    #[test]
    fn test_key_actions() {
        let mut settings = RendererSettings::default();
        let mut scene = SceneAnimation::default();
        let z = scene.camera_pos().z;

        KeyAction::CameraForward.apply(&mut settings, &mut scene);
        KeyAction::CameraForward.apply(&mut settings, &mut scene);
        KeyAction::CameraBackward.apply(&mut settings, &mut scene);
        assert!((scene.camera_pos().z - (z - CAMERA_STEP)).abs() < 1e-6);

        let show_ui = settings.show_ui;
        KeyAction::ToggleOverlay.apply(&mut settings, &mut scene);
        assert_eq!(settings.show_ui, !show_ui);
    }
}
