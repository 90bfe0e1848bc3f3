use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use truvis_app::{app_config::AppConfig, render_app::RenderApp};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::winit_event_adapter::WinitEventAdapter;

pub struct WinitApp {
    render_app: RenderApp,

    window: Option<Window>,
    /// 致命错误：记录下来之后退出事件循环，由 run 返回
    fatal_error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run() -> anyhow::Result<()> {
        RenderApp::init_env();
        let config = AppConfig::load()?;

        let event_loop = winit::event_loop::EventLoop::new()?;
        let render_app = RenderApp::new(event_loop.display_handle()?.as_raw(), config)?;
        let mut app = Self {
            render_app,
            window: None,
            fatal_error: None,
        };

        event_loop.run_app(&mut app)?;
        log::info!("end run.");

        let Self {
            render_app,
            window,
            fatal_error,
        } = app;
        let device_diagnostics = render_app.device_diagnostics().to_string();
        render_app.destroy();
        drop(window);

        match fatal_error {
            Some(e) => Err(e.context(device_diagnostics)),
            None => Ok(()),
        }
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Renderer
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_config = &self.render_app.config().window;
        let window_attr = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(window_config.width as f64, window_config.height as f64));
        let window = event_loop.create_window(window_attr)?;

        let size = window.inner_size();
        self.render_app.init_after_window(
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        )?;

        self.window = Some(window);
        Ok(())
    }
}
// tools
impl WinitApp {
    fn check(&mut self, event_loop: &ActiveEventLoop, result: anyhow::Result<()>) {
        if let Err(e) = result {
            self.fatal_error = Some(e);
            event_loop.exit();
        }
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        let result = self.init_after_window(event_loop);
        self.check(event_loop, result);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.fatal_error.is_some() {
            return;
        }
        let input_event = WinitEventAdapter::from_winit_event(&event);
        self.render_app.handle_event(&input_event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                let result = self.render_app.on_window_resized(new_size.width, new_size.height);
                self.check(event_loop, result);
            }
            WindowEvent::RedrawRequested => {
                let result = self.render_app.big_update();
                self.check(event_loop, result);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
