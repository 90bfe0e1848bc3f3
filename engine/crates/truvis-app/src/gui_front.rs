use imgui::DrawData;

use crate::platform::input_event::{ElementState, InputEvent, MouseButton};

/// imgui context 以及它的输入
///
/// 所有坐标都使用物理像素，font scale 固定为 1
pub struct GuiHost {
    pub imgui_ctx: imgui::Context,
}
// new & init
impl Default for GuiHost {
    fn default() -> Self {
        Self::new()
    }
}

impl GuiHost {
    pub fn new() -> Self {
        let mut imgui_ctx = imgui::Context::create();
        // disable automatic saving .ini file
        imgui_ctx.set_ini_filename(None);
        imgui_ctx.style_mut().use_dark_colors();
        imgui_ctx.fonts().add_font(&[imgui::FontSource::DefaultFontData { config: None }]);

        imgui_ctx.io_mut().display_size = [800.0, 600.0];

        Self { imgui_ctx }
    }
}
// getters
impl GuiHost {
    #[inline]
    pub fn want_capture_keyboard(&self) -> bool {
        self.imgui_ctx.io().want_capture_keyboard
    }

    #[inline]
    pub fn framerate(&self) -> f32 {
        self.imgui_ctx.io().framerate
    }
}
// update
impl GuiHost {
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.imgui_ctx.io_mut().display_size = [width as f32, height as f32];
    }

    pub fn handle_event(&mut self, event: &InputEvent) {
        let io = self.imgui_ctx.io_mut();
        match event {
            InputEvent::Resized {
                physical_width,
                physical_height,
            } => {
                io.display_size = [*physical_width as f32, *physical_height as f32];
            }
            InputEvent::MouseMoved { physical_position } => {
                io.add_mouse_pos_event([physical_position[0] as f32, physical_position[1] as f32]);
            }
            InputEvent::MouseButtonInput { button, state } => {
                if let Some(mb) = match button {
                    MouseButton::Left => Some(imgui::MouseButton::Left),
                    MouseButton::Right => Some(imgui::MouseButton::Right),
                    MouseButton::Middle => Some(imgui::MouseButton::Middle),
                    _ => None,
                } {
                    let pressed = *state == ElementState::Pressed;
                    io.add_mouse_button_event(mb, pressed);
                }
            }
            InputEvent::MouseWheel { delta } => {
                io.add_mouse_wheel_event([0.0, *delta as f32]);
            }
            _ => {}
        }
    }

    pub fn new_frame(&mut self, duration: std::time::Duration, ui_func: impl FnOnce(&imgui::Ui)) {
        self.imgui_ctx.io_mut().update_delta_time(duration);
        let ui = self.imgui_ctx.new_frame();
        ui_func(ui);
    }

    pub fn compile_ui(&mut self) -> &DrawData {
        self.imgui_ctx.render()
    }
}
