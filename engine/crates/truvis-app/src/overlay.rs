//! 诊断面板：FPS、GPU 耗时以及渲染开关

use truvis_renderer::{
    frame::{gpu_timer::FrameTimings, plan::TimingPhase},
    settings::RendererSettings,
};

/// 面板距离屏幕边缘的像素
const CORNER_DISTANCE: f32 = 10.0;
const BG_ALPHA: f32 = 0.3;
const CORNER_POPUP_ID: &str = "overlay-corner";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OverlayCorner {
    /// 可以自由拖动
    Custom,
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}
impl OverlayCorner {
    pub const MENU: [(OverlayCorner, &'static str); 5] = [
        (Self::Custom, "Custom"),
        (Self::TopLeft, "Top-left"),
        (Self::TopRight, "Top-right"),
        (Self::BottomLeft, "Bottom-left"),
        (Self::BottomRight, "Bottom-right"),
    ];

    /// 面板的位置与 pivot；Custom 时返回 None，由 imgui 自己记录位置
    pub fn placement(self, display_size: [f32; 2]) -> Option<([f32; 2], [f32; 2])> {
        let (right, bottom) = match self {
            Self::Custom => return None,
            Self::TopLeft => (false, false),
            Self::TopRight => (true, false),
            Self::BottomLeft => (false, true),
            Self::BottomRight => (true, true),
        };
        let pos = [
            if right { display_size[0] - CORNER_DISTANCE } else { CORNER_DISTANCE },
            if bottom { display_size[1] - CORNER_DISTANCE } else { CORNER_DISTANCE },
        ];
        let pivot = [if right { 1.0 } else { 0.0 }, if bottom { 1.0 } else { 0.0 }];
        Some((pos, pivot))
    }
}

/// 面板显示的统计信息
pub struct OverlayStats<'a> {
    pub framerate: f32,
    pub gpu_timings: &'a FrameTimings,
    pub rt_supported: bool,
}

#[derive(Default)]
pub struct OverlayPanel {
    corner: OverlayCorner,
}

impl OverlayPanel {
    #[inline]
    pub fn corner(&self) -> OverlayCorner {
        self.corner
    }

    /// 面板被关闭时将 `settings.show_ui` 置为 false
    pub fn build(&mut self, ui: &imgui::Ui, settings: &mut RendererSettings, stats: &OverlayStats) {
        let mut flags = imgui::WindowFlags::NO_TITLE_BAR
            | imgui::WindowFlags::NO_RESIZE
            | imgui::WindowFlags::ALWAYS_AUTO_RESIZE
            | imgui::WindowFlags::NO_SAVED_SETTINGS
            | imgui::WindowFlags::NO_FOCUS_ON_APPEARING
            | imgui::WindowFlags::NO_NAV;

        let mut window = ui.window("UI").bg_alpha(BG_ALPHA);
        if let Some((pos, pivot)) = self.corner.placement(ui.io().display_size) {
            window = window.position(pos, imgui::Condition::Always).position_pivot(pivot);
            flags |= imgui::WindowFlags::NO_MOVE;
        }

        let mut opened = settings.show_ui;
        window.flags(flags).opened(&mut opened).build(|| {
            let framerate = stats.framerate.max(f32::EPSILON);
            ui.text(format!("{:.1} FPS ({:.3} ms/frame)", framerate, 1000.0 / framerate));
            for (phase, label) in [
                (TimingPhase::Frame, "Frame time         "),
                (TimingPhase::Draw, "Draw time          "),
                (TimingPhase::Ui, "UI time            "),
                (TimingPhase::PresentCopy, "Compute copy time  "),
            ] {
                ui.text(format!("{}: {:.2} ms", label, stats.gpu_timings.get(phase)));
            }
            ui.separator();
            ui.spacing();

            ui.checkbox("Vertical sync", &mut settings.vsync);
            ui.checkbox("Animate", &mut settings.animate);
            ui.checkbox("Show texture lod", &mut settings.show_texture_lod);

            {
                // 硬件不支持光追时控件保持可见，只是禁用并且半透明
                let _disabled = ui.begin_disabled(!stats.rt_supported);
                let _alpha = (!stats.rt_supported)
                    .then(|| ui.push_style_var(imgui::StyleVar::Alpha(ui.clone_style().alpha * 0.5)));
                ui.checkbox("Raytracing", &mut settings.raytracing);
                ui.checkbox("4 rays per pixel", &mut settings.spp4);
            }

            if ui.is_window_hovered() && ui.is_mouse_clicked(imgui::MouseButton::Right) {
                ui.open_popup(CORNER_POPUP_ID);
            }
            if let Some(_popup) = ui.begin_popup(CORNER_POPUP_ID) {
                for (corner, label) in OverlayCorner::MENU {
                    if ui.menu_item_config(label).selected(self.corner == corner).build() {
                        self.corner = corner;
                    }
                }
                if ui.menu_item("Close") {
                    settings.show_ui = false;
                }
            }
        });

        if !opened {
            settings.show_ui = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_placement() {
        let display = [800.0, 600.0];
        assert_eq!(OverlayCorner::TopLeft.placement(display), Some(([10.0, 10.0], [0.0, 0.0])));
        assert_eq!(OverlayCorner::TopRight.placement(display), Some(([790.0, 10.0], [1.0, 0.0])));
        assert_eq!(OverlayCorner::BottomLeft.placement(display), Some(([10.0, 590.0], [0.0, 1.0])));
        assert_eq!(OverlayCorner::BottomRight.placement(display), Some(([790.0, 590.0], [1.0, 1.0])));
        assert_eq!(OverlayCorner::Custom.placement(display), None);
    }

    #[test]
    fn test_menu_lists_every_corner_once() {
        let corners = OverlayCorner::MENU.map(|(corner, _)| corner);
        for (i, corner) in corners.iter().enumerate() {
            assert!(!corners[i + 1..].contains(corner));
        }
        assert_eq!(OverlayPanel::default().corner(), OverlayCorner::TopLeft);
    }
}
