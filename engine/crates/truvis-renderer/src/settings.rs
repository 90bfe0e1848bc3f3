use std::{fmt::Display, ops::Deref};

use ash::vk;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    /// raster 与 ray tracing 共同的输出 image 格式
    pub const OUTPUT_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    pub const DEPTH_FORMAT_CANDIDATES: &'static [vk::Format] =
        &[vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];
    pub const FRAMES_IN_FLIGHT: usize = 2;
    pub const DEPTH_CLEAR: f32 = 1.0;
    /// 纹理采样器的最大 LOD
    pub const TEXTURE_MAX_LOD: f32 = 12.0;

    #[inline]
    pub fn clear_color() -> [f32; 4] {
        [srgb_encode(0.32), srgb_encode(0.32), srgb_encode(0.4), 1.0]
    }
}

/// linear -> sRGB 的传递函数
pub fn srgb_encode(linear: f32) -> f32 {
    if linear <= 0.0031308 { linear * 12.92 } else { 1.055 * linear.powf(1.0 / 2.4) - 0.055 }
}

/// 运行时可以切换的选项，由 overlay 面板修改
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RendererSettings {
    pub vsync: bool,
    pub animate: bool,
    pub raytracing: bool,
    /// 每个像素 4 条光线
    pub spp4: bool,
    pub show_texture_lod: bool,
    pub show_ui: bool,
}
impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            animate: true,
            raytracing: false,
            spp4: false,
            show_texture_lod: false,
            show_ui: true,
        }
    }
}

/// 帧标签（A/B）
///
/// 表示当前处于 Frames in Flight 的哪一帧。
/// 通过 `Deref` 转换为索引 0/1。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    A,
    B,
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            Self::A => &Self::INDEX[0],
            Self::B => &Self::INDEX[1],
        }
    }
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}
impl FrameLabel {
    const INDEX: [usize; 2] = [0, 1];

    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        if idx % 2 == 0 { Self::A } else { Self::B }
    }

    #[inline]
    pub const fn all() -> [FrameLabel; DefaultRendererSettings::FRAMES_IN_FLIGHT] {
        [FrameLabel::A, FrameLabel::B]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_encode() {
        assert_eq!(srgb_encode(0.0), 0.0);
        assert!((srgb_encode(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_encode(0.32) > 0.32);
    }

    #[test]
    fn test_frame_label_index() {
        assert_eq!(*FrameLabel::from_usize(0), 0);
        assert_eq!(*FrameLabel::from_usize(3), 1);
        assert_eq!(FrameLabel::all().len(), DefaultRendererSettings::FRAMES_IN_FLIGHT);
    }
}
