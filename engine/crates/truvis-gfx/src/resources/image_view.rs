use anyhow::Context;
use ash::vk::{self, Handle};

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxImageView {
    handle: vk::ImageView,
    name: String,
}
impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImage2DView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// new & init
impl GfxImageView {
    pub fn new(image: vk::Image, view_desc: GfxImageViewDesc, name: impl AsRef<str>) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();

        let info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: view_desc.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: view_desc.aspect_mask,
                base_mip_level: 0,
                level_count: view_desc.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        let handle = unsafe { gfx_device.create_image_view(&info, None) }
            .with_context(|| format!("create image view: {}", name.as_ref()))?;
        let image_view = Self {
            handle,
            name: name.as_ref().to_string(),
        };
        gfx_device.set_debug_name(&image_view, &name);
        Ok(image_view)
    }
}
// destroy
impl GfxImageView {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }
    pub fn destroy_mut(&mut self) {
        unsafe {
            let gfx_device = Gfx::get().gfx_device();
            gfx_device.destroy_image_view(self.handle, None);
        }
        self.handle = vk::ImageView::null();
    }
}
impl Drop for GfxImageView {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImageView must be destroyed manually: {}", self.name);
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }}
impl std::fmt::Display for GfxImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image2DView({}, {:?})", self.name, self.handle)
    }
}

/// 2D image view 的描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    /// format 可以基于 vk::Image 重解释
    pub(crate) format: vk::Format,
    pub(crate) aspect_mask: vk::ImageAspectFlags,
    /// 从 mip 0 开始的 level 数量
    pub(crate) mip_levels: u32,
}
impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            aspect_mask: aspect,
            mip_levels: 1,
        }
    }

    /// builder
    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_desc_defaults_to_single_mip() {
        let desc = GfxImageViewDesc::new_2d(vk::Format::D32_SFLOAT, vk::ImageAspectFlags::DEPTH);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.aspect_mask, vk::ImageAspectFlags::DEPTH);

        let mipped = GfxImageViewDesc::new_2d(vk::Format::R8G8B8A8_UNORM, vk::ImageAspectFlags::COLOR).mip_levels(10);
        assert_eq!(mipped.mip_levels, 10);
        assert_eq!(mipped.format, vk::Format::R8G8B8A8_UNORM);
    }
}
