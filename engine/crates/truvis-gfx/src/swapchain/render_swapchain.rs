use anyhow::Context;
use ash::vk::{self, Handle};
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxCommandQueue, fence::GfxFence, semaphore::GfxSemaphore},
    gfx::Gfx,
    resources::image_view::{GfxImageView, GfxImageViewDesc},
    swapchain::surface::GfxSurface,
};

/// swapchain image 会被 compute shader 直接写入，因此只接受可作为 storage image 的 UNORM 格式
pub const SWAPCHAIN_FORMAT_CANDIDATES: [vk::Format; 2] = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

pub struct GfxRenderSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<GfxImageView>,
    swapchain_image_index: usize,

    color_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    swapchain_extent: vk::Extent2D,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(surface: &GfxSurface, vsync: bool, window_physical_extent: vk::Extent2D) -> anyhow::Result<Self> {
        let surface_capabilities = surface.get_capabilities()?;
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain: window {}x{}, surface current {}x{}, final {}x{}",
            window_physical_extent.width,
            window_physical_extent.height,
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            extent.width,
            extent.height
        );

        let present_mode = Self::choose_present_mode(&surface.get_present_modes()?, vsync);
        let surface_format = Self::choose_surface_format(&surface.get_formats()?)
            .context("surface supports none of the storage-capable swapchain formats")?;
        log::info!("swapchain present mode: {:?}, format: {:?}", present_mode, surface_format);

        let swapchain_handle = Self::create_swapchain(surface, &surface_capabilities, surface_format, extent, present_mode)?;
        let gfx_device = Gfx::get().gfx_device();
        let images = unsafe { gfx_device.swapchain().get_swapchain_images(swapchain_handle) }
            .context("get swapchain images")?;

        let mut image_views = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            gfx_device.set_object_debug_name(*image, format!("swapchain-image-{}", idx));
            image_views.push(GfxImageView::new(
                *image,
                GfxImageViewDesc::new_2d(surface_format.format, vk::ImageAspectFlags::COLOR),
                format!("swapchain-image-{}", idx),
            )?);
        }

        Ok(Self {
            swapchain_handle,
            swapchain_images: images,
            swapchain_image_views: image_views,
            swapchain_image_index: 0,
            color_format: surface_format.format,
            present_mode,
            swapchain_extent: extent,
        })
    }

    fn create_swapchain(
        surface: &GfxSurface,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
    ) -> anyhow::Result<vk::SwapchainKHR> {
        // 确定 image count
        // max_image_count == 0，表示不限制 image 数量
        let image_count = if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // STORAGE: present copy 的 compute shader 直接写入
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let gfx_device = Gfx::get().gfx_device();
        let swapchain_handle =
            unsafe { gfx_device.swapchain().create_swapchain(&create_info, None) }.context("create swapchain")?;
        gfx_device.set_object_debug_name(swapchain_handle, "main");

        Ok(swapchain_handle)
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn present_images(&self) -> &[vk::Image] {
        &self.swapchain_images
    }

    #[inline]
    pub fn present_image_views(&self) -> &[GfxImageView] {
        &self.swapchain_image_views
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.swapchain_image_index
    }
}

// tools
impl GfxRenderSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// vsync 时使用 FIFO（一定支持）；否则依次尝试 MAILBOX、IMMEDIATE
    pub fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
        if vsync {
            return vk::PresentModeKHR::FIFO;
        }
        [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
            .into_iter()
            .find(|mode| available.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
        SWAPCHAIN_FORMAT_CANDIDATES
            .iter()
            .find_map(|candidate| available.iter().find(|f| f.format == *candidate).copied())
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    ///
    /// return: swapchain 已经过期，需要重建。suboptimal 时仍然返回 false：
    /// 此时 image 已经被 acquire，semaphore 会被 signal，本帧必须继续使用它，由 present 报告重建
    #[inline]
    pub fn acquire_next_image(
        &mut self,
        semaphore: Option<&GfxSemaphore>,
        fence: Option<&GfxFence>,
        timeout: u64,
    ) -> anyhow::Result<bool> {
        let result = unsafe {
            Gfx::get().gfx_device().swapchain().acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.map_or(vk::Semaphore::null(), |s| s.handle()),
                fence.map_or(vk::Fence::null(), |f| f.handle()),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.swapchain_image_index = image_index as usize;
                Ok(false)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(true)
            }
            Err(e) => Err(e).context("acquire next swapchain image"),
        }
    }

    /// return: need recreate
    #[inline]
    pub fn present_image(&self, queue: &GfxCommandQueue, wait_semaphores: &[GfxSemaphore]) -> anyhow::Result<bool> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [self.swapchain_image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { Gfx::get().gfx_device().swapchain().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", self.swapchain_image_index);
                }
                Ok(is_suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                Ok(true)
            }
            Err(e) => Err(e).context("present swapchain image"),
        }
    }
}

// destroy
impl GfxRenderSwapchain {
    pub fn destroy(mut self) {
        for view in std::mem::take(&mut self.swapchain_image_views) {
            view.destroy();
        }
        unsafe {
            Gfx::get().gfx_device().swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
        self.swapchain_handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.swapchain_handle.is_null(), "GfxRenderSwapchain must be destroyed manually");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_swapchain_extent_follows_surface() {
        let extent =
            GfxRenderSwapchain::calculate_swapchain_extent(&caps((800, 600)), vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_swapchain_extent_clamps_window_size() {
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(
            &caps((0xFFFFFFFF, 0xFFFFFFFF)),
            vk::Extent2D { width: 8000, height: 0 },
        );
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn test_present_mode_choice() {
        use vk::PresentModeKHR as M;
        let all = [M::FIFO, M::IMMEDIATE, M::MAILBOX];
        assert_eq!(GfxRenderSwapchain::choose_present_mode(&all, true), M::FIFO);
        assert_eq!(GfxRenderSwapchain::choose_present_mode(&all, false), M::MAILBOX);
        assert_eq!(GfxRenderSwapchain::choose_present_mode(&[M::FIFO, M::IMMEDIATE], false), M::IMMEDIATE);
        assert_eq!(GfxRenderSwapchain::choose_present_mode(&[M::FIFO], false), M::FIFO);
    }

    #[test]
    fn test_surface_format_prefers_storage_capable() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[srgb, unorm]), Some(unorm));
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[srgb]), None);
    }
}
