use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 窗口对应的 surface，生命周期长于 swapchain：resize 时只重建 swapchain
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

// new & init
impl GfxSurface {
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let gfx = Gfx::get();
        let surface_pf = ash::khr::surface::Instance::new(gfx.vk_entry(), gfx.instance().ash_instance());

        let handle = unsafe {
            ash_window::create_surface(
                gfx.vk_entry(),
                gfx.instance().ash_instance(),
                raw_display_handle,
                raw_window_handle,
                None,
            )
        }
        .context("create window surface")?;

        let surface = GfxSurface { handle, pf: surface_pf };
        gfx.gfx_device().set_debug_name(&surface, "main");

        Ok(surface)
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn get_capabilities(&self) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.pf.get_physical_device_surface_capabilities(Gfx::get().physical_device().vk_handle, self.handle)
        }
        .context("query surface capabilities")
    }

    pub fn get_present_modes(&self) -> anyhow::Result<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(Gfx::get().physical_device().vk_handle, self.handle) }
            .context("query surface present modes")
    }

    pub fn get_formats(&self) -> anyhow::Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(Gfx::get().physical_device().vk_handle, self.handle) }
            .context("query surface formats")
    }

    /// gfx queue 是否可以向该 surface present
    pub fn support_present(&self, queue_family_index: u32) -> anyhow::Result<bool> {
        unsafe {
            self.pf.get_physical_device_surface_support(
                Gfx::get().physical_device().vk_handle,
                queue_family_index,
                self.handle,
            )
        }
        .context("query surface present support")
    }
}

// destroy
impl GfxSurface {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
