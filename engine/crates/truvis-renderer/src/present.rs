//! 窗口呈现：surface、swapchain 以及相关的同步对象
//!
//! - acquire semaphore 每个 frame slot 一个
//! - render complete semaphore 每个 swapchain image 一个：present 持有的 semaphore 只有在该 image
//!   被再次 acquire 之后才能确定可以复用

use ash::vk;
use itertools::Itertools;
use truvis_gfx::{
    commands::semaphore::GfxSemaphore,
    gfx::Gfx,
    swapchain::{render_swapchain::GfxRenderSwapchain, surface::GfxSurface},
};
use truvis_render_sync::tracker::TrackedImage;

use crate::settings::FrameLabel;

/// acquire 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: usize },
    /// swapchain 过期，需要重建之后跳过本帧
    NeedRecreate,
}

pub struct PresentContext {
    surface: GfxSurface,
    swapchain: Option<GfxRenderSwapchain>,
    vsync: bool,

    /// 每个 swapchain image 的状态
    image_states: Vec<TrackedImage>,

    acquire_semaphores: Vec<GfxSemaphore>,
    render_complete_semaphores: Vec<GfxSemaphore>,
}

// new & init
impl PresentContext {
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        window_extent: vk::Extent2D,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let surface = GfxSurface::new(raw_display_handle, raw_window_handle)?;
        // 渲染与 present 使用同一个 queue
        let queue_family_index = Gfx::get().gfx_queue_family().queue_family_index;
        if !surface.support_present(queue_family_index)? {
            surface.destroy();
            anyhow::bail!("graphics queue family {} cannot present to the window surface", queue_family_index);
        }
        let acquire_semaphores = FrameLabel::all()
            .iter()
            .map(|label| GfxSemaphore::new(&format!("image-acquired-{}", label)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut present = Self {
            surface,
            swapchain: None,
            vsync,
            image_states: vec![],
            acquire_semaphores,
            render_complete_semaphores: vec![],
        };
        present.rebuild_swapchain(window_extent)?;
        Ok(present)
    }

    /// 调用者需要保证 GPU 已经 idle
    pub fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) -> anyhow::Result<()> {
        let _span = tracy_client::span!("rebuild_swapchain");
        self.release_swapchain();

        let swapchain = GfxRenderSwapchain::new(&self.surface, self.vsync, window_extent)?;
        let image_cnt = swapchain.present_images().len();
        self.image_states = (0..image_cnt)
            .map(|idx| TrackedImage::new(format!("swapchain-{idx}"), vk::ImageAspectFlags::COLOR))
            .collect_vec();
        self.render_complete_semaphores = (0..image_cnt)
            .map(|idx| GfxSemaphore::new(&format!("render-complete-{idx}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn release_swapchain(&mut self) {
        for semaphore in self.render_complete_semaphores.drain(..) {
            semaphore.destroy();
        }
        self.image_states.clear();
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }
    }
}

// getters
impl PresentContext {
    fn swapchain(&self) -> anyhow::Result<&GfxRenderSwapchain> {
        self.swapchain.as_ref().ok_or_else(|| anyhow::anyhow!("swapchain is not created"))
    }

    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn extent(&self) -> anyhow::Result<vk::Extent2D> {
        Ok(self.swapchain()?.extent())
    }

    pub fn image_views(&self) -> anyhow::Result<Vec<vk::ImageView>> {
        Ok(self.swapchain()?.present_image_views().iter().map(|view| view.handle()).collect_vec())
    }

    pub fn images(&self) -> anyhow::Result<Vec<vk::Image>> {
        Ok(self.swapchain()?.present_images().to_vec())
    }

    pub fn image_state_mut(&mut self, image_index: usize) -> anyhow::Result<&mut TrackedImage> {
        self.image_states
            .get_mut(image_index)
            .ok_or_else(|| anyhow::anyhow!("swapchain image index {} out of range", image_index))
    }

    #[inline]
    pub fn acquire_semaphore(&self, frame_label: FrameLabel) -> &GfxSemaphore {
        &self.acquire_semaphores[*frame_label]
    }

    pub fn render_complete_semaphore(&self, image_index: usize) -> anyhow::Result<&GfxSemaphore> {
        self.render_complete_semaphores
            .get(image_index)
            .ok_or_else(|| anyhow::anyhow!("swapchain image index {} out of range", image_index))
    }
}

// update
impl PresentContext {
    /// 只记录新的设置，由调用者在合适的时机重建 swapchain
    #[inline]
    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub fn acquire(&mut self, frame_label: FrameLabel) -> anyhow::Result<AcquireOutcome> {
        let semaphore = &self.acquire_semaphores[*frame_label];
        let swapchain = self.swapchain.as_mut().ok_or_else(|| anyhow::anyhow!("swapchain is not created"))?;

        if swapchain.acquire_next_image(Some(semaphore), None, u64::MAX)? {
            return Ok(AcquireOutcome::NeedRecreate);
        }
        Ok(AcquireOutcome::Acquired {
            image_index: swapchain.current_image_index(),
        })
    }

    /// return: need recreate
    pub fn present(&self, image_index: usize) -> anyhow::Result<bool> {
        let swapchain = self.swapchain()?;
        anyhow::ensure!(
            swapchain.current_image_index() == image_index,
            "present image {} but acquired {}",
            image_index,
            swapchain.current_image_index()
        );
        let semaphore = self.render_complete_semaphore(image_index)?;
        swapchain.present_image(Gfx::get().gfx_queue(), std::slice::from_ref(semaphore))
    }
}

// destroy
impl PresentContext {
    pub fn destroy(mut self) {
        self.release_swapchain();
        for semaphore in self.acquire_semaphores.drain(..) {
            semaphore.destroy();
        }
        let Self { surface, .. } = self;
        surface.destroy();
    }
}
