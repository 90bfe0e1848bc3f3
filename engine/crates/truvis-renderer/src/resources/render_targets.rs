//! 与分辨率相关的资源：输出 image、depth image 以及 overlay 使用的 attachment view
//!
//! resize 时必须先整体销毁再整体创建，两者之间不允许交叠。调用者需要保证 GPU 已经 idle。

use ash::vk;
use truvis_gfx::resources::{
    image::{GfxImage, GfxImageCreateInfo},
    image_view::{GfxImageView, GfxImageViewDesc},
};
use truvis_render_sync::{barrier::infer_image_aspect, tracker::TrackedImage};

use crate::settings::DefaultRendererSettings;

/// 一个 render target 的创建参数
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}
impl RenderTargetDesc {
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        infer_image_aspect(self.format)
    }
}

/// render target 的实际分配者；测试中可以替换为不依赖 GPU 的实现
pub trait RenderTargetAllocator {
    type Image;
    type View;

    fn create_image(&mut self, desc: &RenderTargetDesc) -> anyhow::Result<Self::Image>;
    fn create_view(&mut self, image: &Self::Image, desc: &RenderTargetDesc, name: &str) -> anyhow::Result<Self::View>;

    fn destroy_view(&mut self, view: Self::View);
    fn destroy_image(&mut self, image: Self::Image);
}

/// 一组与分辨率相关的 render target
pub struct RenderTargetSet<A: RenderTargetAllocator> {
    extent: vk::Extent2D,

    output_image: A::Image,
    output_view: A::View,
    /// overlay pass 使用的 color attachment view，和 output_view 指向同一个 image
    overlay_view: A::View,
    depth_image: A::Image,
    depth_view: A::View,

    output_state: TrackedImage,
    depth_state: TrackedImage,
}

impl<A: RenderTargetAllocator> RenderTargetSet<A> {
    pub fn output_desc(extent: vk::Extent2D) -> RenderTargetDesc {
        RenderTargetDesc {
            name: "output",
            extent,
            format: DefaultRendererSettings::OUTPUT_FORMAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::SAMPLED,
        }
    }

    pub fn depth_desc(extent: vk::Extent2D, depth_format: vk::Format) -> RenderTargetDesc {
        RenderTargetDesc {
            name: "depth",
            extent,
            format: depth_format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        }
    }

    fn create(allocator: &mut A, extent: vk::Extent2D, depth_format: vk::Format) -> anyhow::Result<Self> {
        let output_desc = Self::output_desc(extent);
        let depth_desc = Self::depth_desc(extent, depth_format);

        let output_image = allocator.create_image(&output_desc)?;
        let output_view = allocator.create_view(&output_image, &output_desc, "output")?;
        let overlay_view = allocator.create_view(&output_image, &output_desc, "overlay")?;
        let depth_image = allocator.create_image(&depth_desc)?;
        let depth_view = allocator.create_view(&depth_image, &depth_desc, "depth")?;

        Ok(Self {
            extent,
            output_image,
            output_view,
            overlay_view,
            depth_image,
            depth_view,
            output_state: TrackedImage::new("output", output_desc.aspect()),
            depth_state: TrackedImage::new("depth", depth_desc.aspect()),
        })
    }

    /// view 先于 image 销毁
    fn destroy(self, allocator: &mut A) {
        allocator.destroy_view(self.depth_view);
        allocator.destroy_view(self.overlay_view);
        allocator.destroy_view(self.output_view);
        allocator.destroy_image(self.depth_image);
        allocator.destroy_image(self.output_image);
    }
}

// getters
impl<A: RenderTargetAllocator> RenderTargetSet<A> {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn output_image(&self) -> &A::Image {
        &self.output_image
    }

    #[inline]
    pub fn output_view(&self) -> &A::View {
        &self.output_view
    }

    #[inline]
    pub fn overlay_view(&self) -> &A::View {
        &self.overlay_view
    }

    #[inline]
    pub fn depth_image(&self) -> &A::Image {
        &self.depth_image
    }

    #[inline]
    pub fn depth_view(&self) -> &A::View {
        &self.depth_view
    }

    #[inline]
    pub fn output_state(&self) -> &TrackedImage {
        &self.output_state
    }

    /// 同时借用 output 与 depth 的状态
    #[inline]
    pub fn states_mut(&mut self) -> (&mut TrackedImage, &mut TrackedImage) {
        (&mut self.output_state, &mut self.depth_state)
    }
}

/// 管理与分辨率相关的资源，create / destroy 必须成对调用
pub struct ResolutionResources<A: RenderTargetAllocator> {
    allocator: A,
    depth_format: vk::Format,
    targets: Option<RenderTargetSet<A>>,
}

// new & init
impl<A: RenderTargetAllocator> ResolutionResources<A> {
    pub fn new(allocator: A, depth_format: vk::Format) -> Self {
        Self {
            allocator,
            depth_format,
            targets: None,
        }
    }
}

// getters
impl<A: RenderTargetAllocator> ResolutionResources<A> {
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// 尚未创建时返回错误
    pub fn targets(&self) -> anyhow::Result<&RenderTargetSet<A>> {
        self.targets.as_ref().ok_or_else(|| anyhow::anyhow!("render targets are not created"))
    }

    pub fn targets_mut(&mut self) -> anyhow::Result<&mut RenderTargetSet<A>> {
        self.targets.as_mut().ok_or_else(|| anyhow::anyhow!("render targets are not created"))
    }
}

// tools
impl<A: RenderTargetAllocator> ResolutionResources<A> {
    pub fn create_resolution_dependent_resources(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
        anyhow::ensure!(self.targets.is_none(), "render targets must be destroyed before recreation");
        anyhow::ensure!(extent.width > 0 && extent.height > 0, "invalid render target extent: {:?}", extent);

        log::info!("create render targets: {}x{}", extent.width, extent.height);
        self.targets = Some(RenderTargetSet::create(&mut self.allocator, extent, self.depth_format)?);
        Ok(())
    }

    /// 没有创建过时什么都不做
    pub fn destroy_resolution_dependent_resources(&mut self) {
        if let Some(targets) = self.targets.take() {
            log::info!("destroy render targets: {}x{}", targets.extent.width, targets.extent.height);
            targets.destroy(&mut self.allocator);
        }
    }
}

/// 通过 vma 在 device memory 上分配 render target
pub struct GpuRenderTargetAllocator;

impl RenderTargetAllocator for GpuRenderTargetAllocator {
    type Image = GfxImage;
    type View = GfxImageView;

    fn create_image(&mut self, desc: &RenderTargetDesc) -> anyhow::Result<GfxImage> {
        GfxImage::new(
            &GfxImageCreateInfo::new_image_2d_info(desc.extent, desc.format, desc.usage),
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                flags: vk_mem::AllocationCreateFlags::DEDICATED_MEMORY,
                ..Default::default()
            },
            desc.name,
        )
    }

    fn create_view(&mut self, image: &GfxImage, desc: &RenderTargetDesc, name: &str) -> anyhow::Result<GfxImageView> {
        GfxImageView::new(image.handle(), GfxImageViewDesc::new_2d(desc.format, desc.aspect()), name)
    }

    fn destroy_view(&mut self, view: GfxImageView) {
        view.destroy();
    }

    fn destroy_image(&mut self, image: GfxImage) {
        image.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    /// 记录所有存活的 handle，key 为 (类型, 名字, 宽, 高)
    #[derive(Default)]
    struct FakeAllocator {
        next_id: u64,
        live: BTreeMap<u64, (&'static str, String, u32, u32)>,
        created: usize,
    }
    impl FakeAllocator {
        fn insert(&mut self, kind: &'static str, name: &str, extent: vk::Extent2D) -> u64 {
            self.next_id += 1;
            self.created += 1;
            self.live.insert(self.next_id, (kind, name.to_string(), extent.width, extent.height));
            self.next_id
        }

        fn live_set(&self) -> Vec<(&'static str, String, u32, u32)> {
            let mut set: Vec<_> = self.live.values().cloned().collect();
            set.sort();
            set
        }
    }

    #[derive(Debug)]
    struct FakeImage {
        id: u64,
        extent: vk::Extent2D,
    }
    #[derive(Debug)]
    struct FakeView(u64);

    impl RenderTargetAllocator for FakeAllocator {
        type Image = FakeImage;
        type View = FakeView;

        fn create_image(&mut self, desc: &RenderTargetDesc) -> anyhow::Result<FakeImage> {
            Ok(FakeImage {
                id: self.insert("image", desc.name, desc.extent),
                extent: desc.extent,
            })
        }

        fn create_view(&mut self, image: &FakeImage, _desc: &RenderTargetDesc, name: &str) -> anyhow::Result<FakeView> {
            Ok(FakeView(self.insert("view", name, image.extent)))
        }

        fn destroy_view(&mut self, view: FakeView) {
            assert!(self.live.remove(&view.0).is_some(), "double destroy of view {}", view.0);
        }

        fn destroy_image(&mut self, image: FakeImage) {
            assert!(self.live.remove(&image.id).is_some(), "double destroy of image {}", image.id);
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_resize_round_trip_leaves_same_live_set() {
        let mut fresh = ResolutionResources::new(FakeAllocator::default(), vk::Format::D32_SFLOAT);
        fresh.create_resolution_dependent_resources(extent(1920, 1080)).unwrap();

        let mut resized = ResolutionResources::new(FakeAllocator::default(), vk::Format::D32_SFLOAT);
        resized.create_resolution_dependent_resources(extent(800, 600)).unwrap();
        resized.destroy_resolution_dependent_resources();
        resized.create_resolution_dependent_resources(extent(1920, 1080)).unwrap();

        assert_eq!(fresh.allocator().live_set(), resized.allocator().live_set());
        assert_eq!(resized.allocator().live.len(), 5);
        assert_eq!(resized.allocator().created, 10);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut res = ResolutionResources::new(FakeAllocator::default(), vk::Format::D32_SFLOAT);
        for (w, h) in [(800, 600), (1, 1), (2560, 1440)] {
            res.create_resolution_dependent_resources(extent(w, h)).unwrap();
            assert_eq!(res.targets().unwrap().extent(), extent(w, h));
            res.destroy_resolution_dependent_resources();
            assert!(res.allocator().live.is_empty());
        }
        // 重复销毁不会产生 double free
        res.destroy_resolution_dependent_resources();
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let mut res = ResolutionResources::new(FakeAllocator::default(), vk::Format::D32_SFLOAT);
        res.create_resolution_dependent_resources(extent(800, 600)).unwrap();
        assert!(res.create_resolution_dependent_resources(extent(800, 600)).is_err());
        assert!(res.create_resolution_dependent_resources(extent(0, 600)).is_err());
        assert_eq!(res.allocator().live.len(), 5);
    }

    #[test]
    fn test_new_targets_start_undefined() {
        let mut res = ResolutionResources::new(FakeAllocator::default(), vk::Format::D24_UNORM_S8_UINT);
        res.create_resolution_dependent_resources(extent(800, 600)).unwrap();
        let targets = res.targets_mut().unwrap();
        assert_eq!(targets.output_state().state().layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            targets.states_mut().1.aspect(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
