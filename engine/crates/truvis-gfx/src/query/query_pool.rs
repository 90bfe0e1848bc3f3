use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxQueryPool {
    handle: vk::QueryPool,
}
impl DebugType for GfxQueryPool {
    fn debug_type_name() -> &'static str {
        "GfxQueryPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxQueryPool {
    fn drop(&mut self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.destroy_query_pool(self.handle, None);
        }
    }
}
// new & init
impl GfxQueryPool {
    #[inline]
    pub fn new(ty: vk::QueryType, cnt: u32, debug_name: &str) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let create_info = vk::QueryPoolCreateInfo {
            query_type: ty,
            query_count: cnt,
            ..Default::default()
        };

        let handle = unsafe { gfx_device.create_query_pool(&create_info, None) }
            .with_context(|| format!("create query pool: {}", debug_name))?;

        let query_pool = Self { handle };
        gfx_device.set_debug_name(&query_pool, debug_name);
        Ok(query_pool)
    }
}
// getters
impl GfxQueryPool {
    #[inline]
    pub fn handle(&self) -> vk::QueryPool {
        self.handle
    }
}
// tools
impl GfxQueryPool {
    /// 阻塞等待查询结果
    #[inline]
    pub fn get_query_result_u64(&self, first_index: u32, query_cnt: u32) -> anyhow::Result<Vec<u64>> {
        let gfx_device = Gfx::get().gfx_device();
        let mut res = vec![0_u64; query_cnt as usize];
        unsafe {
            gfx_device.get_query_pool_results(
                self.handle,
                first_index,
                &mut res,
                vk::QueryResultFlags::WAIT | vk::QueryResultFlags::TYPE_64,
            )
        }
        .context("get query pool results")?;
        Ok(res)
    }
}
// destroy
impl GfxQueryPool {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
