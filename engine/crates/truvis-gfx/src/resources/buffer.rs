use std::ptr;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 通过 vma 分配的 buffer
///
/// 生命周期由 Drop 管理：drop 时归还内存
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        let allocator = Gfx::get().allocator();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }

            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// new & init
impl GfxBuffer {
    /// - align: buffer 起始地址的内存对齐，默认对齐到 8 字节
    /// - mem_map: 是否需要 host 可见并常驻映射
    /// - 优先使用 device memory
    pub fn new(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let align = align.unwrap_or(8);
        let allocator = Gfx::get().allocator();
        let (buffer, mut alloc) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align) }
            .with_context(|| format!("create buffer {} ({} bytes)", name.as_ref(), buffer_size))?;

        let mut mapped_ptr = None;
        if mem_map {
            let ptr = unsafe { allocator.map_memory(&mut alloc) };
            match ptr {
                Ok(ptr) => mapped_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                    return Err(e).with_context(|| format!("map buffer {}", name.as_ref()));
                }
            }
        }

        let mut device_addr = None;
        if buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            let gfx_device = Gfx::get().gfx_device();
            unsafe {
                device_addr =
                    Some(gfx_device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer)));
            }
        }

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr: mapped_ptr,
            device_addr,

            debug_name: name.as_ref().to_string(),
        };
        Gfx::get().gfx_device().set_debug_name(&buffer, name);
        Ok(buffer)
    }

    #[inline]
    pub fn new_stage_buffer(size: vk::DeviceSize, debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_SRC, None, true, debug_name)
    }
}
// destroy
impl GfxBuffer {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    /// buffer usage 不包含 SHADER_DEVICE_ADDRESS 时返回 0
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        debug_assert!(self.device_addr.is_some(), "buffer {} has no device address", self.debug_name);
        self.device_addr.unwrap_or_default()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    /// 在不创建 buffer 的情况下查询内存需求（Vulkan 1.3）
    pub fn query_memory_requirements(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
    ) -> vk::MemoryRequirements {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let query_info = vk::DeviceBufferMemoryRequirements::default().create_info(&buffer_ci);
        let mut mem_req = vk::MemoryRequirements2::default();
        unsafe {
            Gfx::get().gfx_device().get_device_buffer_memory_requirements(&query_info, &mut mem_req);
        }
        mem_req.memory_requirements
    }

    #[inline]
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.map_ptr
    }

    #[inline]
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> anyhow::Result<()> {
        let allocator = Gfx::get().allocator();
        allocator.flush_allocation(&self.allocation, offset, size).with_context(|| format!("flush {}", self.debug_name))
    }

    /// 通过 mem map 的方式将 data 写入到 buffer 的 offset 处
    pub fn write_by_mmap<T>(&self, offset: vk::DeviceSize, data: &[T]) -> anyhow::Result<()>
    where
        T: Sized + Copy,
    {
        let mapped_ptr = self.map_ptr.with_context(|| format!("buffer {} is not mapped", self.debug_name))?;
        let byte_size = size_of_val(data) as vk::DeviceSize;
        anyhow::ensure!(
            offset + byte_size <= self.size,
            "write out of range: buffer {} size {}, write [{}, {})",
            self.debug_name,
            self.size,
            offset,
            offset + byte_size
        );
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr() as *const u8, mapped_ptr.add(offset as usize), byte_size as usize);
        }
        self.flush(offset, byte_size)
    }

    /// 通过 mem map 的方式将 data 传入到 buffer 中
    #[inline]
    pub fn transfer_data_by_mmap<T>(&self, data: &[T]) -> anyhow::Result<()>
    where
        T: Sized + Copy,
    {
        self.write_by_mmap(0, data)
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// sync 表示这个函数是同步等待的，会阻塞运行
    ///
    /// # Note
    /// * 这个应该是用来传输大块数据的，只在初始化阶段使用
    pub fn transfer_data_sync(&self, data: &[impl Sized + Copy]) -> anyhow::Result<()> {
        let data_size = size_of_val(data) as vk::DeviceSize;
        let stage_buffer = Self::new_stage_buffer(data_size, format!("{}-stage-buffer", self.debug_name))?;

        stage_buffer.transfer_data_by_mmap(data)?;

        let cmd_name = format!("{}-transfer-data", &self.debug_name);
        Gfx::get().one_time_exec(
            |cmd| {
                cmd.copy_buffer(
                    &stage_buffer,
                    self,
                    &[vk::BufferCopy {
                        size: data_size,
                        ..Default::default()
                    }],
                );
            },
            &cmd_name,
        )?;

        Ok(())
    }
}
