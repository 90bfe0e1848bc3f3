use std::{ffi::CStr, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::{
    commands::command_queue::GfxCommandQueue,
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice,
    },
};

pub struct GfxCore {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    pub(crate) vk_entry: ash::Entry,

    pub(crate) instance: GfxInstance,
    pub(crate) physical_device: GfxPhysicalDevice,

    /// 多个组件需要共享相同的设备函数指针（GfxCommandQueue、GfxCommandPool 等），
    /// 因此使用 Rc 持有
    pub(crate) gfx_device: Rc<GfxDevice>,

    /// 只有启用 validation 时才会创建
    pub(crate) debug_msger: Option<GfxDebugMsger>,

    pub(crate) gfx_queue: GfxCommandQueue,
}

// new & init
impl GfxCore {
    pub fn new(
        app_name: &str,
        engine_name: &str,
        instance_extra_exts: &[&'static CStr],
        enable_validation: bool,
    ) -> anyhow::Result<Self> {
        let vk_pf = unsafe { ash::Entry::load() }.context("failed to load vulkan entry")?;
        let instance = GfxInstance::new(&vk_pf, app_name, engine_name, instance_extra_exts, enable_validation)?;
        let physical_device = GfxPhysicalDevice::new_descrete_physical_device(instance.ash_instance())?;
        log::info!("physical device:\n{}", physical_device.diagnostics());

        // graphics、compute、transfer 全部使用同一个 queue
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&[1.0])];

        let device = Rc::new(GfxDevice::new(
            &instance.ash_instance,
            physical_device.vk_handle,
            &queue_create_infos,
            physical_device.rt_supported,
        )?);
        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe { device.get_device_queue(physical_device.gfx_queue_family.queue_family_index, 0) },
            queue_family: physical_device.gfx_queue_family.clone(),
            gfx_device: device.clone(),
        };

        let debug_msger =
            if enable_validation { Some(GfxDebugMsger::new(&vk_pf, &instance.ash_instance)?) } else { None };

        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        // 在 device 以及 debug_utils 之前创建的 vk::Handle
        {
            device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
            device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");

            device.set_object_debug_name(device.vk_handle(), "GfxDevice");
            device.set_object_debug_name(gfx_queue.vk_queue, "GfxCommandQueue-gfx");
        }

        Ok(Self {
            vk_entry: vk_pf,
            instance,
            physical_device,
            gfx_device: device,
            debug_msger,
            gfx_queue,
        })
    }
}

// destroy
impl GfxCore {
    pub fn destroy(self) {
        if let Some(debug_msger) = self.debug_msger {
            debug_msger.destroy();
        }
        self.gfx_device.destroy();
        self.physical_device.destroy();
        self.instance.destroy();
    }
}
