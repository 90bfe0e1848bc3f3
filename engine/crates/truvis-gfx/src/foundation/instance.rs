use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMsger;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct GfxInstance {
    /// 仅仅是函数指针，以及一个裸的 handle
    ///
    /// 生命周期由 GfxCore 手动控制
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        engine_name: &str,
        extra_instance_exts: &[&'static CStr],
        enable_validation: bool,
    ) -> anyhow::Result<Self> {
        let app_name = CString::new(app_name)?;
        let engine_name = CString::new(engine_name)?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_ref())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_ref())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let enabled_extensions = Self::get_extensions(vk_entry, extra_instance_exts)?;
        let enabled_extensions_str = enabled_extensions
            .iter()
            .map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) }))
            .collect::<String>();
        log::info!("instance extensions: {}", enabled_extensions_str);

        let enabled_layers = Self::get_layers(vk_entry, enable_validation)?;
        let enabled_layers_str =
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).collect::<String>();
        log::info!("instance layers: {}", enabled_layers_str);

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers);

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);

        let handle =
            unsafe { vk_entry.create_instance(&instance_ci, None) }.context("failed to create vulkan instance")?;

        Ok(Self { ash_instance: handle })
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("Destroying GfxInstance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}

// 构造过程
impl GfxInstance {
    /// instance 所需的所有 extension
    ///
    /// # return
    /// instance 所需的，且受支持的 extension
    fn get_extensions(
        vk_entry: &ash::Entry,
        extra_instance_exts: &[&'static CStr],
    ) -> anyhow::Result<Vec<*const c_char>> {
        let all_ext_props = unsafe { vk_entry.enumerate_instance_extension_properties(None) }?;
        let mut enabled_extensions: HashSet<&'static CStr> = HashSet::new();

        // 检查某个 instance ext 并启用
        let mut enable_ext = |ext: &'static CStr| -> anyhow::Result<()> {
            let supported = all_ext_props.iter().any(|supported_ext| supported_ext.extension_name_as_c_str() == Ok(ext));
            anyhow::ensure!(supported, "Required instance extension ({:?}) is missing", ext);
            enabled_extensions.insert(ext);
            Ok(())
        };

        // 外部传入的 extension，例如 surface 相关的
        for ext in extra_instance_exts {
            enable_ext(ext)?;
        }

        // 这个 extension 可以单独使用，提供以下功能：
        // 1. debug messenger
        // 2. 为 vulkan object 设置 debug name
        // 3. 使用 label 标记 queue 或者 command buffer 中的一个一个 section
        enable_ext(vk::EXT_DEBUG_UTILS_NAME)?;

        Ok(enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// instance 所需的所有 layers
    ///
    /// validation layer 缺失时只给出警告，不阻止启动
    fn get_layers(vk_entry: &ash::Entry, enable_validation: bool) -> anyhow::Result<Vec<*const c_char>> {
        if !enable_validation {
            return Ok(Vec::new());
        }

        let all_layer_props = unsafe { vk_entry.enumerate_instance_layer_properties() }?;
        let supported = all_layer_props.iter().any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
        if supported {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation layer {:?} is not available, continue without it", VALIDATION_LAYER);
            Ok(Vec::new())
        }
    }
}
