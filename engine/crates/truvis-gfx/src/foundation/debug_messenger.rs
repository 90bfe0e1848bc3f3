use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

/// validation layer 的消息转发器，将消息输出到 log
pub struct GfxDebugMsger {
    vk_debug_utils_instance: ash::ext::debug_utils::Instance,
    vk_debug_utils_messenger: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMsger {
    pub fn new(vk_pf: &ash::Entry, instance: &ash::Instance) -> anyhow::Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_pf, instance);

        let create_info = Self::debug_utils_messenger_ci();
        let debug_messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .context("failed to create debug utils messenger")?;

        Ok(Self {
            vk_debug_utils_instance: loader,
            vk_debug_utils_messenger: debug_messenger,
        })
    }

    pub fn destroy(self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.vk_debug_utils_instance.destroy_debug_utils_messenger(self.vk_debug_utils_messenger, None);
        }
    }
}

fn severity_to_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        _ => log::Level::Debug,
    }
}

/// 新版本 validation layer 的消息是 json，`MainMessage` 带有换行，放到最后单独输出
fn format_validation_message(msg: &str) -> String {
    let Ok(serde_json::Value::Object(mut fields)) = serde_json::from_str::<serde_json::Value>(msg) else {
        return msg.to_string();
    };
    let main_msg = fields.remove("MainMessage");
    let main_msg = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default();
    let rest = serde_json::to_string_pretty(&fields).unwrap_or_default();
    format!("{}\n{}", rest, main_msg)
}

unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    log::log!(
        severity_to_level(message_severity),
        "[{:?}]\n{}\n",
        message_type,
        format_validation_message(&msg)
    );

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

// 构造过程辅助函数
impl GfxDebugMsger {
    /// 用于创建 debug messenger 的结构体
    ///
    /// 也会被挂到 instance create info 上，用于捕获 instance 创建和销毁期间的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

/// 可以设置 debug name 的 vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_is_kept() {
        assert_eq!(format_validation_message("vkCreateDevice failed"), "vkCreateDevice failed");
    }

    #[test]
    fn test_json_main_message_goes_last() {
        let formatted = format_validation_message(r#"{"MessageID": "0x1", "MainMessage": "line1\nline2"}"#);
        assert!(formatted.contains("\"MessageID\": \"0x1\""));
        assert!(!formatted.contains("MainMessage"));
        assert!(formatted.ends_with("line1\nline2"));
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_to_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), log::Level::Error);
        assert_eq!(severity_to_level(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), log::Level::Warn);
        assert_eq!(severity_to_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), log::Level::Debug);
    }
}
