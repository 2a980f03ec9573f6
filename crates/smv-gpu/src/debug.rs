//! Validation layer output routed into `tracing`.

use crate::error::Result;
use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

/// Owns a `VK_EXT_debug_utils` messenger.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Install a messenger that forwards every validation message.
    ///
    /// # Safety
    /// The instance must have been created with `VK_EXT_debug_utils` enabled.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        tracing::debug!("Debug messenger installed");

        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Log level a validation message is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warn,
    Debug,
    Trace,
}

pub fn severity_to_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> MessageLevel {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        MessageLevel::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        MessageLevel::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        MessageLevel::Debug
    } else {
        MessageLevel::Trace
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: the loader passes a valid callback data pointer for the duration of the call
    let (message, id_name) = unsafe {
        let data = &*p_callback_data;
        let message = if data.p_message.is_null() {
            Cow::from("no message")
        } else {
            CStr::from_ptr(data.p_message).to_string_lossy()
        };
        let id_name = if data.p_message_id_name.is_null() {
            Cow::from("")
        } else {
            CStr::from_ptr(data.p_message_id_name).to_string_lossy()
        };
        (message, id_name)
    };

    match severity_to_level(message_severity) {
        MessageLevel::Error => {
            tracing::error!(target: "vulkan", "[{message_type:?}] {id_name}: {message}");
        }
        MessageLevel::Warn => {
            tracing::warn!(target: "vulkan", "[{message_type:?}] {id_name}: {message}");
        }
        MessageLevel::Debug => {
            tracing::debug!(target: "vulkan", "[{message_type:?}] {id_name}: {message}");
        }
        MessageLevel::Trace => {
            tracing::trace!(target: "vulkan", "[{message_type:?}] {id_name}: {message}");
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_map_to_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_to_level(S::ERROR), MessageLevel::Error);
        assert_eq!(severity_to_level(S::WARNING), MessageLevel::Warn);
        assert_eq!(severity_to_level(S::INFO), MessageLevel::Debug);
        assert_eq!(severity_to_level(S::VERBOSE), MessageLevel::Trace);
    }
}
