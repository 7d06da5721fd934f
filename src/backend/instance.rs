// Vulkan instance - top-level connection to the driver
//
// Responsibilities:
// - Load the Vulkan entry points
// - Collect platform surface extensions from the windowing layer
// - Verify + enable the validation layer when requested
// - Route validation messages into an injected DiagnosticSink

use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use super::error::{VulkanError, VulkanResult};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Receiver for driver-reported diagnostics. Injected so tests (and release
/// builds) can swap or drop the sink without touching driver registration.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str);
}

/// Default sink: forwards validation messages to the log.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
        match severity {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
                log::error!("[Vulkan] {}", message);
            }
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
                log::warn!("[Vulkan] {}", message);
            }
            _ => {
                log::debug!("[Vulkan] {}", message);
            }
        }
    }
}

/// Debug messenger plus the boxed sink its callback dereferences.
/// The sink must stay alive until the messenger is destroyed.
struct DebugMessenger {
    loader: ash::extensions::ext::DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
    _sink: Box<Box<dyn DiagnosticSink>>,
}

/// Process-wide connection to the Vulkan driver. Exactly one instance,
/// alive for the whole run; every other handle is created under it.
pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug: Option<DebugMessenger>,
    validation_enabled: bool,
}

impl Instance {
    /// Create the instance, optionally with validation + a diagnostic sink.
    ///
    /// Fails with `Environment` when the host has no Vulkan driver and with
    /// `UnsupportedCapability` when validation is requested but the layer
    /// is not installed.
    pub fn new(
        enable_validation: bool,
        sink: Box<dyn DiagnosticSink>,
        display_handle: RawDisplayHandle,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::Environment(format!("failed to load Vulkan library: {e}")))?;

        if enable_validation && !Self::validation_layer_available(&entry)? {
            return Err(VulkanError::UnsupportedCapability(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }

        // Platform surface extensions come from the windowing layer; an
        // empty/failed answer means no presentable driver at all.
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .map_err(|e| {
                    VulkanError::Environment(format!(
                        "windowing layer reports no Vulkan support: {e}"
                    ))
                })?
                .to_vec();

        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let app_name = c"Triangle";
        let engine_name = c"No Engine";
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let debug = if enable_validation {
            Some(Self::install_sink(&entry, &instance, sink)?)
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance (validation: {})",
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug,
            validation_enabled: enable_validation,
        })
    }

    /// Whether the validation layer list must be propagated to device
    /// creation. Devices do not re-validate layer availability.
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties()?;
        Ok(contains_layer(&layers, VALIDATION_LAYER))
    }

    fn install_sink(
        entry: &Entry,
        instance: &ash::Instance,
        sink: Box<dyn DiagnosticSink>,
    ) -> VulkanResult<DebugMessenger> {
        let loader = ash::extensions::ext::DebugUtils::new(entry, instance);

        // Double box: the callback gets a thin pointer to the fat one.
        let sink = Box::new(sink);
        let user_data = &*sink as *const Box<dyn DiagnosticSink> as *mut c_void;

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }?;

        Ok(DebugMessenger {
            loader,
            messenger,
            _sink: sink,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance");
        unsafe {
            // Messenger (and its sink) go first; nothing may reference the
            // sink after instance teardown.
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn contains_layer(layers: &[vk::LayerProperties], name: &CStr) -> bool {
    layers.iter().any(|layer| {
        // layer_name is a fixed-size NUL-padded array
        unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) == name }
    })
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }

    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    let sink = &*(p_user_data as *const Box<dyn DiagnosticSink>);
    sink.report(message_severity, &message);

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn report(&self, _severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
            self.messages.lock().unwrap().push(message.to_owned());
        }
    }

    #[test]
    fn sink_is_swappable_without_driver_registration() {
        let sink = RecordingSink {
            messages: Mutex::new(Vec::new()),
        };
        sink.report(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            "image barrier mismatch",
        );
        sink.report(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "lost device");

        let messages = sink.messages.lock().unwrap();
        assert_eq!(
            *messages,
            vec!["image barrier mismatch".to_owned(), "lost device".to_owned()]
        );
    }

    fn layer(name: &str) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (i, byte) in name.bytes().enumerate() {
            props.layer_name[i] = byte as c_char;
        }
        props
    }

    #[test]
    fn finds_validation_layer_anywhere_in_list() {
        let layers = [layer("VK_LAYER_MESA_overlay"), layer("VK_LAYER_KHRONOS_validation")];
        assert!(contains_layer(&layers, VALIDATION_LAYER));
    }

    #[test]
    fn missing_validation_layer_is_detected() {
        let layers = [layer("VK_LAYER_MESA_overlay")];
        assert!(!contains_layer(&layers, VALIDATION_LAYER));
        assert!(!contains_layer(&[], VALIDATION_LAYER));
    }
}
