//! Diagnostics bridge between the Vulkan debug-utils messenger and the
//! application's logger.
//!
//! Backend messages are classified into [`DiagnosticSeverity`] levels and
//! forwarded to a caller-supplied [`DiagnosticsSink`]. A fatal
//! classification latches, and the next device-touching operation reports
//! device loss.

use std::borrow::Cow;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Severity of a backend diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
    /// The device is unusable; full reinitialization is required.
    Fatal,
}

/// Sink for backend diagnostic messages.
///
/// Implementers receive the message verbatim; any logger satisfying this
/// capability can be injected.
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, severity: DiagnosticSeverity, message: &str);
}

/// Default sink forwarding to `tracing` at the mapped level.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, severity: DiagnosticSeverity, message: &str) {
        match severity {
            DiagnosticSeverity::Info => tracing::info!("Vulkan: {message}"),
            DiagnosticSeverity::Warning => tracing::warn!("Vulkan: {message}"),
            DiagnosticSeverity::Error => tracing::error!("Vulkan: {message}"),
            DiagnosticSeverity::Fatal => tracing::error!("Vulkan (fatal): {message}"),
        }
    }
}

/// Classify a backend message into a diagnostic severity.
///
/// Error-severity messages reporting device loss classify as fatal.
pub fn classify(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message: &str,
) -> DiagnosticSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        if message.contains("DEVICE_LOST") || message.contains("device lost") {
            DiagnosticSeverity::Fatal
        } else {
            DiagnosticSeverity::Error
        }
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        DiagnosticSeverity::Warning
    } else {
        DiagnosticSeverity::Info
    }
}

struct BridgeState {
    sink: Box<dyn DiagnosticsSink>,
    fatal: AtomicBool,
}

/// Bridge owning the sink and the fatal latch.
///
/// Cloning shares the underlying state; the debug messenger and the
/// device context each hold one handle.
#[derive(Clone)]
pub struct DiagnosticsBridge {
    state: Arc<BridgeState>,
}

impl DiagnosticsBridge {
    /// Create a bridge forwarding into the given sink.
    pub fn new(sink: Box<dyn DiagnosticsSink>) -> Self {
        Self {
            state: Arc::new(BridgeState {
                sink,
                fatal: AtomicBool::new(false),
            }),
        }
    }

    /// Emit a message, latching the fatal flag for fatal severities.
    pub fn emit(&self, severity: DiagnosticSeverity, message: &str) {
        if severity == DiagnosticSeverity::Fatal {
            self.state.fatal.store(true, Ordering::Release);
        }
        self.state.sink.emit(severity, message);
    }

    /// Whether a fatal diagnostic has been reported.
    pub fn fatal_reported(&self) -> bool {
        self.state.fatal.load(Ordering::Acquire)
    }

    /// Latch the fatal flag directly, e.g. on a `DEVICE_LOST` result from
    /// a submit or present call.
    pub fn report_fatal(&self, message: &str) {
        self.emit(DiagnosticSeverity::Fatal, message);
    }

    /// Error out if a fatal diagnostic has been latched.
    pub fn ensure_healthy(&self) -> Result<()> {
        if self.fatal_reported() {
            Err(GpuError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Default for DiagnosticsBridge {
    fn default() -> Self {
        Self::new(Box::new(TracingSink))
    }
}

/// Debug-utils messenger forwarding backend messages into a bridge.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Keeps the callback user-data pointer valid for the messenger's lifetime.
    _state: Arc<BridgeState>,
}

impl DebugMessenger {
    /// Register a messenger on the instance.
    ///
    /// # Safety
    /// The entry and instance must be valid, and the debug-utils extension
    /// must have been enabled at instance creation.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        bridge: &DiagnosticsBridge,
    ) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(Arc::as_ptr(&bridge.state).cast_mut().cast());

        let messenger = loader.create_debug_utils_messenger(&create_info, None)?;

        Ok(Self {
            loader,
            messenger,
            _state: bridge.state.clone(),
        })
    }

    /// Destroy the messenger.
    ///
    /// # Safety
    /// The owning instance must still be alive.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

/// Format object-name context the way the backend attaches it.
fn join_labels<'a>(labels: impl Iterator<Item = Option<&'a str>>) -> String {
    labels.flatten().collect::<Vec<_>>().join("|")
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let state = &*user_data.cast::<BridgeState>();
    let callback_data = &*p_callback_data;

    let message = if callback_data.p_message.is_null() {
        Cow::Borrowed("(no message)")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    let objects = if callback_data.object_count == 0 || callback_data.p_objects.is_null() {
        String::new()
    } else {
        join_labels(
            std::slice::from_raw_parts(
                callback_data.p_objects,
                callback_data.object_count as usize,
            )
            .iter()
            .map(|obj| {
                (!obj.p_object_name.is_null())
                    .then(|| CStr::from_ptr(obj.p_object_name).to_str().ok())
                    .flatten()
            }),
        )
    };

    let full = if objects.is_empty() {
        message.into_owned()
    } else {
        format!("[{objects}] {message}")
    };

    let severity = classify(message_severity, &full);
    if severity == DiagnosticSeverity::Fatal {
        state.fatal.store(true, Ordering::Release);
    }
    state.sink.emit(severity, &full);

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<(DiagnosticSeverity, String)>>);

    impl DiagnosticsSink for RecordingSink {
        fn emit(&self, severity: DiagnosticSeverity, message: &str) {
            self.0.lock().unwrap().push((severity, message.to_string()));
        }
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE, "x"),
            DiagnosticSeverity::Info
        );
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::INFO, "x"),
            DiagnosticSeverity::Info
        );
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, "x"),
            DiagnosticSeverity::Warning
        );
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "x"),
            DiagnosticSeverity::Error
        );
    }

    #[test]
    fn device_loss_classifies_fatal() {
        assert_eq!(
            classify(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                "VK_ERROR_DEVICE_LOST on queue submit"
            ),
            DiagnosticSeverity::Fatal
        );
        // Device-loss text at warning severity stays a warning.
        assert_eq!(
            classify(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                "DEVICE_LOST mentioned in passing"
            ),
            DiagnosticSeverity::Warning
        );
    }

    #[test]
    fn fatal_latches_and_surfaces_device_lost() {
        let bridge = DiagnosticsBridge::new(Box::new(RecordingSink(Mutex::new(Vec::new()))));
        assert!(bridge.ensure_healthy().is_ok());

        bridge.emit(DiagnosticSeverity::Error, "recoverable");
        assert!(bridge.ensure_healthy().is_ok());

        bridge.report_fatal("device lost");
        assert!(bridge.fatal_reported());
        assert!(matches!(bridge.ensure_healthy(), Err(GpuError::DeviceLost)));
    }

    #[test]
    fn messages_are_forwarded_verbatim() {
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        struct Fwd(Arc<RecordingSink>);
        impl DiagnosticsSink for Fwd {
            fn emit(&self, severity: DiagnosticSeverity, message: &str) {
                self.0.emit(severity, message);
            }
        }

        let bridge = DiagnosticsBridge::new(Box::new(Fwd(sink.clone())));
        bridge.emit(DiagnosticSeverity::Warning, "swapchain suboptimal");

        let recorded = sink.0.lock().unwrap();
        assert_eq!(
            recorded.as_slice(),
            &[(
                DiagnosticSeverity::Warning,
                "swapchain suboptimal".to_string()
            )]
        );
    }
}
