//! HID backend trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::types::KeyboardReport;
use crate::error::Result;

/// Default USB gadget keyboard device
pub const DEFAULT_KEYBOARD_DEVICE: &str = "/dev/hidg0";

fn default_keyboard_device() -> String {
    DEFAULT_KEYBOARD_DEVICE.to_string()
}

/// HID backend type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HidBackendType {
    /// USB OTG gadget mode
    Otg {
        /// HID gadget device path
        #[serde(default = "default_keyboard_device")]
        device: String,
    },
    /// Reports are traced and dropped
    None,
}

impl Default for HidBackendType {
    fn default() -> Self {
        Self::detect()
    }
}

impl HidBackendType {
    /// Check if the default gadget keyboard exists on this system
    pub fn otg_available() -> bool {
        Path::new(DEFAULT_KEYBOARD_DEVICE).exists()
    }

    /// Detect the best available backend
    pub fn detect() -> Self {
        if Self::otg_available() {
            return Self::Otg {
                device: default_keyboard_device(),
            };
        }
        Self::None
    }

    /// Get backend name as string
    pub fn name_str(&self) -> &str {
        match self {
            Self::Otg { .. } => "otg",
            Self::None => "none",
        }
    }
}

/// Sink for assembled keyboard reports
#[async_trait]
pub trait HidBackend: Send + Sync {
    /// Get backend name
    fn name(&self) -> &'static str;

    /// Initialize the backend
    async fn init(&self) -> Result<()>;

    /// Transmit one keyboard report
    async fn send_report(&self, report: &KeyboardReport) -> Result<()>;

    /// Shutdown the backend
    async fn shutdown(&self) -> Result<()>;

    /// Whether the device last accepted a report
    fn is_online(&self) -> bool {
        true
    }
}

/// Backend used when no gadget is configured
#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl HidBackend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn init(&self) -> Result<()> {
        tracing::warn!("HID backend disabled, keyboard reports will be dropped");
        Ok(())
    }

    async fn send_report(&self, report: &KeyboardReport) -> Result<()> {
        tracing::debug!("Dropping keyboard report: {:02X?}", report.to_bytes());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
