use serde::{Deserialize, Serialize};

use crate::hid::{HidBackendType, KeyTracking, ReleasePolicy};

/// Default HID event queue depth
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HID (keyboard) settings
    pub hid: HidConfig,
    /// Web server settings
    pub web: WebConfig,
}

/// HID configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    /// HID backend type (auto-detected when omitted)
    pub backend: HidBackendType,
    /// Single key or chord tracking
    pub key_tracking: KeyTracking,
    /// What a key-up releases
    pub release_policy: ReleasePolicy,
    /// Pending event queue depth
    pub queue_capacity: usize,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            backend: HidBackendType::default(),
            key_tracking: KeyTracking::default(),
            release_policy: ReleasePolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 80,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}
