use std::sync::Arc;

use crate::config::AppConfig;
use crate::hid::HidController;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Effective configuration (file + command line)
    pub config: AppConfig,
    /// HID controller
    pub hid: Arc<HidController>,
}

impl AppState {
    pub fn new(config: AppConfig, hid: Arc<HidController>) -> Arc<Self> {
        Arc::new(Self { config, hid })
    }
}
