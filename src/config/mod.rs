//! Application configuration
//!
//! Configuration is read from an optional JSON file; every field has a
//! default, and the command line may override individual values afterwards.

mod schema;

pub use schema::*;

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::info;

use crate::error::{AppError, Result};
use crate::hid::HidBackendType;

impl AppConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_slice(&raw)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check values that serde alone cannot
    pub fn validate(&self) -> Result<()> {
        if self.web.http_port == 0 {
            return Err(AppError::Config("http_port must not be 0".to_string()));
        }
        self.web.bind_ip()?;
        if let HidBackendType::Otg { device } = &self.hid.backend {
            if device.trim().is_empty() {
                return Err(AppError::Config("OTG device path is empty".to_string()));
            }
        }
        if self.hid.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must not be 0".to_string()));
        }
        Ok(())
    }
}

impl WebConfig {
    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid bind address: {}", self.bind_address)))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.http_port))
    }
}
