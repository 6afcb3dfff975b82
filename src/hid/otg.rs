//! OTG USB Gadget HID backend
//!
//! Writes 8-byte boot keyboard reports to a Linux USB gadget HID function
//! (usually `/dev/hidg0`). The gadget itself (configfs, UDC binding) must
//! already be set up by the host system.
//!
//! Error Recovery:
//! ESHUTDOWN closes the device handle, which is reopened on the next write.
//! EAGAIN keeps the handle open; after `EAGAIN_OFFLINE_THRESHOLD` consecutive
//! occurrences the device is reported offline.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::backend::HidBackend;
use super::types::KeyboardReport;
use crate::error::{AppError, Result};

/// Threshold for consecutive EAGAIN errors before reporting offline
const EAGAIN_OFFLINE_THRESHOLD: u32 = 3;

/// Keyboard gadget backend
pub struct OtgBackend {
    /// Keyboard device path (/dev/hidg0)
    keyboard_path: PathBuf,
    /// Keyboard device file
    keyboard_dev: Mutex<Option<File>>,
    /// Whether the last write succeeded
    online: AtomicBool,
    /// Last error log time for throttling
    last_error_log: Mutex<Option<Instant>>,
    /// Errors suppressed since the last logged one
    error_count: AtomicU32,
    /// Consecutive EAGAIN count (for offline threshold detection)
    eagain_count: AtomicU32,
}

impl OtgBackend {
    pub fn new(keyboard_path: impl Into<PathBuf>) -> Self {
        Self {
            keyboard_path: keyboard_path.into(),
            keyboard_dev: Mutex::new(None),
            online: AtomicBool::new(false),
            last_error_log: Mutex::new(None),
            error_count: AtomicU32::new(0),
            eagain_count: AtomicU32::new(0),
        }
    }

    /// Log throttled error message (max once per second)
    fn log_throttled_error(&self, msg: &str) {
        let mut last_log = self.last_error_log.lock();
        let now = Instant::now();
        let due = last_log.map_or(true, |last| now.duration_since(last).as_secs() >= 1);
        if due {
            let count = self.error_count.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn!("{} (repeated {} times)", msg, count.saturating_add(1));
            } else {
                warn!("{}", msg);
            }
            *last_log = Some(now);
        } else {
            saturating_increment(&self.error_count);
        }
    }

    fn reset_error_count(&self) {
        self.error_count.store(0, Ordering::Relaxed);
        self.eagain_count.store(0, Ordering::Relaxed);
    }

    /// Make sure the device is open, reopening it after a previous failure
    fn ensure_device(&self) -> Result<()> {
        if !self.keyboard_path.exists() {
            let mut dev = self.keyboard_dev.lock();
            if dev.is_some() {
                debug!(
                    "Device path {} no longer exists, closing handle",
                    self.keyboard_path.display()
                );
                *dev = None;
            }
            self.online.store(false, Ordering::Relaxed);
            return Err(AppError::HidError {
                backend: "otg".to_string(),
                reason: format!("Device not found: {}", self.keyboard_path.display()),
                error_code: "enoent".to_string(),
            });
        }

        let mut dev = self.keyboard_dev.lock();
        if dev.is_none() {
            let file = Self::open_device(&self.keyboard_path)?;
            info!("Opened HID keyboard device: {}", self.keyboard_path.display());
            *dev = Some(file);
        }
        Ok(())
    }

    /// Open the HID device file for non-blocking writes
    fn open_device(path: &Path) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| Self::io_error_to_hid_error(e, "Failed to open keyboard device"))
    }

    /// Convert I/O error to HidError with appropriate error code
    fn io_error_to_hid_error(e: std::io::Error, operation: &str) -> AppError {
        let error_code = match e.raw_os_error() {
            Some(libc::EPIPE) => "epipe",
            Some(libc::ESHUTDOWN) => "eshutdown",
            Some(libc::EAGAIN) => "eagain",
            Some(libc::ENXIO) => "enxio",
            Some(libc::ENODEV) => "enodev",
            Some(libc::EIO) => "eio",
            Some(libc::ENOENT) => "enoent",
            Some(libc::EACCES) => "eacces",
            _ => "io_error",
        };

        AppError::HidError {
            backend: "otg".to_string(),
            reason: format!("{}: {}", operation, e),
            error_code: error_code.to_string(),
        }
    }

    /// Write one keyboard report to the gadget
    fn write_report(&self, report: &KeyboardReport) -> Result<()> {
        self.ensure_device()?;

        let mut dev = self.keyboard_dev.lock();
        let Some(file) = dev.as_mut() else {
            return Err(AppError::HidError {
                backend: "otg".to_string(),
                reason: "Keyboard device not opened".to_string(),
                error_code: "not_opened".to_string(),
            });
        };

        let data = report.to_bytes();
        match file.write_all(&data) {
            Ok(()) => {
                self.online.store(true, Ordering::Relaxed);
                self.reset_error_count();
                trace!("Sent keyboard report: {:02X?}", data);
                Ok(())
            }
            Err(e) => match e.raw_os_error() {
                Some(libc::ESHUTDOWN) => {
                    self.online.store(false, Ordering::Relaxed);
                    self.eagain_count.store(0, Ordering::Relaxed);
                    debug!("Keyboard ESHUTDOWN, closing for recovery");
                    *dev = None;
                    Err(Self::io_error_to_hid_error(e, "Failed to write keyboard report"))
                }
                Some(libc::EAGAIN) => {
                    self.log_throttled_error("HID keyboard busy (EAGAIN)");
                    let count = saturating_increment(&self.eagain_count);
                    if count >= EAGAIN_OFFLINE_THRESHOLD {
                        self.online.store(false, Ordering::Relaxed);
                        Err(AppError::HidError {
                            backend: "otg".to_string(),
                            reason: format!("Device busy ({} consecutive EAGAIN)", count),
                            error_code: "eagain".to_string(),
                        })
                    } else {
                        Err(AppError::HidError {
                            backend: "otg".to_string(),
                            reason: "Device temporarily busy".to_string(),
                            error_code: "eagain_retry".to_string(),
                        })
                    }
                }
                _ => {
                    self.online.store(false, Ordering::Relaxed);
                    self.eagain_count.store(0, Ordering::Relaxed);
                    warn!("Keyboard write error: {}", e);
                    Err(Self::io_error_to_hid_error(e, "Failed to write keyboard report"))
                }
            },
        }
    }
}

/// Bump a counter without wrapping, returning the new value
fn saturating_increment(counter: &AtomicU32) -> u32 {
    let previous = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_add(1))
        })
        .unwrap_or_else(|n| n);
    previous.saturating_add(1)
}

#[async_trait]
impl HidBackend for OtgBackend {
    fn name(&self) -> &'static str {
        "OTG USB Gadget"
    }

    async fn init(&self) -> Result<()> {
        info!(
            "Initializing OTG HID backend on {}",
            self.keyboard_path.display()
        );
        self.ensure_device()?;
        self.online.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn send_report(&self, report: &KeyboardReport) -> Result<()> {
        self.write_report(report)
    }

    async fn shutdown(&self) -> Result<()> {
        // Leave the host with nothing held
        if let Err(e) = self.write_report(&KeyboardReport::release()) {
            warn!("Failed to release keys on shutdown: {}", e);
        }
        *self.keyboard_dev.lock() = None;
        self.online.store(false, Ordering::Relaxed);
        info!("OTG backend shutdown");
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

impl Drop for OtgBackend {
    fn drop(&mut self) {
        *self.keyboard_dev.lock() = None;
        debug!("OtgBackend dropped, device file closed");
    }
}
