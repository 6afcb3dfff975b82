//! HID (Human Interface Device) keyboard control
//!
//! Architecture:
//! ```text
//! Browser --> WebSocket --> HidController queue --> worker (EventDispatcher) --> HidBackend --> Host PC
//!                                                                                  |
//!                                                                             [OTG | none]
//! ```
//!
//! Frames are handled strictly one at a time by a single worker task, which
//! is the only owner of the held-key state.

pub mod backend;
pub mod dispatcher;
pub mod keymap;
pub mod otg;
pub mod state;
pub mod types;
pub mod websocket;

pub use backend::{HidBackend, HidBackendType, NullBackend};
pub use dispatcher::{
    Dispatch, DispatchOptions, DispatchStats, DispatchStatsSnapshot, EventDispatcher,
    IgnoreReason,
};
pub use state::{KeyState, KeyTracking, ReleasePolicy};
pub use types::{KeyEventType, KeyboardEvent, KeyboardModifiers, KeyboardReport};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::HidConfig;
use crate::error::{AppError, Result};

const HID_EVENT_SEND_TIMEOUT_MS: u64 = 30;

#[derive(Debug)]
enum HidCommand {
    /// Raw frame from a client
    Frame(Vec<u8>),
    /// Release all keys
    Reset,
    /// Wait until everything queued before this has been handled
    Flush(oneshot::Sender<()>),
}

/// HID status as reported by `/api/hid/status`
#[derive(Debug, Clone, Serialize)]
pub struct HidStatus {
    /// Backend name
    pub backend: String,
    /// Whether a worker is accepting frames
    pub available: bool,
    /// Whether the device accepted the last report
    pub online: bool,
    /// Dispatch counters
    pub stats: DispatchStatsSnapshot,
}

/// HID controller feeding browser key events to the keyboard backend
pub struct HidController {
    /// Active backend
    backend: Arc<dyn HidBackend>,
    /// Dispatch behaviour for the worker
    options: DispatchOptions,
    /// Counters shared with the worker
    stats: Arc<DispatchStats>,
    /// Event queue sender
    hid_tx: mpsc::Sender<HidCommand>,
    /// Event queue receiver (moved into the worker on start)
    hid_rx: Mutex<Option<mpsc::Receiver<HidCommand>>>,
    /// Worker task handle
    hid_worker: Mutex<Option<JoinHandle<()>>>,
}

impl HidController {
    /// Create a controller for an already constructed backend
    pub fn new(
        backend: Arc<dyn HidBackend>,
        options: DispatchOptions,
        queue_capacity: usize,
    ) -> Self {
        let (hid_tx, hid_rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            backend,
            options,
            stats: Arc::new(DispatchStats::default()),
            hid_tx,
            hid_rx: Mutex::new(Some(hid_rx)),
            hid_worker: Mutex::new(None),
        }
    }

    /// Create a controller from configuration
    pub fn from_config(config: &HidConfig) -> Self {
        info!("Configured HID backend: {}", config.backend.name_str());
        let backend: Arc<dyn HidBackend> = match &config.backend {
            HidBackendType::Otg { device } => Arc::new(otg::OtgBackend::new(device)),
            HidBackendType::None => Arc::new(NullBackend),
        };
        let options = DispatchOptions {
            key_tracking: config.key_tracking,
            release_policy: config.release_policy,
        };
        Self::new(backend, options, config.queue_capacity)
    }

    /// Initialize the backend and start the event worker
    ///
    /// A backend that fails to initialize is not fatal: the worker still
    /// starts and the device is reopened on the next report.
    pub async fn init(&self) -> Result<()> {
        if let Err(e) = self.backend.init().await {
            warn!("HID backend {} not ready: {}", self.backend.name(), e);
        }
        self.start_event_worker().await?;
        info!(
            "HID controller started: backend={}, tracking={:?}, release={:?}",
            self.backend.name(),
            self.options.key_tracking,
            self.options.release_policy
        );
        Ok(())
    }

    /// Stop the worker and shut the backend down
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down HID controller");
        if let Some(handle) = self.hid_worker.lock().await.take() {
            handle.abort();
        }
        self.backend.shutdown().await?;
        info!("HID controller shutdown complete");
        Ok(())
    }

    /// Queue one raw frame from a client
    pub async fn submit(&self, frame: Vec<u8>) -> Result<()> {
        self.enqueue(HidCommand::Frame(frame)).await
    }

    /// Release all keys
    pub async fn reset(&self) -> Result<()> {
        self.enqueue(HidCommand::Reset).await
    }

    /// Wait until every command queued so far has been handled
    pub async fn flush(&self) -> Result<()> {
        if !self.is_available().await {
            return Err(AppError::ServiceUnavailable(
                "HID worker not running".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.hid_tx
            .send(HidCommand::Flush(tx))
            .await
            .map_err(|_| AppError::ServiceUnavailable("HID event queue closed".to_string()))?;
        rx.await
            .map_err(|_| AppError::ServiceUnavailable("HID worker stopped".to_string()))
    }

    /// Whether the worker is running
    pub async fn is_available(&self) -> bool {
        self.hid_worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn status(&self) -> HidStatus {
        HidStatus {
            backend: self.backend.name().to_string(),
            available: self.is_available().await,
            online: self.backend.is_online(),
            stats: self.stats.snapshot(),
        }
    }

    async fn start_event_worker(&self) -> Result<()> {
        let mut worker_guard = self.hid_worker.lock().await;
        if worker_guard.is_some() {
            return Ok(());
        }

        let mut rx = self
            .hid_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::Internal("HID event queue already consumed".to_string()))?;

        let mut dispatcher =
            EventDispatcher::new(self.backend.clone(), self.options).with_stats(self.stats.clone());

        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    HidCommand::Frame(frame) => {
                        dispatcher.handle_frame(&frame).await;
                    }
                    HidCommand::Reset => {
                        dispatcher.reset().await;
                    }
                    HidCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        *worker_guard = Some(handle);
        Ok(())
    }

    async fn enqueue(&self, command: HidCommand) -> Result<()> {
        match self.hid_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                // Wait briefly rather than dropping input outright
                let sent = tokio::time::timeout(
                    Duration::from_millis(HID_EVENT_SEND_TIMEOUT_MS),
                    self.hid_tx.send(command),
                )
                .await;
                if !matches!(sent, Ok(Ok(()))) {
                    warn!("HID event queue full, dropping event");
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AppError::ServiceUnavailable(
                "HID event queue closed".to_string(),
            )),
        }
    }
}
