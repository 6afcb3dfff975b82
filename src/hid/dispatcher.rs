//! Keyboard event dispatcher
//!
//! Turns decoded browser key events into HID keyboard reports:
//!
//! ```text
//! JSON frame -> KeyboardEvent -> keymap::lookup -> KeyState -> KeyboardReport -> HidBackend
//! ```
//!
//! The dispatcher exclusively owns the held-key state. Every handled frame
//! produces at most one report; anything it cannot use is dropped without
//! touching the state.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::HidBackend;
use super::keymap;
use super::state::{KeyState, KeyTracking, ReleasePolicy};
use super::types::{KeyEventType, KeyboardEvent, KeyboardReport};
use crate::debug_throttled;
use crate::error::AppError;
use crate::utils::LogThrottler;

/// Why a frame produced no report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a well-formed key event
    Malformed,
    /// Key identifier has no usage code
    Unmapped,
    /// Chord tracking already holds six keys
    Rollover,
    /// Release of a key that is not held
    NotHeld,
}

/// Outcome of handling one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A report with at least one held key was emitted
    Press(KeyboardReport),
    /// The all-released report was emitted
    Release(KeyboardReport),
    /// Nothing was emitted
    Ignored(IgnoreReason),
}

/// Dispatch behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    pub key_tracking: KeyTracking,
    pub release_policy: ReleasePolicy,
}

/// Counters shared with the status endpoint
#[derive(Debug, Default)]
pub struct DispatchStats {
    press_reports: AtomicU64,
    release_reports: AtomicU64,
    ignored: AtomicU64,
    send_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub press_reports: u64,
    pub release_reports: u64,
    pub ignored: u64,
    pub send_errors: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            press_reports: self.press_reports.load(Ordering::Relaxed),
            release_reports: self.release_reports.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, dispatch: &Dispatch) {
        let counter = match dispatch {
            Dispatch::Press(_) => &self.press_reports,
            Dispatch::Release(_) => &self.release_reports,
            Dispatch::Ignored(_) => &self.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives key state and report emission for one keyboard
pub struct EventDispatcher {
    backend: Arc<dyn HidBackend>,
    state: KeyState,
    options: DispatchOptions,
    stats: Arc<DispatchStats>,
    log_throttler: LogThrottler,
}

impl EventDispatcher {
    pub fn new(backend: Arc<dyn HidBackend>, options: DispatchOptions) -> Self {
        Self {
            backend,
            state: KeyState::new(),
            options,
            stats: Arc::new(DispatchStats::default()),
            log_throttler: LogThrottler::with_secs(5),
        }
    }

    /// Share counters with an existing stats block
    pub fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Currently held keys
    pub fn state(&self) -> &KeyState {
        &self.state
    }

    /// Handle one raw frame from the transport
    pub async fn handle_frame(&mut self, data: &[u8]) -> Dispatch {
        match KeyboardEvent::from_json(data) {
            Ok(event) => self.handle_event(&event).await,
            Err(e) => {
                debug_throttled!(
                    self.log_throttler,
                    "malformed_frame",
                    "Dropping malformed key event ({} bytes): {}",
                    data.len(),
                    e
                );
                self.finish(Dispatch::Ignored(IgnoreReason::Malformed))
            }
        }
    }

    /// Handle one decoded key event
    pub async fn handle_event(&mut self, event: &KeyboardEvent) -> Dispatch {
        trace!("Key event: {:?}", event);
        let dispatch = match event.event_type {
            KeyEventType::Down => self.key_down(event).await,
            KeyEventType::Up => self.key_up(event).await,
        };
        self.finish(dispatch)
    }

    /// Release everything and tell the host
    pub async fn reset(&mut self) -> Dispatch {
        self.state.clear_all();
        let dispatch = self.emit(KeyboardReport::release()).await;
        self.finish(dispatch)
    }

    async fn key_down(&mut self, event: &KeyboardEvent) -> Dispatch {
        let Some(usage) = keymap::lookup(&event.code) else {
            debug!("Unmapped key down: {:?}", event.code);
            return Dispatch::Ignored(IgnoreReason::Unmapped);
        };
        let modifiers = event.modifiers.to_hid_byte();

        match self.options.key_tracking {
            KeyTracking::Single => self.state.set_single(usage),
            KeyTracking::Chord => {
                if !self.state.insert(usage) {
                    debug!("Key rollover, dropping 0x{:02X}", usage);
                    return Dispatch::Ignored(IgnoreReason::Rollover);
                }
            }
        }

        self.emit(KeyboardReport::press(modifiers, self.state.snapshot()))
            .await
    }

    async fn key_up(&mut self, event: &KeyboardEvent) -> Dispatch {
        match self.options.release_policy {
            ReleasePolicy::All => self.state.clear_all(),
            ReleasePolicy::One => {
                let Some(usage) = keymap::lookup(&event.code) else {
                    debug!("Unmapped key up: {:?}", event.code);
                    return Dispatch::Ignored(IgnoreReason::Unmapped);
                };
                if !self.state.remove(usage) {
                    debug!("Key up for 0x{:02X}, which is not held", usage);
                    return Dispatch::Ignored(IgnoreReason::NotHeld);
                }
            }
        }

        let report = if self.state.is_empty() {
            KeyboardReport::release()
        } else {
            KeyboardReport::press(event.modifiers.to_hid_byte(), self.state.snapshot())
        };
        self.emit(report).await
    }

    /// Hand a report to the backend; failures are logged, never retried
    async fn emit(&self, report: KeyboardReport) -> Dispatch {
        match self.backend.send_report(&report).await {
            Ok(()) => self.log_throttler.clear("send_failed"),
            Err(e) => self.send_failed(e),
        }

        if report.is_release() {
            Dispatch::Release(report)
        } else {
            Dispatch::Press(report)
        }
    }

    fn send_failed(&self, e: AppError) {
        self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(suppressed) = self.log_throttler.check("send_failed") {
            if suppressed > 0 {
                warn!(
                    "Failed to send keyboard report: {} ({} more suppressed)",
                    e, suppressed
                );
            } else {
                warn!("Failed to send keyboard report: {}", e);
            }
        }
    }

    fn finish(&self, dispatch: Dispatch) -> Dispatch {
        self.stats.record(&dispatch);
        dispatch
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::hid::keymap::usb;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Backend that remembers every report it was given
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub reports: Mutex<Vec<KeyboardReport>>,
        pub fail: bool,
    }

    impl RecordingBackend {
        pub fn sent(&self) -> Vec<[u8; 8]> {
            self.reports.lock().iter().map(|r| r.to_bytes()).collect()
        }
    }

    #[async_trait]
    impl HidBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn send_report(&self, report: &KeyboardReport) -> Result<()> {
            self.reports.lock().push(*report);
            if self.fail {
                return Err(AppError::HidError {
                    backend: "recording".to_string(),
                    reason: "unplugged".to_string(),
                    error_code: "eshutdown".to_string(),
                });
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher(options: DispatchOptions) -> (EventDispatcher, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        (EventDispatcher::new(backend.clone(), options), backend)
    }

    fn default_dispatcher() -> (EventDispatcher, Arc<RecordingBackend>) {
        dispatcher(DispatchOptions::default())
    }

    const RELEASED: [u8; 8] = [0; 8];

    #[tokio::test]
    async fn test_press_letter_without_modifiers() {
        let (mut d, backend) = default_dispatcher();
        let result = d
            .handle_frame(
                br#"{"type":"down","code":"KeyA","ctrl":false,"shift":false,"alt":false,"meta":false}"#,
            )
            .await;

        assert!(matches!(result, Dispatch::Press(_)));
        assert_eq!(backend.sent(), vec![[0x00, 0x00, usb::KEY_A, 0, 0, 0, 0, 0]]);
        assert_eq!(d.state().snapshot(), [usb::KEY_A, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_press_digit_zero_with_shift() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"Digit0","shift":true}"#)
            .await;

        assert_eq!(backend.sent(), vec![[0x02, 0x00, usb::KEY_0, 0, 0, 0, 0, 0]]);
    }

    #[tokio::test]
    async fn test_up_releases_everything() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"KeyQ","ctrl":true}"#)
            .await;
        d.handle_frame(br#"{"type":"down","code":"Digit5"}"#).await;

        // Names a key that is not held
        let result = d.handle_frame(br#"{"type":"up","code":"KeyZ"}"#).await;

        assert_eq!(result, Dispatch::Release(KeyboardReport::release()));
        assert_eq!(backend.sent().last(), Some(&RELEASED));
        assert!(d.state().is_empty());
    }

    #[tokio::test]
    async fn test_up_for_unmapped_key_still_releases() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"Space"}"#).await;
        let result = d
            .handle_frame(br#"{"type":"up","code":"ShiftLeft","shift":true}"#)
            .await;

        assert!(matches!(result, Dispatch::Release(_)));
        assert_eq!(backend.sent().len(), 2);
        assert_eq!(backend.sent()[1], RELEASED);
    }

    #[tokio::test]
    async fn test_up_with_nothing_held() {
        let (mut d, backend) = default_dispatcher();
        let result = d.handle_frame(br#"{"type":"up","code":"KeyZ"}"#).await;
        assert!(matches!(result, Dispatch::Release(_)));
        assert_eq!(backend.sent(), vec![RELEASED]);
    }

    #[tokio::test]
    async fn test_unmapped_down_is_ignored() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"KeyB"}"#).await;
        let before = *d.state();

        let result = d.handle_frame(br#"{"type":"down","code":"Unknown123"}"#).await;

        assert_eq!(result, Dispatch::Ignored(IgnoreReason::Unmapped));
        assert_eq!(backend.sent().len(), 1);
        assert_eq!(*d.state(), before);
    }

    #[tokio::test]
    async fn test_repeated_down_emits_identical_reports() {
        let (mut d, backend) = default_dispatcher();
        let frame = br#"{"type":"down","code":"KeyK","alt":true,"meta":true}"#;
        d.handle_frame(frame).await;
        d.handle_frame(frame).await;

        let sent = backend.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(sent[0], [0x0C, 0x00, 0x0E, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_single_tracking_replaces_key() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"KeyA"}"#).await;
        d.handle_frame(br#"{"type":"down","code":"KeyB"}"#).await;

        assert_eq!(backend.sent()[1], [0, 0, 0x05, 0, 0, 0, 0, 0]);
        assert_eq!(d.state().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"KeyC"}"#).await;
        let before = *d.state();

        let frames: [&[u8]; 6] = [
            b"",
            b"\xff\xfe",
            b"{",
            br#""down""#,
            br#"{"type":"hold","code":"KeyA"}"#,
            br#"{"type":"up","ctrl":1}"#,
        ];
        for frame in frames {
            assert_eq!(
                d.handle_frame(frame).await,
                Dispatch::Ignored(IgnoreReason::Malformed)
            );
        }

        assert_eq!(backend.sent().len(), 1);
        assert_eq!(*d.state(), before);
        assert_eq!(d.stats().snapshot().ignored, 6);
    }

    #[tokio::test]
    async fn test_chord_tracking_with_release_one() {
        let (mut d, backend) = dispatcher(DispatchOptions {
            key_tracking: KeyTracking::Chord,
            release_policy: ReleasePolicy::One,
        });

        d.handle_frame(br#"{"type":"down","code":"KeyA","shift":true}"#)
            .await;
        d.handle_frame(br#"{"type":"down","code":"KeyB","shift":true}"#)
            .await;
        assert_eq!(backend.sent()[1], [0x02, 0, 0x04, 0x05, 0, 0, 0, 0]);

        let result = d
            .handle_frame(br#"{"type":"up","code":"KeyA","shift":true}"#)
            .await;
        assert!(matches!(result, Dispatch::Press(_)));
        assert_eq!(backend.sent()[2], [0x02, 0, 0x05, 0, 0, 0, 0, 0]);

        // Unmapped release under this policy does nothing
        let result = d.handle_frame(br#"{"type":"up","code":"F13"}"#).await;
        assert_eq!(result, Dispatch::Ignored(IgnoreReason::Unmapped));

        let result = d.handle_frame(br#"{"type":"up","code":"KeyB"}"#).await;
        assert!(matches!(result, Dispatch::Release(_)));
        assert_eq!(backend.sent().last(), Some(&RELEASED));
    }

    #[tokio::test]
    async fn test_release_one_ignores_keys_not_held() {
        let (mut d, backend) = dispatcher(DispatchOptions {
            key_tracking: KeyTracking::Single,
            release_policy: ReleasePolicy::One,
        });

        d.handle_frame(br#"{"type":"down","code":"KeyA"}"#).await;
        // KeyA was replaced by KeyB
        d.handle_frame(br#"{"type":"down","code":"KeyB"}"#).await;

        let result = d.handle_frame(br#"{"type":"up","code":"KeyA"}"#).await;
        assert_eq!(result, Dispatch::Ignored(IgnoreReason::NotHeld));
        assert_eq!(backend.sent().len(), 2);
        assert_eq!(d.state().snapshot(), [0x05, 0, 0, 0, 0, 0]);

        let result = d.handle_frame(br#"{"type":"up","code":"KeyB"}"#).await;
        assert!(matches!(result, Dispatch::Release(_)));

        // Nothing held at all
        let result = d.handle_frame(br#"{"type":"up","code":"KeyB"}"#).await;
        assert_eq!(result, Dispatch::Ignored(IgnoreReason::NotHeld));
        assert_eq!(
            backend.sent(),
            vec![
                [0, 0, 0x04, 0, 0, 0, 0, 0],
                [0, 0, 0x05, 0, 0, 0, 0, 0],
                RELEASED,
            ]
        );
    }

    #[tokio::test]
    async fn test_chord_rollover() {
        let (mut d, backend) = dispatcher(DispatchOptions {
            key_tracking: KeyTracking::Chord,
            release_policy: ReleasePolicy::All,
        });
        for code in ["KeyA", "KeyB", "KeyC", "KeyD", "KeyE", "KeyF"] {
            let event = KeyboardEvent::key_down(code, Default::default());
            assert!(matches!(d.handle_event(&event).await, Dispatch::Press(_)));
        }
        let event = KeyboardEvent::key_down("KeyG", Default::default());
        assert_eq!(
            d.handle_event(&event).await,
            Dispatch::Ignored(IgnoreReason::Rollover)
        );
        assert_eq!(backend.sent().len(), 6);
        assert_eq!(d.state().snapshot(), [0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);

        // Release-all clears the whole chord
        let event = KeyboardEvent::key_up("KeyC", Default::default());
        assert!(matches!(d.handle_event(&event).await, Dispatch::Release(_)));
        assert!(d.state().is_empty());
    }

    #[tokio::test]
    async fn test_reset_emits_release() {
        let (mut d, backend) = default_dispatcher();
        d.handle_frame(br#"{"type":"down","code":"Enter"}"#).await;
        assert_eq!(d.reset().await, Dispatch::Release(KeyboardReport::release()));
        assert!(d.state().is_empty());
        assert_eq!(backend.sent().last(), Some(&RELEASED));
    }

    #[tokio::test]
    async fn test_send_failure_is_counted_not_raised() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let mut d = EventDispatcher::new(backend.clone(), DispatchOptions::default());

        let result = d.handle_frame(br#"{"type":"down","code":"Tab"}"#).await;
        assert!(matches!(result, Dispatch::Press(_)));
        d.handle_frame(br#"{"type":"up","code":"Tab"}"#).await;

        let stats = d.stats().snapshot();
        assert_eq!(stats.send_errors, 2);
        assert_eq!(stats.press_reports, 1);
        assert_eq!(stats.release_reports, 1);
        assert_eq!(backend.sent().len(), 2);
    }
}
