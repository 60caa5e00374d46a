//! Scripted implementations of the boundary contracts.
//!
//! Used by unit and integration tests to drive full lifecycle scenarios
//! deterministically: a location source that replays a scripted drive and a
//! sender that records (or refuses) deliveries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, TrackerError};
use crate::location::{BackgroundWatchRequest, CaptureMode, LocationSource, SampleSubscription};
use crate::sync::{TrackingUpdate, UpdateSender};
use crate::types::LocationSample;

// ============================================================================
// Scripted Location Source
// ============================================================================

/// Location source that replays a scripted drive.
///
/// Scripted samples are queued into the channel when a watch starts; tests
/// can push further samples into an open subscription with `emit`.
/// Permission and per-mode availability are toggleable to exercise the
/// controller's fallback paths.
#[derive(Default)]
pub struct SyntheticDrive {
    permission_granted: AtomicBool,
    background_available: AtomicBool,
    foreground_available: AtomicBool,
    script: Mutex<VecDeque<LocationSample>>,
    oneshot_fix: Mutex<Option<LocationSample>>,
    live_tx: Mutex<Option<mpsc::Sender<LocationSample>>>,
    watches_started: AtomicU32,
}

impl SyntheticDrive {
    /// Fully available source: permission granted, both modes up.
    pub fn new() -> Self {
        Self::with_availability(true, true, true)
    }

    pub fn with_availability(
        permission_granted: bool,
        background_available: bool,
        foreground_available: bool,
    ) -> Self {
        Self {
            permission_granted: AtomicBool::new(permission_granted),
            background_available: AtomicBool::new(background_available),
            foreground_available: AtomicBool::new(foreground_available),
            ..Self::default()
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    pub fn set_background_available(&self, available: bool) {
        self.background_available.store(available, Ordering::SeqCst);
    }

    pub fn set_foreground_available(&self, available: bool) {
        self.foreground_available.store(available, Ordering::SeqCst);
    }

    /// Queue samples to be delivered as soon as the next watch starts.
    pub fn script_samples(&self, samples: impl IntoIterator<Item = LocationSample>) {
        self.script.lock().unwrap().extend(samples);
    }

    /// Set the fix returned by the next `sample_once` call.
    pub fn set_oneshot_fix(&self, sample: LocationSample) {
        *self.oneshot_fix.lock().unwrap() = Some(sample);
    }

    /// Push a sample into the currently open subscription.
    /// Returns false when no subscription is open (or it was stopped).
    pub async fn emit(&self, sample: LocationSample) -> bool {
        let tx = self.live_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(sample).await.is_ok(),
            None => false,
        }
    }

    /// Number of watches started over this source's lifetime.
    pub fn watches_started(&self) -> u32 {
        self.watches_started.load(Ordering::SeqCst)
    }

    fn open_subscription(&self, mode: CaptureMode) -> SampleSubscription {
        let scripted: Vec<LocationSample> = self.script.lock().unwrap().drain(..).collect();
        let (tx, rx) = mpsc::channel(scripted.len() + 16);
        for sample in scripted {
            let _ = tx.try_send(sample);
        }
        *self.live_tx.lock().unwrap() = Some(tx);
        self.watches_started.fetch_add(1, Ordering::SeqCst);
        SampleSubscription::new(mode, rx)
    }
}

#[async_trait]
impl LocationSource for SyntheticDrive {
    async fn request_permission(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    async fn sample_once(&self) -> Option<LocationSample> {
        self.oneshot_fix.lock().unwrap().take()
    }

    async fn watch(&self) -> Result<SampleSubscription> {
        if !self.foreground_available.load(Ordering::SeqCst) {
            return Err(TrackerError::SubscriptionFailed {
                message: "foreground watch unavailable".to_string(),
            });
        }
        Ok(self.open_subscription(CaptureMode::Foreground))
    }

    async fn watch_background(
        &self,
        _request: &BackgroundWatchRequest,
    ) -> Result<SampleSubscription> {
        if !self.background_available.load(Ordering::SeqCst) {
            return Err(TrackerError::SubscriptionFailed {
                message: "background watch unavailable".to_string(),
            });
        }
        Ok(self.open_subscription(CaptureMode::Background))
    }
}

// ============================================================================
// Recording Sender
// ============================================================================

/// Sender that records every delivery; can be flipped offline to exercise
/// the queue path.
#[derive(Default)]
pub struct RecordingSender {
    offline: AtomicBool,
    sent: Mutex<Vec<TrackingUpdate>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let sender = Self::default();
        sender.set_offline(true);
        sender
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Everything delivered so far, in send order.
    pub fn sent(&self) -> Vec<TrackingUpdate> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSender for RecordingSender {
    async fn send_update(&self, update: &TrackingUpdate, _token: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TrackerError::Http {
                message: "network unreachable".to_string(),
                status_code: None,
            });
        }
        self.sent.lock().unwrap().push(update.clone());
        Ok(())
    }
}
