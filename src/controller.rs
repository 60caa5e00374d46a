//! # Transport Lifecycle Controller
//!
//! Owns the transport status, starts and stops location capture and
//! analytics in lockstep, restores a live session after a process restart
//! and fans every captured sample out to both the analytics engine and the
//! sync boundary.
//!
//! The controller is driven by the surrounding event loop: lifecycle
//! transitions are explicit async calls, and `pump` awaits the next sample
//! from the active subscription. Subscription failures are caught and
//! surfaced as typed errors with user-facing messages; they never panic
//! across this boundary.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::analytics::TripAnalyticsEngine;
use crate::error::{Result, TrackerError};
use crate::location::{
    BackgroundWatchRequest, CaptureMode, LocationSource, SampleSubscription,
};
use crate::store::{self, StateStore, TripRepository};
use crate::sync::{SyncBoundary, TrackingUpdate, UpdateSender, UpdateStatus};
use crate::types::{LocationSample, TransportState, TransportStatus, TripCandidate};

// ============================================================================
// Configuration
// ============================================================================

/// Timing knobs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before re-acquiring the subscription during session restore,
    /// so dependent consumers mount first. Default: 500 ms
    pub restore_resubscribe_delay: Duration,

    /// Upper bound on the final best-effort capture at finish.
    /// Default: 10 s
    pub final_capture_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            restore_resubscribe_delay: Duration::from_millis(500),
            final_capture_timeout: Duration::from_secs(10),
        }
    }
}

/// Progress of the once-per-process session restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    NotStarted,
    InProgress,
    Done,
}

// ============================================================================
// Controller
// ============================================================================

/// Transport lifecycle state machine.
pub struct TransportController {
    state: TransportState,
    analytics: TripAnalyticsEngine,
    source: Arc<dyn LocationSource>,
    sync: SyncBoundary,
    store: Arc<dyn StateStore>,
    subscription: Option<SampleSubscription>,
    restore_phase: RestorePhase,
    selected_course_id: Option<String>,
    vehicle_number: Option<String>,
    auth_token: Option<String>,
    config: ControllerConfig,
}

impl TransportController {
    pub fn new(
        source: Arc<dyn LocationSource>,
        store: Arc<dyn StateStore>,
        sender: Arc<dyn UpdateSender>,
    ) -> Self {
        Self::with_config(source, store, sender, ControllerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn LocationSource>,
        store: Arc<dyn StateStore>,
        sender: Arc<dyn UpdateSender>,
        config: ControllerConfig,
    ) -> Self {
        let analytics = TripAnalyticsEngine::new(TripRepository::new(store.clone()));
        let sync = SyncBoundary::new(sender, store.clone());
        Self {
            state: TransportState::default(),
            analytics,
            source,
            sync,
            store,
            subscription: None,
            restore_phase: RestorePhase::NotStarted,
            selected_course_id: None,
            vehicle_number: None,
            auth_token: None,
            config,
        }
    }

    // ========================================================================
    // Session Setup
    // ========================================================================

    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.auth_token = Some(token.into());
    }

    pub fn set_vehicle_number(&mut self, vehicle_number: impl Into<String>) {
        self.vehicle_number = Some(vehicle_number.into());
    }

    /// Stage the trip to track: its course id and the candidate documents
    /// as shown to the driver.
    pub fn select_transport(&mut self, course_id: &str, candidates: Vec<TripCandidate>) {
        self.selected_course_id = Some(course_id.to_string());
        self.state.selected_candidates = candidates;
        self.persist_state();
    }

    // ========================================================================
    // Lifecycle Transitions
    // ========================================================================

    /// Begin capture for the selected trip.
    ///
    /// Fails without any state change when no trip is selected, permission
    /// is denied, or neither subscription mode starts. The transition to
    /// `Active` commits only after a subscription is running.
    pub async fn start_transport(&mut self) -> Result<()> {
        if self.state.status == TransportStatus::Active && self.subscription.is_some() {
            debug!("[start_transport] already active, keeping current subscription");
            return Ok(());
        }

        let course_id = self
            .selected_course_id
            .clone()
            .ok_or(TrackerError::NoTripSelected)?;
        let candidate = self
            .state
            .selected_candidates
            .first()
            .cloned()
            .ok_or(TrackerError::NoTripSelected)?;

        if !self.source.request_permission().await {
            return Err(TrackerError::PermissionDenied);
        }

        let subscription = self.acquire_subscription(&course_id, &candidate.uit).await?;

        let vehicle = self.vehicle_number.clone().unwrap_or_default();
        self.analytics
            .start_tracking(&course_id, &candidate.uit, &vehicle);

        self.state.status = TransportStatus::Active;
        self.state.active_trip_id = Some(course_id.clone());
        self.state.current_uit = Some(candidate.uit);
        self.state.is_gps_active = true;
        self.state.is_background_active = subscription.mode() == CaptureMode::Background;
        self.subscription = Some(subscription);
        self.persist_state();

        info!(
            "[start_transport] tracking {} ({})",
            course_id,
            if self.state.is_background_active {
                "background"
            } else {
                "foreground"
            }
        );
        Ok(())
    }

    /// Suspend capture, keeping all accumulated history.
    pub async fn pause_transport(&mut self) {
        if self.state.status != TransportStatus::Active {
            debug!(
                "[pause_transport] ignoring pause while {:?}",
                self.state.status
            );
            return;
        }

        self.stop_subscription();
        self.state.status = TransportStatus::Paused;
        self.state.is_gps_active = false;
        self.state.is_background_active = false;
        self.persist_state();
        info!("[pause_transport] capture paused");
    }

    /// Resume capture for the paused trip. Same subscription-acquisition
    /// mechanics as start; on failure the status remains `Paused`.
    pub async fn resume_transport(&mut self) -> Result<()> {
        if self.state.status == TransportStatus::Active && self.subscription.is_some() {
            debug!("[resume_transport] already active");
            return Ok(());
        }

        let course_id = self
            .state
            .active_trip_id
            .clone()
            .ok_or(TrackerError::NoTripSelected)?;
        let uit = self
            .state
            .current_uit
            .clone()
            .ok_or(TrackerError::NoTripSelected)?;

        if !self.source.request_permission().await {
            return Err(TrackerError::PermissionDenied);
        }

        let subscription = self.acquire_subscription(&course_id, &uit).await?;

        let vehicle = self.vehicle_number.clone().unwrap_or_default();
        self.analytics.start_tracking(&course_id, &uit, &vehicle);

        self.state.status = TransportStatus::Active;
        self.state.is_gps_active = true;
        self.state.is_background_active = subscription.mode() == CaptureMode::Background;
        self.subscription = Some(subscription);
        self.persist_state();

        info!("[resume_transport] capture resumed for {}", course_id);
        Ok(())
    }

    /// Finish the transport: stop capture, flush the queue, take one final
    /// best-effort fix tagged as the trip's last sample, finalize analytics
    /// and clear the persisted session.
    ///
    /// Always ends `Inactive` with a cleared trip id, even when the final
    /// capture or flush fails.
    pub async fn finish_transport(&mut self) {
        info!(
            "[finish_transport] finishing {:?}",
            self.state.active_trip_id
        );
        self.stop_subscription();

        let course_id = self.state.active_trip_id.clone();
        let uit = self.state.current_uit.clone();
        let vehicle = self.vehicle_number.clone().unwrap_or_default();
        let token = self.auth_token.clone();

        if let Some(token) = token.as_deref() {
            if self.sync.pending() {
                match self.sync.flush(token).await {
                    Ok(outcome) => debug!(
                        "[finish_transport] flushed {} queued updates ({} left)",
                        outcome.sent, outcome.remaining
                    ),
                    Err(e) => warn!("[finish_transport] queue flush failed: {}", e),
                }
            }
        }

        if let (Some(course_id), Some(uit)) = (course_id.as_deref(), uit.as_deref()) {
            match tokio::time::timeout(
                self.config.final_capture_timeout,
                self.source.sample_once(),
            )
            .await
            {
                Ok(Some(sample)) if sample.is_valid() => {
                    self.analytics.record_sample(course_id, sample.clone());
                    let update = TrackingUpdate::from_sample(
                        &sample,
                        &vehicle,
                        uit,
                        UpdateStatus::Finished,
                    );
                    self.sync
                        .dispatch(update, token.as_deref().unwrap_or_default())
                        .await;
                }
                Ok(_) => debug!("[finish_transport] no usable final fix"),
                Err(_) => warn!("[finish_transport] final capture timed out"),
            }

            self.analytics.stop_tracking(course_id);
        }

        self.state = TransportState::default();
        self.selected_course_id = None;
        if let Err(e) = store::clear_transport_state(self.store.as_ref()) {
            warn!("[finish_transport] failed to clear persisted state: {}", e);
        }
        info!("[finish_transport] transport finished");
    }

    // ========================================================================
    // Sample Handling
    // ========================================================================

    /// Ingest one captured sample: analytics first, then the transmission
    /// boundary with the current status tag. The two paths are independent,
    /// so the backend sees status updates even if analytics lags or fails.
    pub async fn handle_sample(&mut self, sample: LocationSample) {
        if self.state.status != TransportStatus::Active {
            debug!(
                "[handle_sample] ignoring sample while {:?}",
                self.state.status
            );
            return;
        }
        if !sample.is_valid() {
            warn!(
                "[handle_sample] dropping sample with invalid coordinates ({}, {})",
                sample.lat, sample.lng
            );
            return;
        }

        let (Some(course_id), Some(uit)) = (
            self.state.active_trip_id.clone(),
            self.state.current_uit.clone(),
        ) else {
            warn!("[handle_sample] active without trip identity, dropping sample");
            return;
        };
        let vehicle = self.vehicle_number.clone().unwrap_or_default();

        self.state.last_sample_time_utc = Some(sample.timestamp_utc);
        if sample.battery_pct.is_some() {
            self.state.battery_pct = sample.battery_pct;
        }

        self.analytics.record_sample(&course_id, sample.clone());

        let update =
            TrackingUpdate::from_sample(&sample, &vehicle, &uit, UpdateStatus::InProgress);
        self.sync
            .dispatch(update, self.auth_token.clone().unwrap_or_default().as_str())
            .await;

        self.persist_state();
    }

    /// Await and handle the next sample from the active subscription.
    /// Returns false when no subscription is running or the stream ended.
    pub async fn pump(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        match subscription.next().await {
            Some(sample) => {
                self.handle_sample(sample).await;
                true
            }
            None => {
                debug!("[pump] sample stream closed");
                false
            }
        }
    }

    // ========================================================================
    // Session Restore
    // ========================================================================

    /// Restore a previously active session, once per process lifetime.
    ///
    /// Subsequent calls are no-ops. A persisted `Active` state is restored
    /// and, after a short deliberate delay, the subscription-acquisition
    /// step re-runs so capture resumes. When re-acquisition fails, the trip
    /// is kept and demoted to `Paused` so the driver can resume manually;
    /// an unreadable state falls back to fresh `Inactive`.
    pub async fn restore_session(&mut self) {
        if self.restore_phase != RestorePhase::NotStarted {
            debug!("[restore_session] already ran, skipping");
            return;
        }
        self.restore_phase = RestorePhase::InProgress;

        let persisted = store::load_transport_state(self.store.as_ref());
        match persisted {
            Some(persisted) if persisted.status == TransportStatus::Active => {
                info!(
                    "[restore_session] resuming transport {:?}",
                    persisted.active_trip_id
                );
                self.state = persisted;
                self.state.is_gps_active = false;
                self.state.is_background_active = false;
                self.selected_course_id = self.state.active_trip_id.clone();

                tokio::time::sleep(self.config.restore_resubscribe_delay).await;
                self.restore_capture().await;
            }
            Some(_) => debug!("[restore_session] no active transport persisted"),
            None => debug!("[restore_session] no persisted state, starting fresh"),
        }

        self.restore_phase = RestorePhase::Done;
    }

    async fn restore_capture(&mut self) {
        let (Some(course_id), Some(uit)) = (
            self.state.active_trip_id.clone(),
            self.state.current_uit.clone(),
        ) else {
            warn!("[restore_session] persisted state missing trip identity, starting fresh");
            self.state = TransportState::default();
            self.persist_state();
            return;
        };

        let vehicle = self.vehicle_number.clone().unwrap_or_default();
        self.analytics.start_tracking(&course_id, &uit, &vehicle);

        match self.acquire_subscription(&course_id, &uit).await {
            Ok(subscription) => {
                self.state.is_gps_active = true;
                self.state.is_background_active =
                    subscription.mode() == CaptureMode::Background;
                self.subscription = Some(subscription);
                self.persist_state();
                info!("[restore_session] capture resumed for {}", course_id);
            }
            Err(e) => {
                warn!(
                    "[restore_session] could not resume capture, pausing trip: {}",
                    e
                );
                self.state.status = TransportStatus::Paused;
                self.state.is_gps_active = false;
                self.persist_state();
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn status(&self) -> TransportStatus {
        self.state.status
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn analytics(&self) -> &TripAnalyticsEngine {
        &self.analytics
    }

    pub fn analytics_mut(&mut self) -> &mut TripAnalyticsEngine {
        &mut self.analytics
    }

    pub fn sync(&self) -> &SyncBoundary {
        &self.sync
    }

    /// True while transmissions are waiting for a flush (pending-sync
    /// indicator).
    pub fn pending_sync(&self) -> bool {
        self.sync.pending()
    }

    pub fn restore_phase(&self) -> RestorePhase {
        self.restore_phase
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Prefer the background-capable stream, fall back to foreground-only.
    async fn acquire_subscription(
        &self,
        course_id: &str,
        uit: &str,
    ) -> Result<SampleSubscription> {
        let request = BackgroundWatchRequest {
            course_id: course_id.to_string(),
            vehicle_number: self.vehicle_number.clone().unwrap_or_default(),
            uit: uit.to_string(),
            token: self.auth_token.clone().unwrap_or_default(),
        };

        match self.source.watch_background(&request).await {
            Ok(subscription) => Ok(subscription),
            Err(background_err) => {
                warn!(
                    "[acquire_subscription] background watch unavailable, trying foreground: {}",
                    background_err
                );
                self.source.watch().await.map_err(|foreground_err| {
                    TrackerError::SubscriptionFailed {
                        message: format!(
                            "background ({}) and foreground ({}) subscriptions both failed",
                            background_err, foreground_err
                        ),
                    }
                })
            }
        }
    }

    /// One well-defined stop for whichever subscription mode is running.
    fn stop_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
            debug!("[stop_subscription] {:?} subscription stopped", subscription.mode());
        }
    }

    fn persist_state(&self) {
        if let Err(e) = store::save_transport_state(self.store.as_ref(), &self.state) {
            warn!("[persist_state] failed to persist transport state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use crate::synthetic::{RecordingSender, SyntheticDrive};
    use chrono::{TimeZone, Utc};

    fn candidate() -> TripCandidate {
        TripCandidate {
            uit: "UIT-1".to_string(),
            start_location: "Cluj-Napoca".to_string(),
            stop_location: "Bucharest".to_string(),
        }
    }

    fn sample(secs: i64, lat_offset: f64, speed_kmh: f64) -> LocationSample {
        LocationSample::new(
            45.0 + lat_offset,
            25.0,
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            speed_kmh,
            5.0,
        )
        .with_battery(90.0)
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            restore_resubscribe_delay: Duration::from_millis(1),
            final_capture_timeout: Duration::from_millis(50),
        }
    }

    struct Harness {
        source: Arc<SyntheticDrive>,
        sender: Arc<RecordingSender>,
        store: Arc<MemoryStateStore>,
        controller: TransportController,
    }

    fn harness_with(source: SyntheticDrive, sender: RecordingSender) -> Harness {
        let source = Arc::new(source);
        let sender = Arc::new(sender);
        let store = Arc::new(MemoryStateStore::new());
        let controller = TransportController::with_config(
            source.clone(),
            store.clone(),
            sender.clone(),
            fast_config(),
        );
        Harness {
            source,
            sender,
            store,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(SyntheticDrive::new(), RecordingSender::new())
    }

    fn select(controller: &mut TransportController) {
        controller.set_vehicle_number("B-01-ABC");
        controller.set_auth_token("token-1");
        controller.select_transport("C1", vec![candidate()]);
    }

    #[tokio::test]
    async fn test_start_without_selection_fails_unchanged() {
        let mut h = harness();
        let err = h.controller.start_transport().await.unwrap_err();
        assert!(matches!(err, TrackerError::NoTripSelected));
        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert_eq!(h.source.watches_started(), 0);
    }

    #[tokio::test]
    async fn test_start_permission_denied_unchanged() {
        let mut h = harness_with(
            SyntheticDrive::with_availability(false, true, true),
            RecordingSender::new(),
        );
        select(&mut h.controller);

        let err = h.controller.start_transport().await.unwrap_err();
        assert!(matches!(err, TrackerError::PermissionDenied));
        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert_eq!(h.source.watches_started(), 0);
    }

    #[tokio::test]
    async fn test_start_fails_when_both_modes_unavailable() {
        let mut h = harness_with(
            SyntheticDrive::with_availability(true, false, false),
            RecordingSender::new(),
        );
        select(&mut h.controller);

        let err = h.controller.start_transport().await.unwrap_err();
        assert!(matches!(err, TrackerError::SubscriptionFailed { .. }));
        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert!(!h.controller.state().is_gps_active);
    }

    #[tokio::test]
    async fn test_start_prefers_background() {
        let mut h = harness();
        select(&mut h.controller);

        h.controller.start_transport().await.unwrap();
        assert_eq!(h.controller.status(), TransportStatus::Active);
        assert!(h.controller.state().is_gps_active);
        assert!(h.controller.state().is_background_active);
        assert_eq!(h.controller.state().active_trip_id.as_deref(), Some("C1"));
        assert_eq!(h.controller.state().current_uit.as_deref(), Some("UIT-1"));
    }

    #[tokio::test]
    async fn test_start_falls_back_to_foreground() {
        let mut h = harness_with(
            SyntheticDrive::with_availability(true, false, true),
            RecordingSender::new(),
        );
        select(&mut h.controller);

        h.controller.start_transport().await.unwrap();
        assert_eq!(h.controller.status(), TransportStatus::Active);
        assert!(h.controller.state().is_gps_active);
        assert!(!h.controller.state().is_background_active);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_subscribed() {
        let mut h = harness();
        select(&mut h.controller);

        h.controller.start_transport().await.unwrap();
        h.controller.start_transport().await.unwrap();
        assert_eq!(h.source.watches_started(), 1);
    }

    #[tokio::test]
    async fn test_samples_fan_out_to_analytics_and_sync() {
        let mut h = harness();
        select(&mut h.controller);
        h.source
            .script_samples([sample(0, 0.0, 30.0), sample(60, 0.01, 35.0)]);

        h.controller.start_transport().await.unwrap();
        assert!(h.controller.pump().await);
        assert!(h.controller.pump().await);

        let stats = h.controller.analytics_mut().get_analytics("C1").unwrap();
        assert_eq!(stats.samples.len(), 2);
        assert!(stats.total_distance_km > 1.0);

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|u| u.status == UpdateStatus::InProgress));
        assert!(sent.iter().all(|u| u.uit == "UIT-1"));

        assert!(h.controller.state().last_sample_time_utc.is_some());
        assert_eq!(h.controller.state().battery_pct, Some(90.0));
    }

    #[tokio::test]
    async fn test_invalid_sample_is_dropped() {
        let mut h = harness();
        select(&mut h.controller);
        h.controller.start_transport().await.unwrap();

        h.controller
            .handle_sample(LocationSample::new(
                95.0,
                25.0,
                Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                30.0,
                5.0,
            ))
            .await;

        let stats = h.controller.analytics_mut().get_analytics("C1").unwrap();
        assert!(stats.samples.is_empty());
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pause_then_resume_preserves_statistics() {
        let mut h = harness();
        select(&mut h.controller);
        h.source
            .script_samples([sample(0, 0.0, 30.0), sample(60, 0.01, 30.0)]);

        h.controller.start_transport().await.unwrap();
        h.controller.pump().await;
        h.controller.pump().await;
        let distance_before = h
            .controller
            .analytics_mut()
            .get_analytics("C1")
            .unwrap()
            .total_distance_km;

        h.controller.pause_transport().await;
        assert_eq!(h.controller.status(), TransportStatus::Paused);
        assert!(!h.controller.state().is_gps_active);

        h.controller.resume_transport().await.unwrap();
        assert_eq!(h.controller.status(), TransportStatus::Active);
        assert!(h.controller.state().is_gps_active);

        let stats = h.controller.analytics_mut().get_analytics("C1").unwrap();
        assert_eq!(stats.total_distance_km, distance_before);
        assert_eq!(stats.samples.len(), 2);
        assert_eq!(h.source.watches_started(), 2);
    }

    #[tokio::test]
    async fn test_resume_failure_stays_paused() {
        let mut h = harness();
        select(&mut h.controller);
        h.controller.start_transport().await.unwrap();
        h.controller.pause_transport().await;

        h.source.set_background_available(false);
        h.source.set_foreground_available(false);

        let err = h.controller.resume_transport().await.unwrap_err();
        assert!(matches!(err, TrackerError::SubscriptionFailed { .. }));
        assert_eq!(h.controller.status(), TransportStatus::Paused);
    }

    #[tokio::test]
    async fn test_finish_ends_inactive_and_clears_state() {
        let mut h = harness();
        select(&mut h.controller);
        h.source.script_samples([sample(0, 0.0, 30.0)]);
        h.source.set_oneshot_fix(sample(120, 0.02, 0.0));

        h.controller.start_transport().await.unwrap();
        h.controller.pump().await;
        h.controller.finish_transport().await;

        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert!(h.controller.state().active_trip_id.is_none());
        assert!(!h.controller.state().is_gps_active);
        assert!(store::load_transport_state(h.store.as_ref()).is_none());

        // Final capture was tagged as the trip's last sample
        let sent = h.sender.sent();
        assert_eq!(sent.last().unwrap().status, UpdateStatus::Finished);

        // Analytics are finalized
        let stats = h.controller.analytics_mut().get_analytics("C1").unwrap();
        assert!(!stats.is_active);
        assert!(stats.end_time_utc.is_some());
        assert_eq!(stats.samples.len(), 2);
    }

    #[tokio::test]
    async fn test_finish_survives_capture_and_flush_failure() {
        let mut h = harness_with(SyntheticDrive::new(), RecordingSender::offline());
        select(&mut h.controller);
        h.source.script_samples([sample(0, 0.0, 30.0)]);

        h.controller.start_transport().await.unwrap();
        h.controller.pump().await;
        assert!(h.controller.pending_sync());

        // No one-shot fix available, sender offline: finish still lands
        h.controller.finish_transport().await;
        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert!(h.controller.state().active_trip_id.is_none());
        assert!(h.controller.pending_sync());
    }

    #[tokio::test]
    async fn test_queued_updates_replay_after_connectivity_restore() {
        let mut h = harness_with(SyntheticDrive::new(), RecordingSender::offline());
        select(&mut h.controller);
        h.source
            .script_samples([sample(0, 0.0, 30.0), sample(60, 0.01, 30.0)]);

        h.controller.start_transport().await.unwrap();
        h.controller.pump().await;
        h.controller.pump().await;
        assert_eq!(h.controller.sync().queue().len(), 2);

        h.sender.set_offline(false);
        let outcome = h.controller.sync().flush("token-1").await.unwrap();
        assert_eq!(outcome.sent, 2);
        assert!(!h.controller.pending_sync());
        assert_eq!(h.sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_session_resumes_active_transport() {
        let store = Arc::new(MemoryStateStore::new());
        let source = Arc::new(SyntheticDrive::new());
        let sender = Arc::new(RecordingSender::new());

        {
            let mut first = TransportController::with_config(
                source.clone(),
                store.clone(),
                sender.clone(),
                fast_config(),
            );
            select(&mut first);
            first.start_transport().await.unwrap();
            first.handle_sample(sample(0, 0.0, 30.0)).await;
        }
        assert_eq!(source.watches_started(), 1);

        // Process restart: fresh controller over the same store and source
        let mut second = TransportController::with_config(
            source.clone(),
            store.clone(),
            sender,
            fast_config(),
        );
        second.set_vehicle_number("B-01-ABC");
        second.set_auth_token("token-1");
        second.restore_session().await;

        assert_eq!(second.status(), TransportStatus::Active);
        assert!(second.state().is_gps_active);
        assert_eq!(second.state().active_trip_id.as_deref(), Some("C1"));
        assert_eq!(source.watches_started(), 2);

        // Statistics were resumed, not reset
        let stats = second.analytics_mut().get_analytics("C1").unwrap();
        assert_eq!(stats.samples.len(), 1);

        // Restore is once per process
        second.restore_session().await;
        assert_eq!(source.watches_started(), 2);
        assert_eq!(second.restore_phase(), RestorePhase::Done);
    }

    #[tokio::test]
    async fn test_restore_session_without_persisted_state() {
        let mut h = harness();
        h.controller.restore_session().await;
        assert_eq!(h.controller.status(), TransportStatus::Inactive);
        assert_eq!(h.source.watches_started(), 0);
    }

    #[tokio::test]
    async fn test_restore_session_pauses_when_resubscribe_fails() {
        let store = Arc::new(MemoryStateStore::new());
        let source = Arc::new(SyntheticDrive::new());
        let sender = Arc::new(RecordingSender::new());

        {
            let mut first = TransportController::with_config(
                source.clone(),
                store.clone(),
                sender.clone(),
                fast_config(),
            );
            select(&mut first);
            first.start_transport().await.unwrap();
        }

        source.set_background_available(false);
        source.set_foreground_available(false);

        let mut second = TransportController::with_config(
            source.clone(),
            store.clone(),
            sender,
            fast_config(),
        );
        second.restore_session().await;

        assert_eq!(second.status(), TransportStatus::Paused);
        assert!(!second.state().is_gps_active);
        assert_eq!(second.state().active_trip_id.as_deref(), Some("C1"));
    }
}
