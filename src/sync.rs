//! Sync boundary: immediate transmission with a durable offline queue.
//!
//! Every sample captured for an active trip is dispatched here with the
//! current status tag. The boundary attempts an immediate send; on failure
//! the update is enqueued in the durable store keyed by `(uit, timestamp)`
//! and replayed by an opportunistic flush (on finish and on connectivity
//! restore). Retry policy lives entirely in the flush; the sender itself
//! makes exactly one attempt per update.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::store::StateStore;
use crate::types::LocationSample;

const QUEUE_KEY_PREFIX: &str = "sync_queue:";
const QUEUE_INDEX_KEY: &str = "sync_queue:index";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

// ============================================================================
// Wire Types
// ============================================================================

/// Status tag attached to every transmitted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    InProgress,
    Finished,
}

/// One position report for the backend: flattened sample plus trip identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_utc: DateTime<Utc>,
    pub speed_kmh: f64,
    pub heading_deg: Option<f64>,
    pub altitude_m: Option<f64>,
    pub accuracy_m: f64,
    pub battery_pct: Option<f64>,
    pub vehicle_number: String,
    pub uit: String,
    pub status: UpdateStatus,
}

impl TrackingUpdate {
    pub fn from_sample(
        sample: &LocationSample,
        vehicle_number: &str,
        uit: &str,
        status: UpdateStatus,
    ) -> Self {
        Self {
            lat: sample.lat,
            lng: sample.lng,
            timestamp_utc: sample.timestamp_utc,
            speed_kmh: sample.speed_kmh,
            heading_deg: sample.heading_deg,
            altitude_m: sample.altitude_m,
            accuracy_m: sample.accuracy_m,
            battery_pct: sample.battery_pct,
            vehicle_number: vehicle_number.to_string(),
            uit: uit.to_string(),
            status,
        }
    }

    fn queue_key(&self) -> String {
        format!(
            "{QUEUE_KEY_PREFIX}{}:{}",
            self.uit,
            self.timestamp_utc.timestamp_millis()
        )
    }
}

// ============================================================================
// Sender Contract
// ============================================================================

/// Transmits one update to the backend. Exactly one attempt per call.
#[async_trait]
pub trait UpdateSender: Send + Sync {
    async fn send_update(&self, update: &TrackingUpdate, token: &str) -> Result<()>;
}

/// HTTP sender posting JSON updates to the tracking endpoint.
pub struct HttpUpdateSender {
    client: Client,
    endpoint: String,
}

impl HttpUpdateSender {
    /// Create a sender for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl UpdateSender for HttpUpdateSender {
    async fn send_update(&self, update: &TrackingUpdate, token: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Http {
                message: format!("update rejected: HTTP {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        debug!(
            "[send_update] delivered update for uit {} at {}",
            update.uit, update.timestamp_utc
        );
        Ok(())
    }
}

// ============================================================================
// Offline Queue
// ============================================================================

/// Result of draining the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Updates delivered and removed from the queue.
    pub sent: usize,
    /// Updates still queued (flush stops at the first failure).
    pub remaining: usize,
}

/// Durable FIFO of updates that could not be sent immediately.
#[derive(Clone)]
pub struct SyncQueue {
    store: Arc<dyn StateStore>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Queue an update for a later flush.
    pub fn enqueue(&self, update: &TrackingUpdate) -> Result<()> {
        let key = update.queue_key();
        self.store.set(&key, &serde_json::to_string(update)?)?;

        let mut keys = self.index();
        if !keys.contains(&key) {
            keys.push(key);
            self.write_index(&keys)?;
        }
        Ok(())
    }

    pub fn has_queued_data(&self) -> bool {
        !self.index().is_empty()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    /// Drain the queue in FIFO order through the given sender.
    ///
    /// Stops at the first send failure and keeps the remainder queued;
    /// undecodable entries are dropped, orphaned index entries skipped.
    pub async fn flush(&self, sender: &dyn UpdateSender, token: &str) -> Result<FlushOutcome> {
        let mut remaining: VecDeque<String> = self.index().into();
        let total = remaining.len();
        let mut sent = 0usize;

        while let Some(key) = remaining.front().cloned() {
            let raw = match self.store.get(&key)? {
                Some(raw) => raw,
                None => {
                    remaining.pop_front();
                    continue;
                }
            };

            let update: TrackingUpdate = match serde_json::from_str(&raw) {
                Ok(update) => update,
                Err(e) => {
                    warn!("[flush] dropping undecodable queue entry {}: {}", key, e);
                    let _ = self.store.remove(&key);
                    remaining.pop_front();
                    continue;
                }
            };

            match sender.send_update(&update, token).await {
                Ok(()) => {
                    self.store.remove(&key)?;
                    remaining.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    warn!(
                        "[flush] send failed, keeping {} updates queued: {}",
                        remaining.len(),
                        e
                    );
                    break;
                }
            }
        }

        let remaining: Vec<String> = remaining.into();
        self.write_index(&remaining)?;

        info!("[flush] sent {}/{} queued updates", sent, total);
        Ok(FlushOutcome {
            sent,
            remaining: remaining.len(),
        })
    }

    fn index(&self) -> Vec<String> {
        let raw = match self.store.get(QUEUE_INDEX_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("[sync_queue] failed to read queue index: {}", e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("[sync_queue] corrupt queue index: {}", e);
            Vec::new()
        })
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        self.store
            .set(QUEUE_INDEX_KEY, &serde_json::to_string(keys)?)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Send-else-enqueue dispatch in front of the queue.
///
/// Transmission failures are never surfaced to capture; the caller only
/// sees `pending()` flip for an optional pending-sync indicator.
pub struct SyncBoundary {
    sender: Arc<dyn UpdateSender>,
    queue: SyncQueue,
}

impl SyncBoundary {
    pub fn new(sender: Arc<dyn UpdateSender>, store: Arc<dyn StateStore>) -> Self {
        Self {
            sender,
            queue: SyncQueue::new(store),
        }
    }

    /// Immediate send attempt; on failure, durable enqueue.
    pub async fn dispatch(&self, update: TrackingUpdate, token: &str) {
        if let Err(e) = self.sender.send_update(&update, token).await {
            debug!("[dispatch] send failed, queueing for retry: {}", e);
            if let Err(qe) = self.queue.enqueue(&update) {
                warn!("[dispatch] failed to queue update for retry: {}", qe);
            }
        }
    }

    /// True while updates are waiting for a flush.
    pub fn pending(&self) -> bool {
        self.queue.has_queued_data()
    }

    /// Replay queued updates through the sender.
    pub async fn flush(&self, token: &str) -> Result<FlushOutcome> {
        self.queue.flush(self.sender.as_ref(), token).await
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }
}
