//! # Transport Tracker
//!
//! Core of a vehicle transport-tracking client: captures live GPS positions
//! for an active transport job, derives trip analytics from the position
//! stream and tolerates connectivity loss by queuing updates for later
//! transmission.
//!
//! This crate provides:
//! - The transport lifecycle state machine (start/pause/resume/finish,
//!   session restore after a process restart)
//! - The trip analytics engine (distance, speed, driving time and stop
//!   statistics over the sample stream)
//! - The offline queue and sync boundary (immediate send, durable enqueue
//!   on failure, opportunistic flush)
//!
//! Presentation, backend endpoint catalogues and native permission plumbing
//! live in the host app; they reach this crate through the
//! [`LocationSource`], [`StateStore`] and [`UpdateSender`] contracts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use transport_tracker::{
//!     HttpUpdateSender, SqliteStateStore, TransportController, TripCandidate,
//! };
//!
//! # async fn run(source: Arc<dyn transport_tracker::LocationSource>) -> transport_tracker::Result<()> {
//! let store = Arc::new(SqliteStateStore::new("tracker.db")?);
//! let sender = Arc::new(HttpUpdateSender::new("https://backend.example/api/track")?);
//!
//! let mut controller = TransportController::new(source, store, sender);
//! controller.set_vehicle_number("B-01-ABC");
//! controller.set_auth_token("bearer-token");
//! controller.restore_session().await;
//!
//! controller.select_transport(
//!     "course-1",
//!     vec![TripCandidate {
//!         uit: "UIT-123".into(),
//!         start_location: "Cluj-Napoca".into(),
//!         stop_location: "Bucharest".into(),
//!     }],
//! );
//! controller.start_transport().await?;
//! while controller.pump().await {}
//! # Ok(())
//! # }
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, TrackerError};

// Core data model
pub mod types;
pub use types::{
    LocationSample, TransportState, TransportStatus, TripCandidate, TripStatistics,
};

// Geographic helpers
pub mod geo;

// Trip analytics engine
pub mod analytics;
pub use analytics::{AnalyticsConfig, TripAnalyticsEngine};

// Transport lifecycle controller
pub mod controller;
pub use controller::{ControllerConfig, RestorePhase, TransportController};

// Location boundary (sample source contract and subscription handle)
pub mod location;
pub use location::{
    BackgroundWatchRequest, CaptureMode, LocationSource, SampleSubscription,
};

// Durable store and trip repository
pub mod store;
pub use store::{
    MemoryStateStore, SqliteStateStore, StateStore, TripRepository, TRIP_INDEX_CAP,
};

// Offline queue and sync boundary
pub mod sync;
pub use sync::{
    FlushOutcome, HttpUpdateSender, SyncBoundary, SyncQueue, TrackingUpdate, UpdateSender,
    UpdateStatus,
};

// Scripted boundary implementations for tests
#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;
