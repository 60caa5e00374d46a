//! # Trip Analytics Engine
//!
//! Consumes the location sample stream per trip and maintains distance,
//! speed, time and stop statistics.
//!
//! The engine owns every `TripStatistics` in memory and writes through to an
//! injected repository. Persistence is best-effort: failures are logged and
//! never raised across the engine boundary, so a broken store can degrade
//! durability but never capture.
//!
//! Time statistics are a full deterministic recompute over the current
//! sample sequence on every call, trading CPU for robustness against
//! missed or out-of-order updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::geo;
use crate::store::TripRepository;
use crate::types::{LocationSample, TripStatistics};

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds for the analytics passes.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Speed at or above which an interval counts as driving.
    /// Default: 5.0 km/h (near-zero GPS speed is noisy even when parked)
    pub stop_speed_threshold_kmh: f64,

    /// Minimum sub-threshold duration for a logged stop; shorter ones are
    /// discarded entirely. Default: 2.0 minutes
    pub min_stop_duration_min: f64,

    /// Intervals longer than this are data gaps and count toward neither
    /// driving nor stopped time. Default: 10.0 minutes
    pub max_gap_min: f64,

    /// Minimum pairwise distance accumulated into the total.
    /// Default: 0.01 km
    pub min_distance_increment_km: f64,

    /// Worst sample accuracy still accumulated into the total.
    /// Default: 50.0 meters
    pub max_accuracy_m: f64,

    /// Sample buffer cap per trip, evicted oldest-first.
    /// Default: 1000
    pub sample_cap: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            stop_speed_threshold_kmh: 5.0,
            min_stop_duration_min: 2.0,
            max_gap_min: 10.0,
            min_distance_increment_km: 0.01,
            max_accuracy_m: 50.0,
            sample_cap: 1000,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Per-trip analytics over the location sample stream.
pub struct TripAnalyticsEngine {
    trips: HashMap<String, TripStatistics>,
    repo: TripRepository,
    config: AnalyticsConfig,
}

impl TripAnalyticsEngine {
    /// Create an engine with default thresholds.
    pub fn new(repo: TripRepository) -> Self {
        Self::with_config(repo, AnalyticsConfig::default())
    }

    /// Create an engine with custom thresholds.
    pub fn with_config(repo: TripRepository, config: AnalyticsConfig) -> Self {
        Self {
            trips: HashMap::new(),
            repo,
            config,
        }
    }

    /// Begin (or resume) tracking a trip. Idempotent and resume-safe:
    /// statistics that already carry samples are marked active again
    /// without resetting accumulated metrics. Always succeeds; persistence
    /// failures are logged, never raised.
    pub fn start_tracking(&mut self, course_id: &str, uit: &str, vehicle_number: &str) {
        let now = Utc::now();

        if !self.trips.contains_key(course_id) {
            if let Some(stored) = self.repo.load(course_id) {
                debug!(
                    "[start_tracking] loaded persisted statistics for {} ({} samples)",
                    course_id,
                    stored.samples.len()
                );
                self.trips.insert(course_id.to_string(), stored);
            }
        }

        match self.trips.get_mut(course_id) {
            Some(stats) if !stats.samples.is_empty() => {
                info!(
                    "[start_tracking] resuming trip {} with {} samples, {:.2} km",
                    course_id,
                    stats.samples.len(),
                    stats.total_distance_km
                );
                stats.is_active = true;
                stats.end_time_utc = None;
                stats.last_update_utc = now;
            }
            _ => {
                info!("[start_tracking] starting trip {} at zero", course_id);
                self.trips.insert(
                    course_id.to_string(),
                    TripStatistics::new(course_id, uit, vehicle_number, now),
                );
            }
        }

        self.persist(course_id);
    }

    /// Ingest one sample for an active trip. Returns the updated statistics,
    /// or `None` when no active statistics exist (no side effects then).
    pub fn record_sample(
        &mut self,
        course_id: &str,
        sample: LocationSample,
    ) -> Option<&TripStatistics> {
        let config = self.config.clone();

        {
            let stats = self.trips.get_mut(course_id)?;
            if !stats.is_active {
                debug!("[record_sample] trip {} is not active, ignoring", course_id);
                return None;
            }

            let now = Utc::now();
            stats.samples.push(sample);

            if stats.samples.len() >= 2 {
                let later = &stats.samples[stats.samples.len() - 1];
                let earlier = &stats.samples[stats.samples.len() - 2];
                let distance_km =
                    geo::haversine_km(earlier.lat, earlier.lng, later.lat, later.lng);
                // Sub-threshold hops and poor fixes are kept in the buffer
                // but never accumulated into the distance total.
                if distance_km >= config.min_distance_increment_km
                    && later.accuracy_m <= config.max_accuracy_m
                {
                    stats.total_distance_km += distance_km;
                }
            }

            let speed = stats.samples.last().map(|s| s.speed_kmh).unwrap_or(0.0);
            stats.max_speed_kmh = stats.max_speed_kmh.max(speed);

            recompute_time_statistics(stats, &config);
            stats.average_speed_kmh = average_speed(stats);

            if stats.samples.len() > config.sample_cap {
                let excess = stats.samples.len() - config.sample_cap;
                stats.samples.drain(..excess);
            }

            stats.last_update_utc = now;
        }

        self.persist(course_id);
        self.trips.get(course_id)
    }

    /// Finalize a trip: mark inactive, stamp the end time, run the final
    /// time-statistics pass and persist. Returns the finalized statistics,
    /// or `None` for an unknown trip.
    pub fn stop_tracking(&mut self, course_id: &str) -> Option<TripStatistics> {
        let config = self.config.clone();

        let snapshot = {
            let stats = self.trips.get_mut(course_id)?;
            let now = Utc::now();
            stats.is_active = false;
            stats.end_time_utc = Some(now);
            recompute_time_statistics(stats, &config);
            stats.average_speed_kmh = average_speed(stats);
            stats.last_update_utc = now;
            stats.clone()
        };

        info!(
            "[stop_tracking] finalized trip {}: {:.2} km, {:.1} min driving, {} stops",
            course_id, snapshot.total_distance_km, snapshot.driving_time_min, snapshot.total_stops
        );

        self.persist(course_id);
        Some(snapshot)
    }

    /// Look up statistics for a trip, falling back to the repository for
    /// trips not held in memory.
    pub fn get_analytics(&mut self, course_id: &str) -> Option<&TripStatistics> {
        if !self.trips.contains_key(course_id) {
            let stored = self.repo.load(course_id)?;
            self.trips.insert(course_id.to_string(), stored);
        }
        self.trips.get(course_id)
    }

    /// Best-effort removal of a trip's statistics from memory and store.
    pub fn clear_analytics(&mut self, course_id: &str) {
        self.trips.remove(course_id);
        if let Err(e) = self.repo.remove(course_id) {
            warn!(
                "[clear_analytics] failed to remove trip {} from store: {}",
                course_id, e
            );
        }
    }

    /// Number of trips currently held in memory.
    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// Ids of trips currently held in memory.
    pub fn tracked_ids(&self) -> Vec<String> {
        self.trips.keys().cloned().collect()
    }

    fn persist(&self, course_id: &str) {
        if let Some(stats) = self.trips.get(course_id) {
            if let Err(e) = self.repo.save(stats) {
                warn!("[analytics] failed to persist trip {}: {}", course_id, e);
            }
        }
    }
}

/// `average_speed_kmh` invariant: distance over driving hours, 0 when no
/// driving time has accumulated.
fn average_speed(stats: &TripStatistics) -> f64 {
    if stats.driving_time_min > 0.0 {
        stats.total_distance_km / (stats.driving_time_min / 60.0)
    } else {
        0.0
    }
}

/// Full recompute of driving time, stop count and stop duration.
///
/// Walks samples pairwise. Intervals longer than the gap threshold (or with
/// a backwards clock) count toward neither bucket; a gap also closes any
/// open stop at its left edge. Otherwise the interval is classified by the
/// later sample's speed: at or above the threshold it is driving time and
/// closes any open stop, below it a stop opens at the earlier sample's
/// timestamp. Stops shorter than the minimum duration are discarded
/// entirely, not reclassified as driving.
fn recompute_time_statistics(stats: &mut TripStatistics, config: &AnalyticsConfig) {
    let mut driving_min = 0.0;
    let mut total_stops = 0u32;
    let mut stop_min = 0.0;
    let mut open_stop_start: Option<DateTime<Utc>> = None;

    let mut close_stop = |start: Option<DateTime<Utc>>, end: DateTime<Utc>| {
        if let Some(start) = start {
            let duration_min = minutes_between(start, end);
            if duration_min >= config.min_stop_duration_min {
                total_stops += 1;
                stop_min += duration_min;
            }
        }
    };

    for pair in stats.samples.windows(2) {
        let earlier = &pair[0];
        let later = &pair[1];
        let elapsed_min = minutes_between(earlier.timestamp_utc, later.timestamp_utc);

        if elapsed_min < 0.0 || elapsed_min > config.max_gap_min {
            close_stop(open_stop_start.take(), earlier.timestamp_utc);
            continue;
        }

        if later.speed_kmh >= config.stop_speed_threshold_kmh {
            driving_min += elapsed_min;
            close_stop(open_stop_start.take(), earlier.timestamp_utc);
        } else if open_stop_start.is_none() {
            open_stop_start = Some(earlier.timestamp_utc);
        }
    }

    if let Some(last) = stats.samples.last() {
        close_stop(open_stop_start.take(), last.timestamp_utc);
    }

    stats.driving_time_min = driving_min;
    stats.total_stops = total_stops;
    stats.stop_duration_min = stop_min;
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}
