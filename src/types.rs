//! Core data model for transport tracking.
//!
//! These types are the shared vocabulary of the analytics engine, the
//! lifecycle controller and the persistence layer. Everything that is
//! persisted or sent over the wire serializes as camelCase JSON; the field
//! sets must stay forward-readable across sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo;

// ============================================================================
// Location Sample
// ============================================================================

/// One GPS fix plus derived speed/accuracy metadata.
///
/// Created at the location boundary, immutable afterwards, owned by the
/// trip's sample buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in WGS84 degrees
    pub lat: f64,
    /// Longitude in WGS84 degrees
    pub lng: f64,
    /// Fix time, nominally non-decreasing across a trip (gaps tolerated)
    pub timestamp_utc: DateTime<Utc>,
    /// Speed in km/h, clamped to >= 0 at construction
    pub speed_kmh: f64,
    /// Heading in degrees (informational)
    #[serde(default)]
    pub heading_deg: Option<f64>,
    /// Altitude in meters (informational)
    #[serde(default)]
    pub altitude_m: Option<f64>,
    /// Horizontal accuracy in meters; gates distance accumulation
    pub accuracy_m: f64,
    /// Device battery percentage at fix time (informational)
    #[serde(default)]
    pub battery_pct: Option<f64>,
    /// True when the driver paused capture manually around this fix
    #[serde(default)]
    pub is_manual_pause: bool,
}

impl LocationSample {
    /// Create a sample with the required fields. Speed is clamped to >= 0.
    pub fn new(
        lat: f64,
        lng: f64,
        timestamp_utc: DateTime<Utc>,
        speed_kmh: f64,
        accuracy_m: f64,
    ) -> Self {
        Self {
            lat,
            lng,
            timestamp_utc,
            speed_kmh: speed_kmh.max(0.0),
            heading_deg: None,
            altitude_m: None,
            accuracy_m,
            battery_pct: None,
            is_manual_pause: false,
        }
    }

    pub fn with_battery(mut self, battery_pct: f64) -> Self {
        self.battery_pct = Some(battery_pct);
        self
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = Some(heading_deg);
        self
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }

    pub fn with_manual_pause(mut self, is_manual_pause: bool) -> Self {
        self.is_manual_pause = is_manual_pause;
        self
    }

    /// Check that the fix carries usable coordinates.
    pub fn is_valid(&self) -> bool {
        geo::is_valid_coordinate(self.lat, self.lng)
    }
}

// ============================================================================
// Trip Statistics
// ============================================================================

/// Accumulated analytics for one transport job.
///
/// Invariants maintained by the analytics engine:
/// - `total_distance_km` is non-decreasing while the trip is active
/// - `average_speed_kmh = total_distance_km / (driving_time_min / 60)`
///   when `driving_time_min > 0`, else 0
/// - `max_speed_kmh` never decreases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatistics {
    pub course_id: String,
    pub uit: String,
    pub vehicle_number: String,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: Option<DateTime<Utc>>,
    /// Accumulated driving distance in kilometers
    pub total_distance_km: f64,
    /// Minutes spent moving (speed at or above the stop threshold)
    pub driving_time_min: f64,
    /// Average moving speed in km/h
    pub average_speed_kmh: f64,
    /// Highest sample speed seen so far in km/h
    pub max_speed_kmh: f64,
    /// Number of logged stops (sub-threshold periods of at least 2 minutes)
    pub total_stops: u32,
    /// Minutes spent in logged stops
    pub stop_duration_min: f64,
    /// Ordered sample buffer, oldest first, capped at 1000
    pub samples: Vec<LocationSample>,
    pub is_active: bool,
    pub last_update_utc: DateTime<Utc>,
}

impl TripStatistics {
    /// Fresh statistics at zero for a newly started trip.
    pub fn new(course_id: &str, uit: &str, vehicle_number: &str, now: DateTime<Utc>) -> Self {
        Self {
            course_id: course_id.to_string(),
            uit: uit.to_string(),
            vehicle_number: vehicle_number.to_string(),
            start_time_utc: now,
            end_time_utc: None,
            total_distance_km: 0.0,
            driving_time_min: 0.0,
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            total_stops: 0,
            stop_duration_min: 0.0,
            samples: Vec::new(),
            is_active: true,
            last_update_utc: now,
        }
    }
}

// ============================================================================
// Transport State
// ============================================================================

/// Lifecycle status of the current transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    #[default]
    Inactive,
    Active,
    Paused,
}

/// One selectable transport document: UIT token plus its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCandidate {
    pub uit: String,
    pub start_location: String,
    pub stop_location: String,
}

/// Session-wide transport state, persisted on every relevant mutation.
///
/// Invariants maintained by the controller:
/// - `Active`/`Paused` imply `active_trip_id` and `current_uit` are set
/// - `Inactive` implies `is_gps_active == false`
/// - a transition to `Active` only commits after the location subscription
///   successfully (re)starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    pub status: TransportStatus,
    pub active_trip_id: Option<String>,
    pub current_uit: Option<String>,
    /// Ordered candidate list as shown to the driver
    #[serde(default)]
    pub selected_candidates: Vec<TripCandidate>,
    pub is_gps_active: bool,
    pub is_background_active: bool,
    pub last_sample_time_utc: Option<DateTime<Utc>>,
    pub battery_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_sample_clamps_negative_speed() {
        let sample = LocationSample::new(45.0, 25.0, ts(0), -3.0, 10.0);
        assert_eq!(sample.speed_kmh, 0.0);
    }

    #[test]
    fn test_sample_validity() {
        assert!(LocationSample::new(45.0, 25.0, ts(0), 10.0, 5.0).is_valid());
        assert!(!LocationSample::new(95.0, 25.0, ts(0), 10.0, 5.0).is_valid());
    }

    #[test]
    fn test_sample_serializes_camel_case() {
        let sample = LocationSample::new(45.0, 25.0, ts(0), 10.0, 5.0).with_battery(80.0);
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"timestampUtc\""));
        assert!(json.contains("\"speedKmh\""));
        assert!(json.contains("\"accuracyM\""));
        assert!(json.contains("\"batteryPct\""));

        let parsed: LocationSample = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn test_transport_state_default_is_inactive() {
        let state = TransportState::default();
        assert_eq!(state.status, TransportStatus::Inactive);
        assert!(!state.is_gps_active);
        assert!(state.active_trip_id.is_none());
    }

    #[test]
    fn test_trip_statistics_round_trip() {
        let mut stats = TripStatistics::new("C1", "UIT-1", "B-99-XYZ", ts(0));
        stats.samples.push(LocationSample::new(45.0, 25.0, ts(5), 30.0, 8.0));
        stats.total_distance_km = 12.5;

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"courseId\""));
        assert!(json.contains("\"totalDistanceKm\""));

        let parsed: TripStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.course_id, "C1");
        assert_eq!(parsed.samples.len(), 1);
        assert!(parsed.is_active);
    }
}
