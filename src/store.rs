//! Durable key-value store and the trip statistics repository.
//!
//! The store contract is deliberately small (get/set/remove by string key)
//! so the host app can plug its own persistence. `SqliteStateStore` is the
//! default on-device backend; `MemoryStateStore` backs tests and acts as a
//! fallback when no durable path is available.
//!
//! Persisted layout:
//! - `transport_state` — the session's `TransportState`
//! - `trip_stats:{course_id}` — one `TripStatistics` record per trip
//! - `trip_stats:index` — rolling JSON array of course ids, capped at 50

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::warn;
use rusqlite::{params, Connection};

use crate::error::{Result, TrackerError};
use crate::types::{TransportState, TripStatistics};

/// Fixed key for the persisted `TransportState`.
pub const TRANSPORT_STATE_KEY: &str = "transport_state";

const TRIP_KEY_PREFIX: &str = "trip_stats:";
const TRIP_INDEX_KEY: &str = "trip_stats:index";

/// Maximum number of trips kept in the rolling index.
pub const TRIP_INDEX_CAP: usize = 50;

// ============================================================================
// Store Contract
// ============================================================================

/// Durable key-value persistence surviving restarts.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

// ============================================================================
// SQLite Store
// ============================================================================

/// SQLite-backed store with a single key-value table.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the store at the given path.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TrackerError::Store {
            message: "store lock poisoned".to_string(),
        })
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// HashMap-backed store for tests and as a non-durable fallback.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| TrackerError::Store {
            message: "store lock poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| TrackerError::Store {
            message: "store lock poisoned".to_string(),
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| TrackerError::Store {
            message: "store lock poisoned".to_string(),
        })?;
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// Trip Repository
// ============================================================================

/// Store-backed repository for per-trip statistics plus the rolling index.
///
/// Explicitly owned and injected; session-scoped. Loads degrade to `None`
/// with a warning so a corrupt record never blocks tracking.
#[derive(Clone)]
pub struct TripRepository {
    store: Arc<dyn StateStore>,
}

impl TripRepository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn trip_key(course_id: &str) -> String {
        format!("{TRIP_KEY_PREFIX}{course_id}")
    }

    /// Load persisted statistics for a trip, or `None` (missing or corrupt).
    pub fn load(&self, course_id: &str) -> Option<TripStatistics> {
        let raw = match self.store.get(&Self::trip_key(course_id)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("[trip_repository] failed to read trip {}: {}", course_id, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(
                    "[trip_repository] corrupt statistics for trip {}: {}",
                    course_id, e
                );
                None
            }
        }
    }

    /// Persist statistics and register the trip in the rolling index.
    pub fn save(&self, stats: &TripStatistics) -> Result<()> {
        let value = serde_json::to_string(stats)?;
        self.store.set(&Self::trip_key(&stats.course_id), &value)?;
        self.register(&stats.course_id)
    }

    /// Remove a trip's statistics and drop it from the index.
    pub fn remove(&self, course_id: &str) -> Result<()> {
        self.store.remove(&Self::trip_key(course_id))?;
        let mut ids = self.course_ids();
        if let Some(pos) = ids.iter().position(|id| id == course_id) {
            ids.remove(pos);
            self.write_index(&ids)?;
        }
        Ok(())
    }

    /// Course ids currently in the rolling index, oldest first.
    pub fn course_ids(&self) -> Vec<String> {
        let raw = match self.store.get(TRIP_INDEX_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("[trip_repository] failed to read trip index: {}", e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("[trip_repository] corrupt trip index: {}", e);
            Vec::new()
        })
    }

    fn register(&self, course_id: &str) -> Result<()> {
        let mut ids = self.course_ids();
        if ids.iter().any(|id| id == course_id) {
            return Ok(());
        }
        ids.push(course_id.to_string());
        while ids.len() > TRIP_INDEX_CAP {
            let evicted = ids.remove(0);
            if let Err(e) = self.store.remove(&Self::trip_key(&evicted)) {
                warn!("[trip_repository] failed to evict trip {}: {}", evicted, e);
            }
        }
        self.write_index(&ids)
    }

    fn write_index(&self, ids: &[String]) -> Result<()> {
        self.store.set(TRIP_INDEX_KEY, &serde_json::to_string(ids)?)
    }
}

// ============================================================================
// Transport State Persistence
// ============================================================================

/// Load the persisted `TransportState`, or `None` (missing or corrupt).
pub fn load_transport_state(store: &dyn StateStore) -> Option<TransportState> {
    let raw = match store.get(TRANSPORT_STATE_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!("[transport_state] failed to read persisted state: {}", e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("[transport_state] corrupt persisted state: {}", e);
            None
        }
    }
}

pub fn save_transport_state(store: &dyn StateStore, state: &TransportState) -> Result<()> {
    store.set(TRANSPORT_STATE_KEY, &serde_json::to_string(state)?)
}

pub fn clear_transport_state(store: &dyn StateStore) -> Result<()> {
    store.remove(TRANSPORT_STATE_KEY)
}
