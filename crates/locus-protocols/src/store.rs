//! Per-node client location table with last-writer-wins merge.

use crate::codec::{At, Coordinates};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Latest known location of one client.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub client_id: String,
    pub coordinates: Coordinates,
    /// Time the client observed, not the time any node received it
    pub client_timestamp: f64,
    /// AT line replayed verbatim on WHATSAT
    pub raw_message: String,
}

impl LocationRecord {
    /// Build a record from an AT message; the raw message is its wire form.
    pub fn from_at(at: &At) -> Self {
        Self {
            client_id: at.client_id.clone(),
            coordinates: at.coordinates.clone(),
            client_timestamp: at.timestamp.value(),
            raw_message: at.to_string(),
        }
    }

    /// Whether this record should replace `stored`.
    ///
    /// Ties keep the stored record; accepting a tie would let an update
    /// circulate forever around a cycle.
    pub fn supersedes(&self, stored: &LocationRecord) -> bool {
        self.client_timestamp > stored.client_timestamp
    }
}

/// Client id -> latest record.
///
/// Records are never deleted.
#[derive(Debug, Default)]
pub struct LocationStore {
    records: RwLock<HashMap<String, LocationRecord>>,
}

impl LocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stored record for a client.
    pub async fn get(&self, client_id: &str) -> Option<LocationRecord> {
        self.records.read().await.get(client_id).cloned()
    }

    /// Merge a candidate record.
    ///
    /// Returns true if the candidate was stored, which is the caller's cue
    /// to flood it. The comparison and the replacement happen under one
    /// write guard, so two concurrent merges of the same update cannot both
    /// be accepted.
    pub async fn merge(&self, candidate: LocationRecord) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(&candidate.client_id) {
            Some(stored) if candidate.supersedes(stored) => {
                *stored = candidate;
                true
            }
            Some(_) => false,
            None => {
                records.insert(candidate.client_id.clone(), candidate);
                true
            }
        }
    }

    /// Number of clients with a stored record.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no client has reported yet.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Ids of all known clients, sorted.
    pub async fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
