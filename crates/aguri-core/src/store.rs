//! In-memory correlation table and per-workspace logger bindings.
//!
//! The correlation table links `(workspace, source timestamp)` to where the
//! message was delivered. It is the only state the forward pipelines and the
//! reply router share. Records are never removed unless a retention policy is
//! installed and `sweep` is called; the default keeps everything.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{config::workspace_key, errors::Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub workspace: String,
    pub timestamp: String,
}

impl CorrelationKey {
    pub fn new(workspace: &str, timestamp: &str) -> Self {
        Self {
            workspace: workspace_key(workspace),
            timestamp: timestamp.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationRecord {
    pub source_channel_name: String,
    pub body: String,
    pub destination_channel_id: String,
    pub destination_timestamp: String,
    pub stored_at: DateTime<Utc>,
}

/// Decides which records a sweep drops.
pub trait RetentionPolicy: Send + Sync {
    fn is_expired(&self, record: &CorrelationRecord, now: DateTime<Utc>) -> bool;
}

/// Default: keep every record for the process lifetime.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepForever;

impl RetentionPolicy for KeepForever {
    fn is_expired(&self, _record: &CorrelationRecord, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Drop records older than `max_age`. Threads older than that stop being routable.
#[derive(Clone, Copy, Debug)]
pub struct MaxAge(pub Duration);

impl RetentionPolicy for MaxAge {
    fn is_expired(&self, record: &CorrelationRecord, now: DateTime<Utc>) -> bool {
        let Ok(max_age) = chrono::Duration::from_std(self.0) else {
            return false;
        };
        now.signed_duration_since(record.stored_at) > max_age
    }
}

pub struct CorrelationStore {
    records: RwLock<HashMap<CorrelationKey, CorrelationRecord>>,
    retention: Box<dyn RetentionPolicy>,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::with_retention(Box::new(KeepForever))
    }

    pub fn with_retention(retention: Box<dyn RetentionPolicy>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Unconditional upsert, last write wins.
    pub fn put(
        &self,
        workspace: &str,
        timestamp: &str,
        source_channel_name: &str,
        body: &str,
        destination_channel_id: &str,
        destination_timestamp: &str,
    ) {
        let record = CorrelationRecord {
            source_channel_name: source_channel_name.to_string(),
            body: body.to_string(),
            destination_channel_id: destination_channel_id.to_string(),
            destination_timestamp: destination_timestamp.to_string(),
            stored_at: Utc::now(),
        };
        self.records
            .write()
            .insert(CorrelationKey::new(workspace, timestamp), record);
    }

    /// Exact-match lookup.
    pub fn get(&self, workspace: &str, timestamp: &str) -> Result<CorrelationRecord> {
        self.records
            .read()
            .get(&CorrelationKey::new(workspace, timestamp))
            .cloned()
            .ok_or_else(|| Error::LogNotFound {
                workspace: workspace_key(workspace),
                timestamp: timestamp.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Apply the retention policy; returns how many records were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !self.retention.is_expired(r, now));
        before - records.len()
    }
}

// ============== Logger Bindings ==============

/// Write-once, read-many map from workspace key to its logger handle.
pub struct LoggerMap<L> {
    inner: RwLock<HashMap<String, Arc<L>>>,
}

impl<L> Default for LoggerMap<L> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<L> LoggerMap<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, workspace: &str, logger: Arc<L>) {
        self.inner.write().insert(workspace_key(workspace), logger);
    }

    pub fn load(&self, workspace: &str) -> Option<Arc<L>> {
        self.inner.read().get(&workspace_key(workspace)).cloned()
    }
}
