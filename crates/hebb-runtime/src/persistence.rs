//! Write-through persistence lane with degraded mode.
//!
//! The engines own the authoritative in-memory state and push every mutated
//! record through this lane. When the store fails, the lane logs the incident
//! once, flips into degraded mode and drops later writes until
//! [`PersistenceLane::try_recover`] succeeds. Learning continues either way.

use crate::backend::DynStore;
use hebb_core::error::StoreError;
use hebb_core::store::{KeyPrefix, Record, RecordKey, RecordKind};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, warn};

/// Counters describing the lane's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistenceStats {
    pub backend: String,
    pub attached: bool,
    pub degraded: bool,
    /// Records written successfully.
    pub writes: u64,
    /// Records deleted successfully.
    pub deletes: u64,
    /// Individual failed store calls.
    pub failures: u64,
    /// Transitions into degraded mode.
    pub incidents: u64,
    /// Writes dropped while degraded.
    pub skipped: u64,
}

/// Shared handle every engine writes through.
pub struct PersistenceLane {
    store: Option<DynStore>,
    degraded: AtomicBool,
    writes: AtomicU64,
    deletes: AtomicU64,
    failures: AtomicU64,
    incidents: AtomicU64,
    skipped: AtomicU64,
}

impl PersistenceLane {
    /// A lane with no store; every write is a no-op.
    pub fn detached() -> Self {
        Self::build(None)
    }

    pub fn new(store: DynStore) -> Self {
        Self::build(Some(store))
    }

    pub fn from_option(store: Option<DynStore>) -> Self {
        Self::build(store)
    }

    fn build(store: Option<DynStore>) -> Self {
        Self {
            store,
            degraded: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            incidents: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.as_ref().map_or("none", |s| s.backend_name())
    }

    /// The store to write to, or `None` when detached or degraded.
    fn active(&self) -> Option<&DynStore> {
        let store = self.store.as_ref()?;
        if self.is_degraded() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(store)
    }

    fn fail(&self, operation: &str, subject: &dyn std::fmt::Display, err: &StoreError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if self
            .degraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.incidents.fetch_add(1, Ordering::Relaxed);
            warn!(
                operation,
                subject = %subject,
                backend = self.backend_name(),
                error = %err,
                "persistence unavailable, continuing in memory only"
            );
        }
    }

    /// Upsert a record under its canonical key.
    pub fn write(&self, record: Record) {
        let Some(store) = self.active() else { return };
        let key = record.key();
        match store.upsert(&key, record) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.fail("upsert", &key, &e),
        }
    }

    pub fn write_all(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.write(record);
        }
    }

    pub fn remove(&self, key: &RecordKey) {
        let Some(store) = self.active() else { return };
        match store.delete(key) {
            Ok(_) => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.fail("delete", key, &e),
        }
    }

    /// Every stored record of one kind. Detached lanes load nothing.
    pub fn load(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(Vec::new());
        };
        let rows = store.scan_prefix(&KeyPrefix::kind(kind)).map_err(|e| {
            self.fail("scan", &kind.as_str(), &e);
            e
        })?;
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    /// Probe the store and leave degraded mode if it answers.
    ///
    /// Returns whether the lane is healthy afterwards.
    pub fn try_recover(&self) -> bool {
        let Some(store) = self.store.as_ref() else {
            return true;
        };
        if !self.is_degraded() {
            return true;
        }
        match store.scan_prefix(&KeyPrefix::kind(RecordKind::Config)) {
            Ok(_) => {
                self.degraded.store(false, Ordering::Release);
                info!(
                    backend = store.backend_name(),
                    skipped = self.skipped.load(Ordering::Relaxed),
                    "persistence recovered"
                );
                true
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "persistence still unavailable");
                false
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            backend: self.backend_name().to_string(),
            attached: self.is_attached(),
            degraded: self.is_degraded(),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            incidents: self.incidents.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

impl Default for PersistenceLane {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for PersistenceLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceLane")
            .field("backend", &self.backend_name())
            .field("degraded", &self.is_degraded())
            .finish()
    }
}
