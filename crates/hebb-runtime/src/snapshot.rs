//! Whole-system snapshots as pretty JSON.
//!
//! A snapshot carries every learned record kind, the configuration table
//! and the manual vocabulary adjustments, so a fresh manager loaded from it
//! answers every query the same way the exporting one did.

use crate::dimensions::DimensionExport;
use crate::sequence::SequenceExport;
use crate::vocabulary::{StrengthOverride, Substitution};
use chrono::Utc;
use hebb_core::error::Result;
use hebb_core::records::{Association, ConfigRecord};
use hebb_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    pub created_at: Timestamp,
    pub version: u32,
    #[serde(default)]
    pub turns: u64,
    #[serde(default)]
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSnapshot {
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub config: Vec<ConfigRecord>,
    #[serde(default)]
    pub associations: Vec<Association>,
    #[serde(default)]
    pub overrides: Vec<StrengthOverride>,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default)]
    pub dimensions: DimensionExport,
    #[serde(default)]
    pub sequences: SequenceExport,
}

impl LearningSnapshot {
    pub fn new(
        config: Vec<ConfigRecord>,
        associations: Vec<Association>,
        overrides: Vec<StrengthOverride>,
        substitutions: Vec<Substitution>,
        dimensions: DimensionExport,
        sequences: SequenceExport,
        turns: u64,
    ) -> Self {
        let mut snapshot = Self {
            metadata: SnapshotMetadata {
                snapshot_id: uuid::Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                version: SNAPSHOT_VERSION,
                turns,
                record_count: 0,
            },
            config,
            associations,
            overrides,
            substitutions,
            dimensions,
            sequences,
        };
        snapshot.metadata.record_count = snapshot.record_count();
        snapshot
    }

    /// Learned records, excluding configuration and manual adjustments.
    pub fn record_count(&self) -> usize {
        self.associations.len()
            + self.dimensions.coactivations.len()
            + self.dimensions.patterns.len()
            + self.dimensions.negative_correlations.len()
            + self.sequences.transitions.len()
            + self.sequences.sequences.len()
            + self.sequences.templates.len()
    }

    /// Snapshots equal in everything but their identity and creation time.
    pub fn same_contents(&self, other: &Self) -> bool {
        self.config == other.config
            && self.associations == other.associations
            && self.overrides == other.overrides
            && self.substitutions == other.substitutions
            && self.dimensions == other.dimensions
            && self.sequences == other.sequences
    }
}

/// Write a snapshot as pretty JSON, creating parent directories.
pub fn save_snapshot(snapshot: &LearningSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, json)?;
    info!(
        path = %path.display(),
        snapshot = %snapshot.metadata.snapshot_id,
        records = snapshot.metadata.record_count,
        "saved snapshot"
    );
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<LearningSnapshot> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hebb_core::config::LearningConfig;
    use hebb_core::types::ContextType;

    fn sample() -> LearningSnapshot {
        let mut a = Association::new("ngl", ContextType::CasualChat, Utc::now());
        a.strength = 0.7;
        a.observation_count = 4;
        LearningSnapshot::new(
            LearningConfig::default().records(),
            vec![a],
            vec![StrengthOverride {
                term: "lol".into(),
                context: ContextType::FormalTechnical,
                value: 0.0,
            }],
            Vec::new(),
            DimensionExport::default(),
            SequenceExport::default(),
            12,
        )
    }

    #[test]
    fn metadata_counts_records() {
        let snapshot = sample();
        assert_eq!(snapshot.metadata.record_count, 1);
        assert_eq!(snapshot.metadata.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.metadata.turns, 12);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let snapshot = sample();
        save_snapshot(&snapshot, &path).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, hebb_core::error::HebbError::Io(_)));
    }

    #[test]
    fn same_contents_ignores_identity() {
        let a = sample();
        let mut b = a.clone();
        b.metadata.snapshot_id = "other".into();
        assert!(a.same_contents(&b));
        b.associations.clear();
        assert!(!a.same_contents(&b));
    }
}
