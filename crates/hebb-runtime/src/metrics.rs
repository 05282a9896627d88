//! System statistics and the health summary derived from them.

use crate::cache::CacheStats;
use crate::dimensions::DimensionStats;
use crate::persistence::PersistenceStats;
use crate::sequence::SequenceStats;
use crate::vocabulary::VocabStats;
use serde::Serialize;

/// Everything the manager and its engines count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub turns: u64,
    /// Engine failures recorded in turn results.
    pub turn_errors: u64,
    pub maintenance_runs: u64,
    /// Mean `process_turn` latency in microseconds.
    pub avg_turn_latency_us: f64,
    pub vocab: VocabStats,
    pub dimensions: DimensionStats,
    pub sequences: SequenceStats,
    pub persistence: PersistenceStats,
    pub should_use_cache: CacheStats,
    pub predict_cache: CacheStats,
}

impl SystemStats {
    /// NaN/∞ faults recovered across all engines.
    pub fn faults_recovered(&self) -> u64 {
        self.vocab.faults_recovered + self.dimensions.faults_recovered + self.sequences.faults_recovered
    }

    /// Hit rate over both query caches together.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.should_use_cache.hits + self.predict_cache.hits;
        let total = hits + self.should_use_cache.misses + self.predict_cache.misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Learning continues in memory only.
    Degraded,
}

/// Compact operational view for the owning pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub backend: String,
    pub persistence_degraded: bool,
    pub persistence_incidents: u64,
    pub skipped_writes: u64,
    pub turns: u64,
    pub turn_errors: u64,
    pub faults_recovered: u64,
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    pub associations: usize,
    pub coactivations: usize,
    pub transitions: usize,
    pub templates: usize,
    pub sessions: usize,
}

impl From<&SystemStats> for HealthSummary {
    fn from(stats: &SystemStats) -> Self {
        let degraded = stats.persistence.degraded;
        Self {
            status: if degraded {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            backend: stats.persistence.backend.clone(),
            persistence_degraded: degraded,
            persistence_incidents: stats.persistence.incidents,
            skipped_writes: stats.persistence.skipped,
            turns: stats.turns,
            turn_errors: stats.turn_errors,
            faults_recovered: stats.faults_recovered(),
            cache_enabled: stats.should_use_cache.enabled || stats.predict_cache.enabled,
            cache_size: stats.should_use_cache.size + stats.predict_cache.size,
            cache_hit_rate: stats.cache_hit_rate(),
            associations: stats.vocab.associations,
            coactivations: stats.dimensions.coactivations,
            transitions: stats.sequences.transitions,
            templates: stats.sequences.templates,
            sessions: stats.sequences.sessions,
        }
    }
}
