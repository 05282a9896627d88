//! Dimension ↔ dimension co-activation.
//!
//! Personality/style dimensions arrive as readings in [0,1]. Pairs that are
//! active together strengthen by the product of their values, so two
//! strongly active dimensions wire together fast and marginal ones barely
//! at all. Alongside, the engine tracks dimensions that move in opposite
//! directions and recurring groups of three or more active dimensions.

use crate::persistence::PersistenceLane;
use crate::vocabulary::{days_between, undecayed_days};
use chrono::Utc;
use dashmap::DashMap;
use hebb_core::config::DimensionConfig;
use hebb_core::error::{HebbError, Result};
use hebb_core::numeric::{is_unit, sanitize_strength};
use hebb_core::records::{
    Coactivation, MultiDimensionalPattern, NegativeCorrelation, DEFAULT_COACTIVATION_STRENGTH,
};
use hebb_core::store::{Record, RecordKey};
use hebb_core::types::{pattern_id, DimensionPair, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// What a single observation changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionUpdate {
    /// Dimensions above the activation threshold, sorted.
    pub active: Vec<String>,
    pub pairs_updated: usize,
    pub negative_updated: usize,
    /// Set when three or more dimensions were active together.
    pub pattern_id: Option<String>,
}

/// A predicted value for a dimension that was not supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionPrediction {
    pub value: f64,
    pub confidence: f64,
    /// Known dimensions that contributed, sorted.
    pub sources: Vec<String>,
}

/// Everything the engine has learned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionExport {
    pub coactivations: Vec<Coactivation>,
    pub patterns: Vec<MultiDimensionalPattern>,
    pub negative_correlations: Vec<NegativeCorrelation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionStats {
    pub coactivations: usize,
    pub patterns: usize,
    pub negative_correlations: usize,
    pub observations: u64,
    pub faults_recovered: u64,
}

pub struct DimensionCoactivationEngine {
    config: RwLock<DimensionConfig>,
    coactivations: DashMap<DimensionPair, Coactivation>,
    negatives: DashMap<(String, String), NegativeCorrelation>,
    patterns: DashMap<String, MultiDimensionalPattern>,
    lane: Arc<PersistenceLane>,
    observations: AtomicU64,
    faults: AtomicU64,
}

impl DimensionCoactivationEngine {
    pub fn new(config: DimensionConfig, lane: Arc<PersistenceLane>) -> Self {
        Self {
            config: RwLock::new(config),
            coactivations: DashMap::new(),
            negatives: DashMap::new(),
            patterns: DashMap::new(),
            lane,
            observations: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DimensionConfig::default(), Arc::new(PersistenceLane::detached()))
    }

    pub fn config(&self) -> DimensionConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: DimensionConfig) {
        *self.config.write() = config;
    }

    fn guard(&self, value: f64, key: impl FnOnce() -> RecordKey) -> f64 {
        if value.is_finite() {
            return value.clamp(0.0, 1.0);
        }
        let out = sanitize_strength(value, DEFAULT_COACTIVATION_STRENGTH, &key().to_string());
        self.faults.fetch_add(1, Ordering::Relaxed);
        out.value
    }

    fn validate(values: &BTreeMap<String, f64>, satisfaction: Option<f64>) -> Result<()> {
        for (name, value) in values {
            if name.trim().is_empty() {
                return Err(HebbError::invalid_input("empty dimension name"));
            }
            if !is_unit(*value) {
                return Err(HebbError::invalid_input(format!(
                    "dimension {} reading must be in [0,1], got {}",
                    name, value
                )));
            }
        }
        if let Some(s) = satisfaction {
            if !is_unit(s) {
                return Err(HebbError::invalid_input(format!(
                    "satisfaction must be in [0,1], got {}",
                    s
                )));
            }
        }
        Ok(())
    }

    /// Fold one set of dimension readings into the engine.
    ///
    /// Malformed readings reject the whole observation; nothing is applied.
    pub fn observe_at(
        &self,
        values: &BTreeMap<String, f64>,
        satisfaction: Option<f64>,
        at: Timestamp,
    ) -> Result<DimensionUpdate> {
        Self::validate(values, satisfaction)?;
        let config = self.config();

        let active: Vec<(&String, f64)> = values
            .iter()
            .filter(|(_, v)| **v > config.activation_threshold)
            .map(|(k, v)| (k, *v))
            .collect();

        let mut update = DimensionUpdate {
            active: active.iter().map(|(k, _)| (*k).clone()).collect(),
            ..DimensionUpdate::default()
        };

        for (i, (a, va)) in active.iter().enumerate() {
            for (b, vb) in active.iter().skip(i + 1) {
                let pair = DimensionPair::new(a.as_str(), b.as_str());
                let mut entry = self
                    .coactivations
                    .entry(pair.clone())
                    .or_insert_with(|| Coactivation::new(pair.clone(), at));
                let raw = entry.strength + config.learning_rate * va * vb;
                entry.strength = self.guard(raw, || RecordKey::coactivation(&pair));
                entry.observation_count += 1;
                entry.last_updated = at;
                self.lane.write(Record::Coactivation(entry.clone()));
                update.pairs_updated += 1;
            }
        }

        for (high, v_high) in values.iter().filter(|(_, v)| **v > config.high_threshold) {
            for (low, v_low) in values.iter().filter(|(_, v)| **v < config.low_threshold) {
                if high == low {
                    continue;
                }
                let mut entry = self
                    .negatives
                    .entry((high.clone(), low.clone()))
                    .or_insert_with(|| NegativeCorrelation {
                        dim_high: high.clone(),
                        dim_low: low.clone(),
                        correlation_strength: DEFAULT_COACTIVATION_STRENGTH,
                        observation_count: 0,
                    });
                let s = entry.correlation_strength;
                let raw = s + config.learning_rate * (v_high - v_low) * (1.0 - s);
                entry.correlation_strength =
                    self.guard(raw, || RecordKey::negative_correlation(high, low));
                entry.observation_count += 1;
                self.lane.write(Record::NegativeCorrelation(entry.clone()));
                update.negative_updated += 1;
            }
        }

        if active.len() >= 3 {
            let id = pattern_id(&update.active);
            let active_values: BTreeMap<String, f64> =
                active.iter().map(|(k, v)| ((*k).clone(), *v)).collect();
            let mut entry = self
                .patterns
                .entry(id.clone())
                .or_insert_with(|| MultiDimensionalPattern::new(id.clone(), at));
            entry.record(&active_values, satisfaction, at);
            self.lane.write(Record::Pattern(entry.clone()));
            update.pattern_id = Some(id);
        }

        self.observations.fetch_add(1, Ordering::Relaxed);
        debug!(
            active = update.active.len(),
            pairs = update.pairs_updated,
            negative = update.negative_updated,
            "observed dimension readings"
        );
        Ok(update)
    }

    pub fn observe(&self, values: &BTreeMap<String, f64>, satisfaction: Option<f64>) -> Result<DimensionUpdate> {
        self.observe_at(values, satisfaction, Utc::now())
    }

    /// Order-independent; unobserved pairs read as 0.0.
    pub fn coactivation_strength(&self, a: &str, b: &str) -> f64 {
        self.coactivations
            .get(&DimensionPair::new(a, b))
            .map_or(DEFAULT_COACTIVATION_STRENGTH, |c| c.strength)
    }

    /// Partners of `dimension`, strongest first (ties by name).
    pub fn strongest_coactivations(&self, dimension: &str, n: usize) -> Vec<(String, f64)> {
        let mut partners: Vec<(String, f64)> = self
            .coactivations
            .iter()
            .filter_map(|entry| {
                let other = entry.key().other(dimension)?;
                Some((other.to_string(), entry.strength))
            })
            .collect();
        partners.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        partners.truncate(n);
        partners
    }

    /// Predict unsupplied dimensions from strongly co-activated known ones.
    ///
    /// Each active known dimension contributes `known × strength` with
    /// confidence `strength` through every partner at or above the strong
    /// co-activation level. Contributions to the same target combine as a
    /// confidence-weighted mean value with mean confidence. Targets below
    /// `threshold` (configured default when `None`) are dropped.
    pub fn predict(
        &self,
        known: &BTreeMap<String, f64>,
        threshold: Option<f64>,
    ) -> BTreeMap<String, DimensionPrediction> {
        let config = self.config();
        let threshold = threshold.unwrap_or(config.prediction_confidence);
        // target -> [(value, confidence, source)]
        let mut contributions: BTreeMap<String, Vec<(f64, f64, String)>> = BTreeMap::new();

        for (source, value) in known {
            if !value.is_finite() || *value <= config.activation_threshold {
                continue;
            }
            for entry in self.coactivations.iter() {
                let Some(target) = entry.key().other(source) else { continue };
                if entry.strength < config.strong_coactivation || known.contains_key(target) {
                    continue;
                }
                contributions.entry(target.to_string()).or_default().push((
                    value * entry.strength,
                    entry.strength,
                    source.clone(),
                ));
            }
        }

        let mut predictions = BTreeMap::new();
        for (target, parts) in contributions {
            let weight: f64 = parts.iter().map(|(_, c, _)| c).sum();
            if weight <= 0.0 {
                continue;
            }
            let value = parts.iter().map(|(v, c, _)| v * c).sum::<f64>() / weight;
            let confidence = weight / parts.len() as f64;
            if confidence < threshold {
                continue;
            }
            let mut sources: Vec<String> = parts.into_iter().map(|(_, _, s)| s).collect();
            sources.sort();
            sources.dedup();
            predictions.insert(
                target,
                DimensionPrediction {
                    value: value.clamp(0.0, 1.0),
                    confidence: confidence.clamp(0.0, 1.0),
                    sources,
                },
            );
        }
        predictions
    }

    /// Patterns seen at least `min_frequency` times, most frequent first.
    pub fn multi_dim_patterns(&self, min_frequency: u64) -> Vec<MultiDimensionalPattern> {
        let mut out: Vec<MultiDimensionalPattern> = self
            .patterns
            .iter()
            .filter(|p| p.frequency >= min_frequency)
            .map(|p| p.value().clone())
            .collect();
        out.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.pattern_id.cmp(&b.pattern_id)));
        out
    }

    /// Negative correlations at least `min_strength` strong, strongest first.
    pub fn negative_correlations(&self, min_strength: f64) -> Vec<NegativeCorrelation> {
        let mut out: Vec<NegativeCorrelation> = self
            .negatives
            .iter()
            .filter(|n| n.correlation_strength >= min_strength)
            .map(|n| n.value().clone())
            .collect();
        out.sort_by(|a, b| {
            b.correlation_strength
                .total_cmp(&a.correlation_strength)
                .then_with(|| (&a.dim_high, &a.dim_low).cmp(&(&b.dim_high, &b.dim_low)))
        });
        out
    }

    /// Decay co-activations idle for at least `days_inactive` days.
    pub fn apply_decay_at(&self, days_inactive: f64, now: Timestamp) -> Result<usize> {
        if !days_inactive.is_finite() || days_inactive < 0.0 {
            return Err(HebbError::invalid_input(format!(
                "days_inactive must be a non-negative number, got {}",
                days_inactive
            )));
        }
        let rate = self.config.read().decay_rate_per_day;
        let mut touched = 0;
        for mut entry in self.coactivations.iter_mut() {
            let idle_days = days_between(entry.last_updated, now);
            if idle_days <= 0.0 || idle_days < days_inactive {
                continue;
            }
            let days = undecayed_days(entry.last_updated, entry.last_decayed, now);
            if days <= 0.0 {
                continue;
            }
            let pair = entry.key().clone();
            let decayed = (entry.strength * (1.0 - rate * days)).max(0.0);
            entry.strength = self.guard(decayed, || RecordKey::coactivation(&pair));
            entry.last_decayed = Some(now);
            self.lane.write(Record::Coactivation(entry.clone()));
            touched += 1;
        }
        if touched > 0 {
            info!(touched, days_inactive, "decayed co-activations");
        }
        Ok(touched)
    }

    pub fn apply_decay(&self, days_inactive: f64) -> Result<usize> {
        self.apply_decay_at(days_inactive, Utc::now())
    }

    /// Delete co-activations that are both weak and rarely observed.
    pub fn prune(&self, min_strength: f64, min_observations: u64) -> usize {
        let mut deleted = 0;
        self.coactivations.retain(|pair, c| {
            let doomed = c.strength < min_strength && c.observation_count < min_observations;
            if doomed {
                self.lane.remove(&RecordKey::coactivation(pair));
                deleted += 1;
            }
            !doomed
        });
        if deleted > 0 {
            info!(deleted, min_strength, min_observations, "pruned co-activations");
        }
        deleted
    }

    pub fn export_all(&self) -> DimensionExport {
        let mut coactivations: Vec<Coactivation> =
            self.coactivations.iter().map(|c| c.value().clone()).collect();
        coactivations.sort_by(|a, b| a.pair.cmp(&b.pair));

        let mut patterns: Vec<MultiDimensionalPattern> =
            self.patterns.iter().map(|p| p.value().clone()).collect();
        patterns.sort_by(|a, b| a.pattern_id.cmp(&b.pattern_id));

        let mut negative_correlations: Vec<NegativeCorrelation> =
            self.negatives.iter().map(|n| n.value().clone()).collect();
        negative_correlations.sort_by(|a, b| (&a.dim_high, &a.dim_low).cmp(&(&b.dim_high, &b.dim_low)));

        DimensionExport {
            coactivations,
            patterns,
            negative_correlations,
        }
    }

    /// Load exported records, replacing same-keyed ones, and write them through.
    pub fn import(&self, export: &DimensionExport) -> usize {
        self.restore(export, true)
    }

    pub(crate) fn restore(&self, export: &DimensionExport, persist: bool) -> usize {
        for record in &export.coactivations {
            let mut c = record.clone();
            c.strength = self.guard(c.strength, || RecordKey::coactivation(&record.pair));
            if persist {
                self.lane.write(Record::Coactivation(c.clone()));
            }
            self.coactivations.insert(c.pair.clone(), c);
        }
        for record in &export.patterns {
            if persist {
                self.lane.write(Record::Pattern(record.clone()));
            }
            self.patterns.insert(record.pattern_id.clone(), record.clone());
        }
        for record in &export.negative_correlations {
            let mut n = record.clone();
            n.correlation_strength = self.guard(n.correlation_strength, || {
                RecordKey::negative_correlation(&record.dim_high, &record.dim_low)
            });
            if persist {
                self.lane.write(Record::NegativeCorrelation(n.clone()));
            }
            self.negatives.insert((n.dim_high.clone(), n.dim_low.clone()), n);
        }
        export.coactivations.len() + export.patterns.len() + export.negative_correlations.len()
    }

    pub fn stats(&self) -> DimensionStats {
        DimensionStats {
            coactivations: self.coactivations.len(),
            patterns: self.patterns.len(),
            negative_correlations: self.negatives.len(),
            observations: self.observations.load(Ordering::Relaxed),
            faults_recovered: self.faults.load(Ordering::Relaxed),
        }
    }
}
