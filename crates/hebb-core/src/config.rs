//! Configuration for the learning engines.
//!
//! Five components (vocab, dimensions, sequences, performance, safety), each
//! with a fixed set of recognized parameters and documented defaults. Unset
//! values fall back to defaults; invalid values are rejected and the prior
//! configuration is kept.

use crate::error::{ConfigError, HebbError};
use crate::records::ConfigRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full learning configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default)]
    pub vocab: VocabConfig,
    #[serde(default)]
    pub dimensions: DimensionConfig,
    #[serde(default)]
    pub sequences: SequenceConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabConfig {
    #[serde(default = "default_vocab_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_competitive_rate")]
    pub competitive_rate: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate_per_day: f64,
    #[serde(default = "default_vocab_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    #[serde(default = "default_dimension_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_activation_threshold")]
    pub activation_threshold: f64,
    #[serde(default = "default_dimension_confidence")]
    pub prediction_confidence: f64,
    #[serde(default = "default_strong_coactivation")]
    pub strong_coactivation: f64,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "default_pattern_threshold")]
    pub pattern_threshold: u64,
    #[serde(default = "default_sequence_confidence")]
    pub prediction_confidence: f64,
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_min_sequence_length")]
    pub min_sequence_length: usize,
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    #[serde(default = "default_skip_probability")]
    pub skip_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_cache_refresh_interval")]
    pub cache_refresh_interval: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_prune_min_strength")]
    pub prune_min_strength: f64,
    #[serde(default = "default_prune_min_observations")]
    pub prune_min_observations: u64,
    #[serde(default = "default_decay_inactive_days")]
    pub decay_inactive_days: f64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

// Default value functions
fn default_vocab_learning_rate() -> f64 { 0.05 }
fn default_competitive_rate() -> f64 { 0.02 }
fn default_decay_rate() -> f64 { 0.01 }
fn default_vocab_threshold() -> f64 { 0.65 }
fn default_history_capacity() -> usize { 1000 }
fn default_dimension_learning_rate() -> f64 { 0.1 }
fn default_activation_threshold() -> f64 { 0.6 }
fn default_dimension_confidence() -> f64 { 0.65 }
fn default_strong_coactivation() -> f64 { 0.5 }
fn default_high_threshold() -> f64 { 0.7 }
fn default_low_threshold() -> f64 { 0.3 }
fn default_pattern_threshold() -> u64 { 5 }
fn default_sequence_confidence() -> f64 { 0.7 }
fn default_max_history_length() -> usize { 10 }
fn default_min_sequence_length() -> usize { 3 }
fn default_max_sequence_length() -> usize { 5 }
fn default_skip_probability() -> f64 { 0.3 }
fn default_cache_size() -> usize { 1000 }
fn default_cache_refresh_interval() -> u64 { 100 }
fn default_maintenance_interval() -> u64 { 500 }
fn default_prune_min_strength() -> f64 { 0.1 }
fn default_prune_min_observations() -> u64 { 3 }
fn default_decay_inactive_days() -> f64 { 7.0 }
fn default_max_sessions() -> usize { 1024 }

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_vocab_learning_rate(),
            competitive_rate: default_competitive_rate(),
            decay_rate_per_day: default_decay_rate(),
            confidence_threshold: default_vocab_threshold(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_dimension_learning_rate(),
            activation_threshold: default_activation_threshold(),
            prediction_confidence: default_dimension_confidence(),
            strong_coactivation: default_strong_coactivation(),
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            decay_rate_per_day: default_decay_rate(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            pattern_threshold: default_pattern_threshold(),
            prediction_confidence: default_sequence_confidence(),
            max_history_length: default_max_history_length(),
            min_sequence_length: default_min_sequence_length(),
            max_sequence_length: default_max_sequence_length(),
            skip_probability: default_skip_probability(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            cache_refresh_interval: default_cache_refresh_interval(),
            maintenance_interval: default_maintenance_interval(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            prune_min_strength: default_prune_min_strength(),
            prune_min_observations: default_prune_min_observations(),
            decay_inactive_days: default_decay_inactive_days(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// The recognized components.
pub const COMPONENTS: [&str; 5] = ["vocab", "dimensions", "sequences", "performance", "safety"];

/// Range constraint on a parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Finite, in [0,1].
    Unit,
    /// Finite, ≥ 0.
    NonNegative,
    /// Whole number in [min, max].
    Integer { min: u64, max: u64 },
}

/// Static description of one recognized parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub component: &'static str,
    pub parameter: &'static str,
    pub constraint: Constraint,
    pub description: &'static str,
}

const fn unit(component: &'static str, parameter: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec { component, parameter, constraint: Constraint::Unit, description }
}

const fn int(
    component: &'static str,
    parameter: &'static str,
    min: u64,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        component,
        parameter,
        constraint: Constraint::Integer { min, max: u32::MAX as u64 },
        description,
    }
}

/// Every recognized parameter.
pub const PARAMETERS: &[ParamSpec] = &[
    unit("vocab", "learning_rate", "Hebbian strengthening rate for observed term/context pairs"),
    unit("vocab", "competitive_rate", "Weakening rate for competing contexts of an observed term"),
    unit("vocab", "decay_rate_per_day", "Fractional strength lost per inactive day"),
    unit("vocab", "confidence_threshold", "Minimum strength for a term to be used in a context"),
    int("vocab", "history_capacity", 1, "Bounded observation log length"),
    unit("dimensions", "learning_rate", "Co-activation rate, scaled by the product of both values"),
    unit("dimensions", "activation_threshold", "Value above which a dimension counts as active"),
    unit("dimensions", "prediction_confidence", "Minimum combined confidence for a dimension prediction"),
    unit("dimensions", "strong_coactivation", "Minimum co-activation strength for a pair to predict"),
    unit("dimensions", "high_threshold", "Value above which a dimension counts as high for negative correlation"),
    unit("dimensions", "low_threshold", "Value below which a dimension counts as low for negative correlation"),
    unit("dimensions", "decay_rate_per_day", "Fractional co-activation strength lost per inactive day"),
    int("sequences", "pattern_threshold", 1, "Sequence frequency at which a pattern template is materialized"),
    unit("sequences", "prediction_confidence", "Minimum confidence for anticipating the next state"),
    int("sequences", "max_history_length", 3, "Per-session state history length"),
    ParamSpec {
        component: "sequences",
        parameter: "min_sequence_length",
        constraint: Constraint::Integer { min: 2, max: 5 },
        description: "Shortest mined state window",
    },
    int("sequences", "max_sequence_length", 2, "Longest mined state window"),
    unit("sequences", "skip_probability", "Direct transition probability above which a skip is considered"),
    int("performance", "cache_size", 0, "Query cache capacity per cache (0 disables caching)"),
    int("performance", "cache_refresh_interval", 1, "Turns between wholesale cache invalidations"),
    int("performance", "maintenance_interval", 0, "Turns between scheduled decay/prune passes (0 disables)"),
    unit("safety", "prune_min_strength", "Records weaker than this are prune candidates"),
    int("safety", "prune_min_observations", 0, "Records observed fewer times than this are prune candidates"),
    ParamSpec {
        component: "safety",
        parameter: "decay_inactive_days",
        constraint: Constraint::NonNegative,
        description: "Inactivity in days before scheduled decay applies",
    },
    int("safety", "max_sessions", 1, "Concurrent session states retained before LRU eviction"),
];

impl Constraint {
    fn check(&self, field: &str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: field.to_string(),
                min: 0.0,
                max: f64::MAX,
                value,
            });
        }
        let (min, max) = match *self {
            Constraint::Unit => (0.0, 1.0),
            Constraint::NonNegative => (0.0, f64::MAX),
            Constraint::Integer { min, max } => {
                if value.fract() != 0.0 {
                    return Err(ConfigError::NotAnInteger {
                        field: field.to_string(),
                        value,
                    });
                }
                (min as f64, max as f64)
            }
        };
        if value < min || value > max {
            return Err(ConfigError::OutOfRange {
                field: field.to_string(),
                min,
                max,
                value,
            });
        }
        Ok(())
    }
}

/// Look up the definition of a parameter.
pub fn param_spec(component: &str, parameter: &str) -> Result<&'static ParamSpec, ConfigError> {
    if !COMPONENTS.contains(&component) {
        return Err(ConfigError::UnknownComponent(component.to_string()));
    }
    PARAMETERS
        .iter()
        .find(|p| p.component == component && p.parameter == parameter)
        .ok_or_else(|| ConfigError::UnknownParameter {
            component: component.to_string(),
            parameter: parameter.to_string(),
        })
}

enum Slot<'a> {
    Float(&'a mut f64),
    Count(&'a mut u64),
    Size(&'a mut usize),
}

impl LearningConfig {
    /// Parse a TOML document. Missing sections and keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LearningConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self, HebbError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Serialize as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every parameter constraint plus cross-parameter consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for spec in PARAMETERS {
            let value = self.get_parameter(spec.component, spec.parameter)?;
            spec.constraint
                .check(&format!("{}.{}", spec.component, spec.parameter), value)?;
        }
        let seq = &self.sequences;
        if seq.max_sequence_length < seq.min_sequence_length {
            return Err(ConfigError::OutOfRange {
                field: "sequences.max_sequence_length".into(),
                min: seq.min_sequence_length as f64,
                max: seq.max_history_length as f64,
                value: seq.max_sequence_length as f64,
            });
        }
        if seq.max_sequence_length > seq.max_history_length {
            return Err(ConfigError::OutOfRange {
                field: "sequences.max_history_length".into(),
                min: seq.max_sequence_length as f64,
                max: u32::MAX as f64,
                value: seq.max_history_length as f64,
            });
        }
        let dims = &self.dimensions;
        if dims.low_threshold >= dims.high_threshold {
            return Err(ConfigError::OutOfRange {
                field: "dimensions.low_threshold".into(),
                min: 0.0,
                max: dims.high_threshold,
                value: dims.low_threshold,
            });
        }
        Ok(())
    }

    fn slot(&mut self, component: &str, parameter: &str) -> Result<Slot<'_>, ConfigError> {
        param_spec(component, parameter)?;
        let slot = match (component, parameter) {
            ("vocab", "learning_rate") => Slot::Float(&mut self.vocab.learning_rate),
            ("vocab", "competitive_rate") => Slot::Float(&mut self.vocab.competitive_rate),
            ("vocab", "decay_rate_per_day") => Slot::Float(&mut self.vocab.decay_rate_per_day),
            ("vocab", "confidence_threshold") => Slot::Float(&mut self.vocab.confidence_threshold),
            ("vocab", "history_capacity") => Slot::Size(&mut self.vocab.history_capacity),
            ("dimensions", "learning_rate") => Slot::Float(&mut self.dimensions.learning_rate),
            ("dimensions", "activation_threshold") => Slot::Float(&mut self.dimensions.activation_threshold),
            ("dimensions", "prediction_confidence") => Slot::Float(&mut self.dimensions.prediction_confidence),
            ("dimensions", "strong_coactivation") => Slot::Float(&mut self.dimensions.strong_coactivation),
            ("dimensions", "high_threshold") => Slot::Float(&mut self.dimensions.high_threshold),
            ("dimensions", "low_threshold") => Slot::Float(&mut self.dimensions.low_threshold),
            ("dimensions", "decay_rate_per_day") => Slot::Float(&mut self.dimensions.decay_rate_per_day),
            ("sequences", "pattern_threshold") => Slot::Count(&mut self.sequences.pattern_threshold),
            ("sequences", "prediction_confidence") => Slot::Float(&mut self.sequences.prediction_confidence),
            ("sequences", "max_history_length") => Slot::Size(&mut self.sequences.max_history_length),
            ("sequences", "min_sequence_length") => Slot::Size(&mut self.sequences.min_sequence_length),
            ("sequences", "max_sequence_length") => Slot::Size(&mut self.sequences.max_sequence_length),
            ("sequences", "skip_probability") => Slot::Float(&mut self.sequences.skip_probability),
            ("performance", "cache_size") => Slot::Size(&mut self.performance.cache_size),
            ("performance", "cache_refresh_interval") => Slot::Count(&mut self.performance.cache_refresh_interval),
            ("performance", "maintenance_interval") => Slot::Count(&mut self.performance.maintenance_interval),
            ("safety", "prune_min_strength") => Slot::Float(&mut self.safety.prune_min_strength),
            ("safety", "prune_min_observations") => Slot::Count(&mut self.safety.prune_min_observations),
            ("safety", "decay_inactive_days") => Slot::Float(&mut self.safety.decay_inactive_days),
            ("safety", "max_sessions") => Slot::Size(&mut self.safety.max_sessions),
            _ => {
                return Err(ConfigError::UnknownParameter {
                    component: component.to_string(),
                    parameter: parameter.to_string(),
                })
            }
        };
        Ok(slot)
    }

    /// Current value of a parameter.
    pub fn get_parameter(&self, component: &str, parameter: &str) -> Result<f64, ConfigError> {
        let mut scratch = self.clone();
        let value = match scratch.slot(component, parameter)? {
            Slot::Float(v) => *v,
            Slot::Count(v) => *v as f64,
            Slot::Size(v) => *v as f64,
        };
        Ok(value)
    }

    /// Set one parameter. On any violation the configuration is unchanged.
    pub fn set_parameter(&mut self, component: &str, parameter: &str, value: f64) -> Result<(), ConfigError> {
        let spec = param_spec(component, parameter)?;
        spec.constraint
            .check(&format!("{}.{}", component, parameter), value)?;

        let mut candidate = self.clone();
        match candidate.slot(component, parameter)? {
            Slot::Float(v) => *v = value,
            Slot::Count(v) => *v = value as u64,
            Slot::Size(v) => *v = value as usize,
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Every parameter as a persisted configuration record.
    pub fn records(&self) -> Vec<ConfigRecord> {
        PARAMETERS
            .iter()
            .filter_map(|spec| {
                let value = self.get_parameter(spec.component, spec.parameter).ok()?;
                Some(ConfigRecord {
                    component: spec.component.to_string(),
                    parameter: spec.parameter.to_string(),
                    value,
                    description: spec.description.to_string(),
                })
            })
            .collect()
    }

    /// Apply persisted records all-or-nothing.
    pub fn apply_records(&mut self, records: &[ConfigRecord]) -> Result<(), ConfigError> {
        let mut candidate = self.clone();
        for record in records {
            let spec = param_spec(&record.component, &record.parameter)?;
            spec.constraint.check(
                &format!("{}.{}", record.component, record.parameter),
                record.value,
            )?;
            match candidate.slot(&record.component, &record.parameter)? {
                Slot::Float(v) => *v = record.value,
                Slot::Count(v) => *v = record.value as u64,
                Slot::Size(v) => *v = record.value as usize,
            }
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let c = LearningConfig::default();
        assert_eq!(c.vocab.learning_rate, 0.05);
        assert_eq!(c.vocab.confidence_threshold, 0.65);
        assert_eq!(c.dimensions.activation_threshold, 0.6);
        assert_eq!(c.sequences.pattern_threshold, 5);
        assert_eq!(c.sequences.prediction_confidence, 0.7);
        assert_eq!(c.performance.cache_refresh_interval, 100);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c = LearningConfig::from_toml_str(
            r#"
            [vocab]
            learning_rate = 0.2

            [sequences]
            pattern_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(c.vocab.learning_rate, 0.2);
        assert_eq!(c.vocab.competitive_rate, 0.02);
        assert_eq!(c.sequences.pattern_threshold, 3);
        assert_eq!(c.safety, SafetyConfig::default());
    }

    #[test]
    fn toml_round_trip() {
        let mut c = LearningConfig::default();
        c.set_parameter("dimensions", "learning_rate", 0.25).unwrap();
        let text = c.to_toml_string().unwrap();
        assert_eq!(LearningConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hebb.toml");
        std::fs::write(&path, "[performance]\ncache_size = 10\n").unwrap();
        let c = LearningConfig::load(&path).unwrap();
        assert_eq!(c.performance.cache_size, 10);
    }

    #[test]
    fn out_of_range_value_is_rejected_and_prior_kept() {
        let mut c = LearningConfig::default();
        let err = c.set_parameter("vocab", "learning_rate", 1.5).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
        assert_eq!(c.vocab.learning_rate, 0.05);
    }

    #[test]
    fn unknown_component_and_parameter_are_rejected() {
        let mut c = LearningConfig::default();
        assert_eq!(
            c.set_parameter("telemetry", "rate", 0.1),
            Err(ConfigError::UnknownComponent("telemetry".into()))
        );
        assert!(matches!(
            c.set_parameter("vocab", "activation_threshold", 0.1),
            Err(ConfigError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn integer_parameters_reject_fractions() {
        let mut c = LearningConfig::default();
        assert!(matches!(
            c.set_parameter("sequences", "pattern_threshold", 2.5),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert!(matches!(
            c.set_parameter("sequences", "pattern_threshold", 0.0),
            Err(ConfigError::OutOfRange { .. })
        ));
        c.set_parameter("sequences", "pattern_threshold", 2.0).unwrap();
        assert_eq!(c.sequences.pattern_threshold, 2);
    }

    #[test]
    fn cross_parameter_conflicts_are_rejected() {
        let mut c = LearningConfig::default();
        assert!(c.set_parameter("sequences", "max_history_length", 4.0).is_err());
        assert_eq!(c.sequences.max_history_length, 10);
        assert!(c.set_parameter("dimensions", "low_threshold", 0.8).is_err());
        assert_eq!(c.dimensions.low_threshold, 0.3);
    }

    #[test]
    fn records_cover_every_parameter_and_reapply() {
        let mut source = LearningConfig::default();
        source.set_parameter("safety", "max_sessions", 8.0).unwrap();
        let records = source.records();
        assert_eq!(records.len(), PARAMETERS.len());

        let mut target = LearningConfig::default();
        target.apply_records(&records).unwrap();
        assert_eq!(target, source);
    }

    #[test]
    fn apply_records_is_all_or_nothing() {
        let mut c = LearningConfig::default();
        let records = vec![
            ConfigRecord {
                component: "vocab".into(),
                parameter: "learning_rate".into(),
                value: 0.3,
                description: String::new(),
            },
            ConfigRecord {
                component: "vocab".into(),
                parameter: "learning_rate_typo".into(),
                value: 0.3,
                description: String::new(),
            },
        ];
        assert!(c.apply_records(&records).is_err());
        assert_eq!(c.vocab.learning_rate, 0.05);
    }
}
