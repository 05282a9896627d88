//! Hebb Runtime Prelude: convenient imports for common usage.
//!
//! ```rust
//! use hebb_runtime::prelude::*;
//! ```

// Re-export the manager
pub use crate::manager::{
    DecayReport, HydrationReport, LearningManager, MaintenanceReport, PruneReport, TurnError,
    TurnPredictions, TurnResult, TurnStage,
};

// Re-export engines
pub use crate::dimensions::{DimensionCoactivationEngine, DimensionExport, DimensionPrediction, DimensionUpdate};
pub use crate::sequence::{
    default_pattern_score, Anticipation, AnticipationSource, PatternScore, SequenceExport,
    SequenceLearningEngine, TransitionOutcome,
};
pub use crate::vocabulary::{ObservationEvent, StrengthOverride, Substitution, VocabularyAssociationEngine};
pub use crate::classifier::{ContextClassifier, StateClassifier};

// Re-export metrics and snapshots
pub use crate::metrics::{HealthStatus, HealthSummary, SystemStats};
pub use crate::snapshot::{LearningSnapshot, SnapshotMetadata};

// Re-export backend configuration
pub use crate::backend::{create_store, BackendError, DynStore, StoreConfig};
pub use crate::memory_store::MemoryStore;
pub use crate::persistence::PersistenceLane;

// Re-export SQLite backend when feature is enabled
#[cfg(feature = "sqlite")]
pub use crate::sqlite_store::SqliteStore;

// Re-export from core
pub use hebb_core::prelude::*;
