//! Hebb Core Prelude: convenient imports for common usage.
//!
//! ```rust
//! use hebb_core::prelude::*;
//! ```

// Re-export commonly used types
pub use crate::types::{
    ContextType, ConversationState, SessionId, ContextSignals,
    DimensionPair, Timestamp,
};

// Re-export records
pub use crate::records::{
    Association, Coactivation, MultiDimensionalPattern, NegativeCorrelation,
    StateTransition, StateSequence, SkipOpportunity, PatternTemplate,
    ConfigRecord,
};

// Re-export the store contract
pub use crate::store::{AssociationStore, Record, RecordKey, RecordKind, KeyPrefix};

// Re-export configuration
pub use crate::config::LearningConfig;

// Re-export error types
pub use crate::error::{HebbError, StoreError, ConfigError, Result};
