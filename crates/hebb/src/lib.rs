//! # Hebb
//!
//! Online Hebbian associative memory for conversational agents.
//!
//! Hebb learns three kinds of regularity from live conversation, one turn at
//! a time and without supervision: which words fit which conversational
//! context, which personality/style dimensions fire together, and how
//! conversations move between states. Every update is a small local
//! Hebbian rule with competitive weakening and idle decay, and every
//! prediction is gated on confidence.
//!
//! ## Quick Start
//!
//! ```rust
//! use hebb::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let manager = LearningManager::default();
//! let session = SessionId::from("demo");
//! let signals = ContextSignals::default();
//!
//! let readings: BTreeMap<String, f64> = [("humor", 0.9), ("warmth", 0.8)]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v))
//!     .collect();
//!
//! for message in ["hey", "I need to parse CSV files", "thanks, that worked"] {
//!     let result = manager.process_turn(&session, message, "", &signals, &readings);
//!     println!("{} -> {:?}", result.state, result.predictions.next_states);
//! }
//!
//! // Words learned in casual chat can be filtered out of formal replies
//! let reply = manager.filter_vocabulary("ngl that works", ContextType::FormalTechnical, None);
//! println!("{}", reply);
//! ```
//!
//! ## Architecture
//!
//! Hebb is organized into two crates:
//!
//! - [`hebb_core`] - Shared types, persisted record layout, store contract, configuration
//! - [`hebb_runtime`] - The three engines, the learning manager, caching and persistence
//!
//! ## Key Concepts
//!
//! ### Engines
//!
//! | Engine | Learns | Update rule |
//! |--------|--------|-------------|
//! | Vocabulary | term ↔ context | `s += lr·(1−s)`, competitors `s -= cr·s` |
//! | Dimensions | dimension ↔ dimension | `s += lr·va·vb` when both are active |
//! | Sequences | state → state | transition counts, renormalized per source |
//!
//! ### Conversation States
//!
//! Each user message is classified into one of thirteen states
//! (`problem_statement`, `debugging_help`, `positive_feedback`, ...). The
//! sequence engine keeps a Markov matrix over them, mines recurring windows
//! into pattern templates and anticipates the next state when either is
//! confident enough.
//!
//! ### Persistence
//!
//! Every mutation is written through to a record store. When the store
//! fails, learning carries on in memory and the health summary reports
//! degraded persistence until the store answers again.
//!
//! ## Snapshots
//!
//! Save and restore everything learned:
//!
//! ```rust,no_run
//! use hebb::prelude::*;
//! use std::path::Path;
//!
//! let manager = LearningManager::default();
//!
//! // Save snapshot
//! let metadata = manager.save_snapshot(Path::new("hebb-snapshot.json")).unwrap();
//! println!("saved {} records", metadata.record_count);
//!
//! // Load into a fresh manager
//! let restored = LearningManager::default();
//! restored.load_snapshot(Path::new("hebb-snapshot.json")).unwrap();
//! ```

// Re-export all subcrates
pub use hebb_core as core;
pub use hebb_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust
/// use hebb::prelude::*;
/// ```
pub mod prelude {
    pub use hebb_runtime::prelude::*;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
