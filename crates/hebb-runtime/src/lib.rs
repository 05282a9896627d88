//! # Hebb Runtime
//!
//! Learning engines, the learning manager and the persistence plumbing
//! behind them.
//!
//! Three engines learn independently from each conversational turn:
//!
//! - [`vocabulary`]: which words fit which conversational context
//! - [`dimensions`]: which personality/style dimensions fire together
//! - [`sequence`]: how conversations move between states
//!
//! The [`manager`] feeds them, caches their answers and keeps the record
//! store in step through a [`persistence`] lane that degrades to
//! in-memory learning when the store fails.
//!
//! ```rust
//! use hebb_runtime::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let manager = LearningManager::default();
//! let session = SessionId::from("demo");
//! let result = manager.process_turn(
//!     &session,
//!     "hey, I need help parsing a config file",
//!     "",
//!     &ContextSignals::default(),
//!     &BTreeMap::new(),
//! );
//! assert_eq!(result.turn, 1);
//! assert!(result.errors.is_empty());
//! ```

pub mod backend;
pub mod cache;
pub mod classifier;
pub mod dimensions;
pub mod manager;
pub mod memory_store;
pub mod metrics;
pub mod persistence;
pub mod sequence;
pub mod session;
pub mod snapshot;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod vocabulary;
pub mod prelude;
