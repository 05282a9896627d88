//! # Hebb Core
//!
//! Core types and contracts for Hebb, an online associative memory that lets
//! a conversational agent learn from live interaction without supervision.
//!
//! This crate defines everything the learning engines share but none of the
//! learning itself:
//!
//! - **Vocabulary contexts** - the six conversational contexts a term can fit
//! - **Conversation states** - the closed state vocabulary the sequence learner uses
//! - **Records** - associations, co-activations, patterns, transitions, sequences, templates
//! - **Store contract** - the narrow keyed-record interface persistence must satisfy
//! - **Configuration** - the recognized parameter table with validation
//! - **Errors** - the failure taxonomy (most faults are recovered, not raised)
//!
//! ## Quick Start
//!
//! ```rust
//! use hebb_core::prelude::*;
//!
//! // Unordered dimension pairs are canonicalized on construction
//! let pair = DimensionPair::new("warmth", "humor");
//! assert_eq!(pair.first(), "humor");
//!
//! // Unset parameters fall back to documented defaults
//! let config = LearningConfig::default();
//! assert_eq!(config.sequences.pattern_threshold, 5);
//! ```

pub mod types;
pub mod records;
pub mod store;
pub mod config;
pub mod error;
pub mod text;
pub mod numeric;
pub mod prelude;
