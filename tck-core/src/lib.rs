//! TCK Core: message model and protocol vocabulary.
//!
//! This crate holds everything the protocol state machines and the system
//! harness share: the DSP 2025-1 vocabulary, the error taxonomy, and the
//! canonical message model with its JSON-LD boundary.
//!
//! # Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Namespaces, message types, property IRIs, defaults |
//! | [`errors`] | [`TckError`] and the failure-status registry |
//! | [`message`] | Canonical message model, contexts, schemas, canonicalizer |
//! | [`messages`] | Compact wire-message builders |
//!
//! # Wire Boundary
//!
//! Compact JSON-LD enters through [`message::Canonicalizer::canonicalize`]
//! and leaves through [`message::Canonicalizer::serialize`]. Code between
//! those two calls only sees [`message::CanonicalMessage`].

/// DSP vocabulary and harness defaults.
pub mod constants;

/// Error types and failure-status mapping.
pub mod errors;

/// Canonical message model and JSON-LD processing.
pub mod message;

/// Wire-message builders.
pub mod messages;

pub use errors::{FailureKind, TckError};
pub use message::{CanonicalMessage, Canonicalizer};
