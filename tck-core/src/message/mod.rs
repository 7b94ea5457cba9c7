//! Canonical message model and its JSON-LD boundary.
//!
//! Wire messages are compact JSON-LD. Everything inside the harness works on
//! [`CanonicalMessage`], the expanded form produced by [`Canonicalizer`].

pub mod canonical;
pub mod canonicalizer;
pub mod context;
pub mod schema;

pub use canonical::{CanonicalBuilder, CanonicalMessage, Literal, Term};
pub use canonicalizer::Canonicalizer;
pub use context::{ActiveContext, Coercion, ContextRegistry, TermDefinition};
pub use schema::SchemaRegistry;
