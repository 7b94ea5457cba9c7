//! Conformance: Core Message Model
//!
//! Asserts the shared vocabulary and the JSON-LD boundary behave the way
//! every harness component relies on.
//!
//! Coverage:
//! - Emitted status registry (200/400/401/404/409/500)
//! - Message type registry (13 DSP types)
//! - Canonicalize-then-extract for inbound messages in every accepted form
//! - Compaction of harness-built messages

mod canonical_extraction;
mod message_type_registry;
mod status_registry;
