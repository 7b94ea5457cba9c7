//! Conformance: Protocol Scenarios
//!
//! Drives the embedded reference connector through complete negotiation
//! and transfer exchanges in local mode. The harness endpoint is reached
//! through the loopback transport, so no sockets are opened.
//!
//! Coverage:
//! - Negotiation with the system as consumer and as provider
//! - Transfer with the system as consumer and as provider
//! - Negative steps (`expect_error`) leave state untouched
//! - Idempotent request handling and mock verification
//! - Version metadata

mod consumer_negotiation;
mod consumer_transfer;
mod idempotency;
mod metadata;
mod provider_negotiation;
mod provider_transfer;
mod support;
