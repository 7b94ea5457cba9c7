//! TCK State Machines: negotiation and transfer-process entities.
//!
//! Pure logic: transition tables, correlation preconditions, lock-guarded
//! mutation and observer notification. No IO.
//!
//! # Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`fsm`] | [`ProtocolState`] trait and the shared transition gate |
//! | [`negotiation`] | [`Negotiation`] entity and its builder |
//! | [`transfer`] | [`TransferProcess`] entity, [`DataAddress`] |

pub mod fsm;
pub mod negotiation;
pub mod transfer;

pub use fsm::{validate_transition, ProtocolState};
pub use negotiation::{Negotiation, NegotiationKind, NegotiationState};
pub use transfer::{DataAddress, TransferKind, TransferProcess, TransferState};
