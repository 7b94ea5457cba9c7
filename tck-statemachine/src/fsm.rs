//! Shared transition rules.
//!
//! Both entity families describe their table through [`ProtocolState`];
//! [`validate_transition`] is the single gate every transition passes.

use std::fmt::{Debug, Display};

use tck_core::errors::TckError;

/// A protocol state with a static transition table.
pub trait ProtocolState: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Every state, in table order.
    const ALL: &'static [Self];

    /// Legal target states from `self`. Empty for terminal states.
    fn allowed_targets(self) -> &'static [Self];

    /// Whether the correlation id must be set before `from → to`.
    fn requires_correlation(from: Self, to: Self) -> bool;

    fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Looks a state up by its wire name (`REQUESTED`, ...).
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.to_string() == name)
    }
}

/// Checks the edge and the correlation precondition.
///
/// # Contract
/// - Edge not in the table (including any edge out of a terminal state):
///   [`TckError::IllegalTransition`].
/// - Correlation required but not set: [`TckError::MissingCorrelationId`].
/// - Otherwise `Ok(())`. Never mutates anything.
pub fn validate_transition<S: ProtocolState>(
    from: S,
    to: S,
    correlation_set: bool,
) -> Result<(), TckError> {
    if !from.can_transition_to(to) {
        return Err(TckError::illegal_transition(from, to, from.allowed_targets()));
    }
    if S::requires_correlation(from, to) && !correlation_set {
        return Err(TckError::MissingCorrelationId(to.to_string()));
    }
    Ok(())
}
