//! Counter-party behaviour of the embedded reference connector.
//!
//! Each function returns a boxed mock action. When it runs, it moves the
//! system connector's entity to the next state and posts the matching
//! message to the harness callback address, so the harness sees the same
//! traffic a networked connector would produce.
//!
//! ## Usage
//!
//! ```ignore
//! let mock = runtime.provider_transfer_mock();
//! mock.record_requested_action(provider_actions::post_start_transfer(runtime.action_context()));
//! ```

pub mod consumer_actions;
pub mod provider_actions;

use std::sync::Arc;

use serde_json::Value;
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tracing::debug;

use crate::client::http::{check_status, join};
use crate::connector::Connector;
use crate::transport::Transport;

/// Everything an action needs to reach the harness.
#[derive(Clone)]
pub struct ActionContext {
    pub transport: Arc<dyn Transport>,
    pub canonicalizer: Arc<Canonicalizer>,
    /// Harness callback base address.
    pub harness_address: String,
    /// Callback address the system connector advertises.
    pub own_address: String,
    /// Participant id the system connector signs offers and agreements with.
    pub participant_id: String,
    pub system: Connector,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("harness_address", &self.harness_address)
            .field("own_address", &self.own_address)
            .field("participant_id", &self.participant_id)
            .finish()
    }
}

impl ActionContext {
    /// Validates `document`, posts it to `base` + `path` and returns the
    /// canonical answer, if the counter-party sent one.
    pub fn post(
        &self,
        operation: &str,
        base: &str,
        path: &str,
        document: &Value,
    ) -> Result<Option<CanonicalMessage>, TckError> {
        let message = self.canonicalizer.canonicalize(document)?;
        let body = self.canonicalizer.serialize(&message)?;
        let url = join(base, path);
        debug!(operation, url = %url, "mock action posting");
        let response = self.transport.post(&url, &body)?;
        match check_status(operation, response, false)?.and_then(|r| r.body) {
            Some(body) => self.canonicalizer.canonicalize(&body).map(Some),
            None => Ok(None),
        }
    }
}

/// Entity attribute required by an action but not yet known.
pub(crate) fn missing(what: &str, id: &str) -> TckError {
    TckError::Expectation(format!("No {what} known for {id}"))
}
