//! One party's complete set of managers.

use std::sync::Arc;

use serde_json::{json, Value};
use tck_core::constants::PROTOCOL_VERSION;
use tck_core::message::Canonicalizer;

use crate::manager::{
    ConsumerNegotiationManager, ConsumerTransferProcessManager, ProviderNegotiationManager,
    ProviderTransferProcessManager,
};

/// Consumer and provider managers for both protocols.
///
/// A runtime owns two: the harness connector playing the counter-party,
/// and the system connector standing in for the system under test in
/// local mode.
#[derive(Clone)]
pub struct Connector {
    pub consumer_negotiation: Arc<ConsumerNegotiationManager>,
    pub provider_negotiation: Arc<ProviderNegotiationManager>,
    pub consumer_transfer: Arc<ConsumerTransferProcessManager>,
    pub provider_transfer: Arc<ProviderTransferProcessManager>,
}

impl Connector {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            consumer_negotiation: Arc::new(ConsumerNegotiationManager::new(canonicalizer.clone())),
            provider_negotiation: Arc::new(ProviderNegotiationManager::new(canonicalizer.clone())),
            consumer_transfer: Arc::new(ConsumerTransferProcessManager::new(canonicalizer.clone())),
            provider_transfer: Arc::new(ProviderTransferProcessManager::new(canonicalizer)),
        }
    }

    /// Version metadata: the supported protocol versions and their paths.
    pub fn metadata(&self) -> Value {
        json!({
            "protocolVersions": [
                { "version": PROTOCOL_VERSION, "path": "/" }
            ]
        })
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::manager::{NegotiationManager, TransferManager};
        f.debug_struct("Connector")
            .field("consumer_negotiations", &self.consumer_negotiation.negotiations().len())
            .field("provider_negotiations", &self.provider_negotiation.negotiations().len())
            .field("consumer_transfers", &self.consumer_transfer.processes().len())
            .field("provider_transfers", &self.provider_transfer.processes().len())
            .finish()
    }
}
