//! Transfer process entity.
//!
//! ## State table
//!
//! | From | To |
//! |------|----|
//! | INITIALIZED | REQUESTED |
//! | REQUESTED, SUSPENDED | STARTED, TERMINATED |
//! | STARTED | SUSPENDED, TERMINATED, COMPLETED |
//! | COMPLETED, TERMINATED | (terminal) |
//!
//! Entering REQUESTED or STARTED requires the correlation id; STARTED can
//! be a provider's initial state, so the check does not depend on `from`.
//! Locking follows [`crate::negotiation`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde_json::Value;
use tck_core::constants::{
    PROPERTY_ENDPOINT_EXPANDED, PROPERTY_ENDPOINT_PROPERTIES_EXPANDED,
    PROPERTY_ENDPOINT_TYPE_EXPANDED, PROPERTY_NAME_EXPANDED, PROPERTY_VALUE_EXPANDED,
};
use tck_core::errors::TckError;
use tck_core::message::CanonicalMessage;
use tck_core::messages;
use tracing::debug;
use uuid::Uuid;

use crate::fsm::{validate_transition, ProtocolState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    Initialized,
    Requested,
    Started,
    Completed,
    Suspended,
    Terminated,
}

use TransferState::*;

impl ProtocolState for TransferState {
    const ALL: &'static [Self] = &[
        Initialized,
        Requested,
        Started,
        Completed,
        Suspended,
        Terminated,
    ];

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Initialized => &[Requested],
            Requested | Suspended => &[Started, Terminated],
            Started => &[Suspended, Terminated, Completed],
            Completed | Terminated => &[],
        }
    }

    fn requires_correlation(_from: Self, to: Self) -> bool {
        matches!(to, Requested | Started)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Initialized => "INITIALIZED",
            Requested => "REQUESTED",
            Started => "STARTED",
            Completed => "COMPLETED",
            Suspended => "SUSPENDED",
            Terminated => "TERMINATED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Consumer,
    Provider,
}

/// Endpoint descriptor handed over on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAddress {
    pub endpoint_type: String,
    pub endpoint: String,
    pub endpoint_properties: BTreeMap<String, String>,
}

impl DataAddress {
    pub fn new(endpoint_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint_type: endpoint_type.into(),
            endpoint: endpoint.into(),
            endpoint_properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint_properties.insert(name.into(), value.into());
        self
    }

    /// Reads a canonical `DataAddress` node.
    pub fn from_canonical(node: &CanonicalMessage) -> Result<Self, TckError> {
        let endpoint_type = node.id_property(PROPERTY_ENDPOINT_TYPE_EXPANDED)?.to_string();
        let endpoint = node.string_property(PROPERTY_ENDPOINT_EXPANDED)?.to_string();
        let mut endpoint_properties = BTreeMap::new();
        for property in node.nodes(PROPERTY_ENDPOINT_PROPERTIES_EXPANDED) {
            endpoint_properties.insert(
                property.string_property(PROPERTY_NAME_EXPANDED)?.to_string(),
                property.string_property(PROPERTY_VALUE_EXPANDED)?.to_string(),
            );
        }
        Ok(Self {
            endpoint_type,
            endpoint,
            endpoint_properties,
        })
    }

    /// Compact wire form.
    pub fn to_message(&self) -> Value {
        let properties: Vec<(&str, &str)> = self
            .endpoint_properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        messages::data_address(&self.endpoint_type, &self.endpoint, &properties)
    }
}

/// Data written together with a transition, under the same write lock.
#[derive(Debug, Clone, Default)]
pub enum Amendment {
    #[default]
    None,
    CorrelationId(String),
    DataAddress(DataAddress),
    /// Inbound start: the sender's pid, recorded as the correlation id when
    /// none is set yet, plus the data address it carried.
    Start {
        correlation_id: String,
        data_address: Option<DataAddress>,
    },
}

impl Amendment {
    fn supplies_correlation_id(&self) -> bool {
        matches!(self, Amendment::CorrelationId(_) | Amendment::Start { .. })
    }
}

pub type TransferObserver = Arc<dyn Fn(&TransferProcess, TransferState) + Send + Sync>;

#[derive(Debug)]
struct TransferData {
    state: TransferState,
    correlation_id: Option<String>,
    data_address: Option<DataAddress>,
}

/// A transfer process from one party's point of view.
pub struct TransferProcess {
    id: String,
    kind: TransferKind,
    agreement_id: String,
    format: String,
    counter_party_id: String,
    callback_address: Option<String>,
    observers: Vec<TransferObserver>,
    data: RwLock<TransferData>,
}

impl fmt::Debug for TransferProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read_recursive();
        f.debug_struct("TransferProcess")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &data.state)
            .field("correlation_id", &data.correlation_id)
            .field("agreement_id", &self.agreement_id)
            .finish_non_exhaustive()
    }
}

impl TransferProcess {
    pub fn builder(kind: TransferKind) -> TransferProcessBuilder {
        TransferProcessBuilder::new(kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn agreement_id(&self) -> &str {
        &self.agreement_id
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn counter_party_id(&self) -> &str {
        &self.counter_party_id
    }

    pub fn callback_address(&self) -> Option<&str> {
        self.callback_address.as_deref()
    }

    pub fn state(&self) -> TransferState {
        self.data.read_recursive().state
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.data.read_recursive().correlation_id.clone()
    }

    pub fn data_address(&self) -> Option<DataAddress> {
        self.data.read_recursive().data_address.clone()
    }

    pub fn consumer_pid(&self) -> Option<String> {
        match self.kind {
            TransferKind::Consumer => Some(self.id.clone()),
            TransferKind::Provider => self.correlation_id(),
        }
    }

    pub fn provider_pid(&self) -> Option<String> {
        match self.kind {
            TransferKind::Provider => Some(self.id.clone()),
            TransferKind::Consumer => self.correlation_id(),
        }
    }

    pub fn transition(&self, to: TransferState) -> Result<(), TckError> {
        self.transition_with(to, Amendment::None, |_| {})
    }

    /// Validates and performs `state → to`. Same contract as
    /// [`crate::negotiation::Negotiation::transition_with`].
    pub fn transition_with<F>(
        &self,
        to: TransferState,
        amendment: Amendment,
        side_effect: F,
    ) -> Result<(), TckError>
    where
        F: FnOnce(&TransferProcess),
    {
        let mut data = self.data.write();
        let from = data.state;
        let correlation_set = data.correlation_id.is_some() || amendment.supplies_correlation_id();
        validate_transition(from, to, correlation_set)?;

        match amendment {
            Amendment::None => {}
            Amendment::CorrelationId(id) => data.correlation_id = Some(id),
            Amendment::DataAddress(address) => data.data_address = Some(address),
            Amendment::Start {
                correlation_id,
                data_address,
            } => {
                if data.correlation_id.is_none() {
                    data.correlation_id = Some(correlation_id);
                }
                if data_address.is_some() {
                    data.data_address = data_address;
                }
            }
        }
        data.state = to;

        let _guard = RwLockWriteGuard::downgrade(data);
        debug!(id = %self.id, from = %from, to = %to, "transfer process transitioned");
        side_effect(self);
        for observer in &self.observers {
            observer(self, from);
        }
        Ok(())
    }
}

/// Builder for [`TransferProcess`].
pub struct TransferProcessBuilder {
    kind: TransferKind,
    id: Option<String>,
    state: TransferState,
    correlation_id: Option<String>,
    agreement_id: Option<String>,
    format: Option<String>,
    counter_party_id: Option<String>,
    callback_address: Option<String>,
    data_address: Option<DataAddress>,
    observers: Vec<TransferObserver>,
}

impl TransferProcessBuilder {
    fn new(kind: TransferKind) -> Self {
        Self {
            kind,
            id: None,
            state: Initialized,
            correlation_id: None,
            agreement_id: None,
            format: None,
            counter_party_id: None,
            callback_address: None,
            data_address: None,
            observers: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn state(mut self, state: TransferState) -> Self {
        self.state = state;
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn agreement_id(mut self, agreement_id: impl Into<String>) -> Self {
        self.agreement_id = Some(agreement_id.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn counter_party_id(mut self, counter_party_id: impl Into<String>) -> Self {
        self.counter_party_id = Some(counter_party_id.into());
        self
    }

    pub fn callback_address(mut self, callback_address: impl Into<String>) -> Self {
        self.callback_address = Some(callback_address.into());
        self
    }

    pub fn data_address(mut self, data_address: DataAddress) -> Self {
        self.data_address = Some(data_address);
        self
    }

    pub fn observer(mut self, observer: TransferObserver) -> Self {
        self.observers.push(observer);
        self
    }

    /// # Contract
    /// - `agreement_id` and `format` are required.
    /// - Starting in REQUESTED or STARTED needs a correlation id.
    pub fn build(self) -> Result<TransferProcess, TckError> {
        let agreement_id = required(self.agreement_id, "agreementId")?;
        let format = required(self.format, "format")?;
        if TransferState::requires_correlation(Initialized, self.state)
            && self.correlation_id.is_none()
        {
            return Err(TckError::MissingCorrelationId(self.state.to_string()));
        }
        Ok(TransferProcess {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind: self.kind,
            agreement_id,
            format,
            counter_party_id: self.counter_party_id.unwrap_or_default(),
            callback_address: self
                .callback_address
                .map(|address| address.trim_end_matches('/').to_string()),
            observers: self.observers,
            data: RwLock::new(TransferData {
                state: self.state,
                correlation_id: self.correlation_id,
                data_address: self.data_address,
            }),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, TckError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TckError::ValidationFailure(format!("Transfer process {name} is required")))
}
