//! Canonical message model.
//!
//! A [`CanonicalMessage`] is the expanded, attribute-addressable form of a
//! wire message: every property key is a fully-qualified IRI and every value
//! is a typed [`Term`]. Repeated properties keep their wire order; nested
//! objects are nested canonical messages.
//!
//! Messages are immutable once built. Extraction helpers never panic: a
//! missing or mistyped property is a [`TckError::ValidationFailure`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::constants::{
    DSPACE_NAMESPACE, ID, PROPERTY_AGREEMENT_EXPANDED, PROPERTY_AGREEMENT_ID_EXPANDED,
    PROPERTY_CALLBACK_ADDRESS_EXPANDED, PROPERTY_CONSUMER_PID_EXPANDED,
    PROPERTY_DATA_ADDRESS_EXPANDED, PROPERTY_EVENT_TYPE_EXPANDED, PROPERTY_FORMAT_EXPANDED,
    PROPERTY_OFFER_EXPANDED, PROPERTY_PROVIDER_PID_EXPANDED, PROPERTY_STATE_EXPANDED, TYPE,
    VALUE,
};
use crate::errors::TckError;

/// A literal value with an optional datatype IRI.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: Value,
    pub datatype: Option<String>,
}

impl Literal {
    /// Plain literal.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            datatype: None,
        }
    }

    /// Literal with an explicit datatype IRI.
    pub fn typed(value: impl Into<Value>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: Some(datatype.into()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// One value of a canonical property.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Identifier reference (`@id`).
    Id(String),
    /// Literal value (`@value`).
    Literal(Literal),
    /// Nested node.
    Node(CanonicalMessage),
}

impl Term {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Term::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&CanonicalMessage> {
        match self {
            Term::Node(node) => Some(node),
            _ => None,
        }
    }

    fn to_expanded_json(&self) -> Value {
        match self {
            Term::Id(id) => {
                let mut map = Map::new();
                map.insert(ID.to_string(), Value::String(id.clone()));
                Value::Object(map)
            }
            Term::Literal(literal) => {
                let mut map = Map::new();
                map.insert(VALUE.to_string(), literal.value.clone());
                if let Some(datatype) = &literal.datatype {
                    map.insert(TYPE.to_string(), Value::String(datatype.clone()));
                }
                Value::Object(map)
            }
            Term::Node(node) => node.to_expanded_json(),
        }
    }
}

/// Expanded, attribute-addressable message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalMessage {
    id: Option<String>,
    types: Vec<String>,
    properties: BTreeMap<String, Vec<Term>>,
}

impl CanonicalMessage {
    pub fn builder() -> CanonicalBuilder {
        CanonicalBuilder::default()
    }

    /// Node identifier (`@id`), if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Expanded type IRIs (`@type`), in wire order.
    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn has_type(&self, iri: &str) -> bool {
        self.types.iter().any(|t| t == iri)
    }

    /// Compact DSP message type name, when the node is typed in the DSP namespace.
    pub fn message_type(&self) -> Option<&str> {
        self.types
            .iter()
            .find_map(|t| t.strip_prefix(DSPACE_NAMESPACE))
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.types.is_empty() && self.properties.is_empty()
    }

    /// All values of a property, in wire order.
    pub fn property(&self, iri: &str) -> Option<&[Term]> {
        self.properties.get(iri).map(Vec::as_slice)
    }

    /// Iterates `(iri, values)` pairs in IRI order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &[Term])> {
        self.properties
            .iter()
            .map(|(iri, terms)| (iri.as_str(), terms.as_slice()))
    }

    // ── Extraction ──────────────────────────────────────────────────

    /// First value of a repeated property. Fails if the property is absent
    /// or carries no values.
    pub fn first(&self, iri: &str) -> Result<&Term, TckError> {
        let terms = self
            .properties
            .get(iri)
            .ok_or_else(|| TckError::ValidationFailure(format!("Property not found: {iri}")))?;
        terms
            .first()
            .ok_or_else(|| TckError::ValidationFailure(format!("Property has no values: {iri}")))
    }

    /// Identifier-valued property.
    pub fn id_property(&self, iri: &str) -> Result<&str, TckError> {
        self.first(iri)?.as_id().ok_or_else(|| {
            TckError::ValidationFailure(format!("Property is not an identifier: {iri}"))
        })
    }

    /// Literal-valued property.
    pub fn literal_property(&self, iri: &str) -> Result<&Literal, TckError> {
        self.first(iri)?.as_literal().ok_or_else(|| {
            TckError::ValidationFailure(format!("Property is not a literal: {iri}"))
        })
    }

    /// String literal property.
    pub fn string_property(&self, iri: &str) -> Result<&str, TckError> {
        self.literal_property(iri)?.as_str().ok_or_else(|| {
            TckError::ValidationFailure(format!("Property is not a string literal: {iri}"))
        })
    }

    /// Nested-object property.
    pub fn node_property(&self, iri: &str) -> Result<&CanonicalMessage, TckError> {
        self.first(iri)?.as_node().ok_or_else(|| {
            TckError::ValidationFailure(format!("Property is not a nested object: {iri}"))
        })
    }

    /// First value at the end of a path of nested-object properties.
    pub fn nested_property(&self, path: &[&str]) -> Result<&Term, TckError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| TckError::ValidationFailure("Empty property path".to_string()))?;
        let mut node = self;
        for iri in parents {
            node = node.node_property(iri)?;
        }
        node.first(last)
    }

    /// Nested nodes of a repeated property; non-node values are skipped.
    pub fn nodes<'a>(&'a self, iri: &str) -> impl Iterator<Item = &'a CanonicalMessage> + 'a {
        self.properties
            .get(iri)
            .into_iter()
            .flatten()
            .filter_map(Term::as_node)
    }

    // ── DSP accessors ───────────────────────────────────────────────

    pub fn consumer_pid(&self) -> Result<&str, TckError> {
        self.id_property(PROPERTY_CONSUMER_PID_EXPANDED)
    }

    pub fn provider_pid(&self) -> Result<&str, TckError> {
        self.id_property(PROPERTY_PROVIDER_PID_EXPANDED)
    }

    /// Expanded state identifier, e.g. `https://w3id.org/dspace/2025/1/REQUESTED`.
    pub fn state(&self) -> Result<&str, TckError> {
        self.id_property(PROPERTY_STATE_EXPANDED)
    }

    /// State name with the DSP namespace stripped, e.g. `REQUESTED`.
    pub fn state_name(&self) -> Result<&str, TckError> {
        let state = self.state()?;
        Ok(state.strip_prefix(DSPACE_NAMESPACE).unwrap_or(state))
    }

    /// Event type name with the DSP namespace stripped, e.g. `ACCEPTED`.
    pub fn event_type(&self) -> Result<&str, TckError> {
        let event = self.id_property(PROPERTY_EVENT_TYPE_EXPANDED)?;
        Ok(event.strip_prefix(DSPACE_NAMESPACE).unwrap_or(event))
    }

    pub fn callback_address(&self) -> Result<&str, TckError> {
        self.string_property(PROPERTY_CALLBACK_ADDRESS_EXPANDED)
    }

    pub fn agreement_id(&self) -> Result<&str, TckError> {
        self.id_property(PROPERTY_AGREEMENT_ID_EXPANDED)
    }

    pub fn format(&self) -> Result<&str, TckError> {
        self.string_property(PROPERTY_FORMAT_EXPANDED)
    }

    pub fn offer(&self) -> Result<&CanonicalMessage, TckError> {
        self.node_property(PROPERTY_OFFER_EXPANDED)
    }

    pub fn agreement(&self) -> Result<&CanonicalMessage, TckError> {
        self.node_property(PROPERTY_AGREEMENT_EXPANDED)
    }

    /// Data address node; absent for pull transfers.
    pub fn data_address(&self) -> Option<&CanonicalMessage> {
        self.nodes(PROPERTY_DATA_ADDRESS_EXPANDED).next()
    }

    /// Expanded JSON-LD form. Wire-boundary escape hatch only.
    pub fn to_expanded_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(id) = &self.id {
            map.insert(ID.to_string(), Value::String(id.clone()));
        }
        if !self.types.is_empty() {
            map.insert(
                TYPE.to_string(),
                Value::Array(self.types.iter().cloned().map(Value::String).collect()),
            );
        }
        for (iri, terms) in &self.properties {
            map.insert(
                iri.clone(),
                Value::Array(terms.iter().map(Term::to_expanded_json).collect()),
            );
        }
        Value::Object(map)
    }
}

/// Builder for [`CanonicalMessage`].
#[derive(Debug, Default)]
pub struct CanonicalBuilder {
    message: CanonicalMessage,
}

impl CanonicalBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.message.id = Some(id.into());
        self
    }

    pub fn r#type(mut self, iri: impl Into<String>) -> Self {
        self.message.types.push(iri.into());
        self
    }

    /// Appends a value to a (possibly repeated) property.
    pub fn property(mut self, iri: impl Into<String>, term: Term) -> Self {
        self.message
            .properties
            .entry(iri.into())
            .or_default()
            .push(term);
        self
    }

    pub fn id_property(self, iri: impl Into<String>, id: impl Into<String>) -> Self {
        self.property(iri, Term::Id(id.into()))
    }

    pub fn literal_property(self, iri: impl Into<String>, value: impl Into<Value>) -> Self {
        self.property(iri, Term::Literal(Literal::new(value)))
    }

    pub fn build(self) -> CanonicalMessage {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        PROPERTY_DATA_ADDRESS_EXPANDED, PROPERTY_ENDPOINT_EXPANDED, PROPERTY_TARGET_EXPANDED,
    };

    fn negotiation() -> CanonicalMessage {
        CanonicalMessage::builder()
            .r#type(format!("{DSPACE_NAMESPACE}ContractNegotiation"))
            .id_property(PROPERTY_CONSUMER_PID_EXPANDED, "c-1")
            .id_property(PROPERTY_PROVIDER_PID_EXPANDED, "p-1")
            .id_property(PROPERTY_STATE_EXPANDED, format!("{DSPACE_NAMESPACE}REQUESTED"))
            .build()
    }

    #[test]
    fn dsp_accessors_read_identifier_properties() {
        let message = negotiation();
        assert_eq!(message.consumer_pid().unwrap(), "c-1");
        assert_eq!(message.provider_pid().unwrap(), "p-1");
        assert_eq!(message.state_name().unwrap(), "REQUESTED");
        assert_eq!(message.message_type(), Some("ContractNegotiation"));
    }

    #[test]
    fn missing_property_is_a_validation_failure() {
        let err = negotiation().callback_address().unwrap_err();
        assert!(matches!(err, TckError::ValidationFailure(_)));
        assert!(err.to_string().contains("callbackAddress"));
    }

    #[test]
    fn empty_repeated_property_is_a_validation_failure() {
        let mut message = negotiation();
        message
            .properties
            .insert(PROPERTY_OFFER_EXPANDED.to_string(), Vec::new());
        let err = message.offer().unwrap_err();
        assert_eq!(
            err,
            TckError::ValidationFailure(format!("Property has no values: {PROPERTY_OFFER_EXPANDED}"))
        );
    }

    #[test]
    fn mistyped_property_is_rejected() {
        let message = CanonicalMessage::builder()
            .literal_property(PROPERTY_CONSUMER_PID_EXPANDED, "c-1")
            .build();
        assert!(message.consumer_pid().is_err());
        assert_eq!(
            message.string_property(PROPERTY_CONSUMER_PID_EXPANDED).unwrap(),
            "c-1"
        );
    }

    #[test]
    fn nested_property_walks_nodes() {
        let address = CanonicalMessage::builder()
            .literal_property(PROPERTY_ENDPOINT_EXPANDED, "http://example.com")
            .build();
        let message = CanonicalMessage::builder()
            .property(PROPERTY_DATA_ADDRESS_EXPANDED, Term::Node(address))
            .build();
        let endpoint = message
            .nested_property(&[PROPERTY_DATA_ADDRESS_EXPANDED, PROPERTY_ENDPOINT_EXPANDED])
            .unwrap();
        assert_eq!(endpoint.as_literal().and_then(Literal::as_str), Some("http://example.com"));
        assert!(message
            .nested_property(&[PROPERTY_DATA_ADDRESS_EXPANDED, PROPERTY_TARGET_EXPANDED])
            .is_err());
    }

    #[test]
    fn repeated_properties_keep_wire_order() {
        let message = CanonicalMessage::builder()
            .literal_property("urn:p", "first")
            .literal_property("urn:p", "second")
            .build();
        let values: Vec<_> = message
            .property("urn:p")
            .unwrap()
            .iter()
            .filter_map(|t| t.as_literal().and_then(Literal::as_str))
            .collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[test]
    fn expanded_json_wraps_values_in_containers() {
        let json = negotiation().to_expanded_json();
        assert_eq!(json[PROPERTY_CONSUMER_PID_EXPANDED][0][ID], "c-1");
        assert_eq!(json[TYPE][0], format!("{DSPACE_NAMESPACE}ContractNegotiation"));
    }
}
