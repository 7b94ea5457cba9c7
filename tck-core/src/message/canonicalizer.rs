//! Wire ⇄ canonical conversion.
//!
//! ## Inbound
//!
//! [`Canonicalizer::canonicalize`] validates the compact document against
//! its message-type schema, then expands it against the declared
//! `@context` (resolved from the [`ContextRegistry`]). Terms that do not
//! expand to an absolute IRI are dropped, as in JSON-LD expansion.
//!
//! ## Outbound
//!
//! [`Canonicalizer::serialize`] compacts a canonical message against the DSP
//! context and validates the result before it leaves the process.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::trace;

use crate::constants::{CONTEXT, DSPACE_CONTEXT, ID, TYPE, VALUE};
use crate::errors::TckError;
use crate::message::canonical::{CanonicalMessage, Literal, Term};
use crate::message::context::{ActiveContext, Coercion, ContextRegistry, TermDefinition};
use crate::message::schema::SchemaRegistry;

/// Converts between compact wire JSON and [`CanonicalMessage`].
///
/// Cheap to share: both registries sit behind `Arc` and are read-only.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    contexts: Arc<ContextRegistry>,
    schemas: Arc<SchemaRegistry>,
    compact_context: Value,
    compact_active: ActiveContext,
}

impl Canonicalizer {
    pub fn new(
        contexts: Arc<ContextRegistry>,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self, TckError> {
        let compact_context = json!([DSPACE_CONTEXT]);
        let compact_active = ActiveContext::from_context(&contexts, &compact_context)?;
        Ok(Self {
            contexts,
            schemas,
            compact_context,
            compact_active,
        })
    }

    /// Canonicalizer over the bundled DSP context and message schemas.
    pub fn dsp() -> Result<Self, TckError> {
        Self::new(
            Arc::new(ContextRegistry::with_dsp_context()?),
            Arc::new(SchemaRegistry::with_dsp_schemas()?),
        )
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Validates and expands a compact wire document.
    pub fn canonicalize(&self, document: &Value) -> Result<CanonicalMessage, TckError> {
        let object = document.as_object().ok_or_else(|| {
            TckError::ValidationFailure("Invalid JSON-LD document: expected an object".to_string())
        })?;
        self.schemas.validate(document)?;

        let message = self.expand_node(&ActiveContext::default(), object)?;
        if message.is_empty() {
            return Err(TckError::ValidationFailure(
                "Invalid JSON-LD document: expanded to an empty node".to_string(),
            ));
        }
        Ok(message)
    }

    fn expand_node(
        &self,
        parent: &ActiveContext,
        object: &Map<String, Value>,
    ) -> Result<CanonicalMessage, TckError> {
        let scoped;
        let active = match object.get(CONTEXT) {
            Some(context) => {
                let mut local = parent.clone();
                local.merge(&self.contexts, context)?;
                scoped = local;
                &scoped
            }
            None => parent,
        };

        let mut builder = CanonicalMessage::builder();
        for (key, value) in object {
            match key.as_str() {
                CONTEXT => {}
                ID => {
                    let id = value.as_str().ok_or_else(|| {
                        TckError::ValidationFailure(format!("@id must be a string: {value}"))
                    })?;
                    let id = active.expand_iri(id, false).unwrap_or_else(|| id.to_string());
                    builder = builder.id(id);
                }
                TYPE => {
                    for name in type_names(value)? {
                        let iri = active.expand_iri(name, true).ok_or_else(|| {
                            TckError::ValidationFailure(format!("Undefined type: {name}"))
                        })?;
                        builder = builder.r#type(iri);
                    }
                }
                keyword if keyword.starts_with('@') => {}
                term => {
                    let Some(iri) = active.expand_iri(term, true).filter(|iri| iri.contains(':'))
                    else {
                        trace!(term, "dropping undefined term");
                        continue;
                    };
                    let definition = active.term(term);
                    for expanded in self.expand_values(active, definition, value)? {
                        builder = builder.property(iri.clone(), expanded);
                    }
                }
            }
        }
        Ok(builder.build())
    }

    fn expand_values(
        &self,
        active: &ActiveContext,
        definition: Option<&TermDefinition>,
        value: &Value,
    ) -> Result<Vec<Term>, TckError> {
        match value {
            Value::Array(items) => {
                let mut terms = Vec::with_capacity(items.len());
                for item in items {
                    terms.extend(self.expand_values(active, definition, item)?);
                }
                Ok(terms)
            }
            other => Ok(self.expand_value(active, definition, other)?.into_iter().collect()),
        }
    }

    fn expand_value(
        &self,
        active: &ActiveContext,
        definition: Option<&TermDefinition>,
        value: &Value,
    ) -> Result<Option<Term>, TckError> {
        let coercion = definition.and_then(|d| d.coercion.as_ref());
        let term = match value {
            Value::Null => return Ok(None),
            Value::Object(map) if map.contains_key(VALUE) => {
                let literal = &map[VALUE];
                if literal.is_null() {
                    return Ok(None);
                }
                let datatype = map
                    .get(TYPE)
                    .and_then(Value::as_str)
                    .and_then(|t| active.expand_iri(t, true));
                Term::Literal(Literal {
                    value: literal.clone(),
                    datatype,
                })
            }
            Value::Object(map) if map.len() == 1 && map.contains_key(ID) => {
                let id = map[ID].as_str().ok_or_else(|| {
                    TckError::ValidationFailure(format!("@id must be a string: {}", map[ID]))
                })?;
                Term::Id(active.expand_iri(id, false).unwrap_or_else(|| id.to_string()))
            }
            Value::Object(map) => Term::Node(self.expand_node(active, map)?),
            Value::String(s) => match coercion {
                Some(Coercion::Id) => {
                    Term::Id(active.expand_iri(s, false).unwrap_or_else(|| s.clone()))
                }
                Some(Coercion::Vocab) => {
                    Term::Id(active.expand_iri(s, true).unwrap_or_else(|| s.clone()))
                }
                Some(Coercion::Datatype(datatype)) => {
                    Term::Literal(Literal::typed(s.clone(), datatype.clone()))
                }
                None => Term::Literal(Literal::new(s.clone())),
            },
            scalar => Term::Literal(Literal {
                value: scalar.clone(),
                datatype: match coercion {
                    Some(Coercion::Datatype(datatype)) => Some(datatype.clone()),
                    _ => None,
                },
            }),
        };
        Ok(Some(term))
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Compacts a canonical message against the DSP context and validates it.
    pub fn serialize(&self, message: &CanonicalMessage) -> Result<Value, TckError> {
        let mut object = self.compact_node(message);
        object.insert(CONTEXT.to_string(), self.compact_context.clone());
        let document = Value::Object(object);
        self.schemas.validate(&document)?;
        Ok(document)
    }

    fn compact_node(&self, node: &CanonicalMessage) -> Map<String, Value> {
        let active = &self.compact_active;
        let mut object = Map::new();
        if let Some(id) = node.id() {
            object.insert(ID.to_string(), Value::String(active.compact_iri(id, false)));
        }
        match node.types() {
            [] => {}
            [single] => {
                object.insert(TYPE.to_string(), Value::String(active.compact_iri(single, true)));
            }
            many => {
                let types = many
                    .iter()
                    .map(|t| Value::String(active.compact_iri(t, true)))
                    .collect();
                object.insert(TYPE.to_string(), Value::Array(types));
            }
        }
        for (iri, terms) in node.properties() {
            let (key, definition) = match select_term(active, iri, terms.first()) {
                Some((name, definition)) => (name.to_string(), Some(definition)),
                None => (active.compact_iri(iri, true), None),
            };
            let mut values: Vec<Value> = terms
                .iter()
                .map(|term| self.compact_term(definition, term))
                .collect();
            let as_set = definition.is_some_and(|d| d.set_container);
            let value = if values.len() == 1 && !as_set {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            object.insert(key, value);
        }
        object
    }

    fn compact_term(&self, definition: Option<&TermDefinition>, term: &Term) -> Value {
        let active = &self.compact_active;
        let coercion = definition.and_then(|d| d.coercion.as_ref());
        match term {
            Term::Id(iri) => match coercion {
                Some(Coercion::Id) => Value::String(active.compact_iri(iri, false)),
                Some(Coercion::Vocab) => Value::String(active.compact_iri(iri, true)),
                _ => json!({ ID: active.compact_iri(iri, false) }),
            },
            Term::Literal(literal) => match (&literal.datatype, coercion) {
                (Some(datatype), Some(Coercion::Datatype(coerced))) if datatype == coerced => {
                    literal.value.clone()
                }
                (None, None) => literal.value.clone(),
                (None, Some(_)) => json!({ VALUE: literal.value }),
                (Some(datatype), _) => json!({
                    VALUE: literal.value,
                    TYPE: active.compact_iri(datatype, true),
                }),
            },
            Term::Node(node) => Value::Object(self.compact_node(node)),
        }
    }
}

fn type_names(value: &Value) -> Result<Vec<&str>, TckError> {
    match value {
        Value::String(name) => Ok(vec![name.as_str()]),
        Value::Array(names) => names
            .iter()
            .map(|n| {
                n.as_str().ok_or_else(|| {
                    TckError::ValidationFailure(format!("@type entries must be strings: {n}"))
                })
            })
            .collect(),
        other => Err(TckError::ValidationFailure(format!(
            "@type must be a string or array: {other}"
        ))),
    }
}

/// Picks the term for a property IRI whose coercion fits the first value.
fn select_term<'a>(
    active: &'a ActiveContext,
    iri: &'a str,
    first: Option<&Term>,
) -> Option<(&'a str, &'a TermDefinition)> {
    let fits = |definition: &TermDefinition| match (first, &definition.coercion) {
        (Some(Term::Id(_)), Some(Coercion::Id | Coercion::Vocab)) => true,
        (Some(Term::Literal(l)), Some(Coercion::Datatype(dt))) => l.datatype.as_ref() == Some(dt),
        (Some(Term::Literal(l)), None) => l.datatype.is_none(),
        (Some(Term::Node(_)), None) | (None, _) => true,
        _ => false,
    };
    let mut candidates = active.terms_for(iri).peekable();
    let fallback = candidates.peek().copied();
    active
        .terms_for(iri)
        .find(|(_, definition)| fits(definition))
        .or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        DSPACE_NAMESPACE, PROPERTY_CALLBACK_ADDRESS_EXPANDED, PROPERTY_REASON_EXPANDED,
        PROPERTY_TARGET_EXPANDED, PROPERTY_TIMESTAMP_EXPANDED, XSD_NAMESPACE,
    };

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::dsp().unwrap()
    }

    fn request() -> Value {
        json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "ContractRequestMessage",
            "@id": "urn:uuid:0001",
            "consumerPid": "urn:uuid:consumer",
            "offer": {
                "@type": "Offer",
                "@id": "CD123:ACN0101:456",
                "target": "ACN0101"
            },
            "callbackAddress": "https://consumer.example.com/callback"
        })
    }

    #[test]
    fn expands_terms_and_coercions() {
        let message = canonicalizer().canonicalize(&request()).unwrap();
        assert!(message.has_type(&format!("{DSPACE_NAMESPACE}ContractRequestMessage")));
        assert_eq!(message.id(), Some("urn:uuid:0001"));
        assert_eq!(message.consumer_pid().unwrap(), "urn:uuid:consumer");
        assert_eq!(
            message.callback_address().unwrap(),
            "https://consumer.example.com/callback"
        );
        let offer = message.offer().unwrap();
        assert_eq!(offer.id(), Some("CD123:ACN0101:456"));
        assert_eq!(offer.id_property(PROPERTY_TARGET_EXPANDED).unwrap(), "ACN0101");
    }

    #[test]
    fn prefixed_and_absolute_keys_expand_to_the_same_iri() {
        let mut document = request();
        let object = document.as_object_mut().unwrap();
        let address = object.remove("callbackAddress").unwrap();
        object.insert("dspace:callbackAddress".to_string(), address);
        let message = canonicalizer().canonicalize(&document).unwrap();
        assert!(message.property(PROPERTY_CALLBACK_ADDRESS_EXPANDED).is_some());
    }

    #[test]
    fn vocab_coerced_state_expands_to_namespace_iri() {
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "ContractNegotiation",
            "providerPid": "p-1",
            "consumerPid": "c-1",
            "state": "REQUESTED"
        });
        let message = canonicalizer().canonicalize(&document).unwrap();
        assert_eq!(message.state().unwrap(), format!("{DSPACE_NAMESPACE}REQUESTED"));
        assert_eq!(message.state_name().unwrap(), "REQUESTED");
    }

    #[test]
    fn schema_failure_is_a_validation_failure() {
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "ContractAgreementVerificationMessage",
            "consumerPid": "c-1"
        });
        let err = canonicalizer().canonicalize(&document).unwrap_err();
        assert!(matches!(err, TckError::ValidationFailure(_)));
    }

    #[test]
    fn unknown_context_is_a_validation_failure() {
        let mut document = request();
        document["@context"] = json!(["https://unknown.example.com/context.jsonld"]);
        let err = canonicalizer().canonicalize(&document).unwrap_err();
        assert!(err.to_string().contains("Unknown context"));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(canonicalizer().canonicalize(&json!([1, 2])).is_err());
        assert!(canonicalizer().canonicalize(&json!({})).is_err());
    }

    #[test]
    fn serialize_compacts_against_dsp_context() {
        let c = canonicalizer();
        let message = c.canonicalize(&request()).unwrap();
        let compact = c.serialize(&message).unwrap();
        assert_eq!(compact["@context"], json!([DSPACE_CONTEXT]));
        assert_eq!(compact["@type"], "ContractRequestMessage");
        assert_eq!(compact["consumerPid"], "urn:uuid:consumer");
        assert_eq!(compact["offer"]["@type"], "Offer");
        assert_eq!(compact["offer"]["target"], "ACN0101");
        assert_eq!(c.canonicalize(&compact).unwrap(), message);
    }

    #[test]
    fn set_containers_compact_to_arrays() {
        let c = canonicalizer();
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "TransferTerminationMessage",
            "providerPid": "p-1",
            "consumerPid": "c-1",
            "code": "1",
            "reason": { "message": "only one" }
        });
        let message = c.canonicalize(&document).unwrap();
        assert_eq!(message.property(PROPERTY_REASON_EXPANDED).unwrap().len(), 1);
        let compact = c.serialize(&message).unwrap();
        assert!(compact["reason"].is_array());
        assert_eq!(compact["reason"][0]["message"], "only one");
    }

    #[test]
    fn typed_literals_round_trip_through_coercion() {
        let c = canonicalizer();
        let message = CanonicalMessage::builder()
            .r#type(format!("{DSPACE_NAMESPACE}Agreement"))
            .property(
                PROPERTY_TIMESTAMP_EXPANDED,
                Term::Literal(Literal::typed(
                    "2026-01-01T00:00:00Z",
                    format!("{XSD_NAMESPACE}dateTime"),
                )),
            )
            .build();
        let compact = c.serialize(&message).unwrap();
        assert_eq!(compact["timestamp"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn undefined_terms_without_vocab_are_dropped() {
        let c = canonicalizer();
        let document = json!({
            "@context": [DSPACE_CONTEXT, { "@vocab": null }],
            "@type": "TransferCompletionMessage",
            "providerPid": "p-1",
            "consumerPid": "c-1",
            "vendorExtension": "ignored"
        });
        let message = c.canonicalize(&document).unwrap();
        assert!(message
            .properties()
            .all(|(iri, _)| !iri.ends_with("vendorExtension")));
        assert_eq!(message.provider_pid().unwrap(), "p-1");
    }
}
