//! JSON-LD context resolution.
//!
//! [`ContextRegistry`] maps context URIs to locally bundled documents; no
//! context is ever fetched over the network. [`ActiveContext`] is the
//! processed form used by the canonicalizer for term expansion and
//! compaction.
//!
//! Supported context features are the ones DSP messages use: `@vocab`,
//! prefix terms, expanded term definitions with `@id`, `@type` coercion
//! (`@id`, `@vocab`, or a datatype IRI), and `@container: @set`.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::constants::{CONTAINER, CONTEXT, DSPACE_CONTEXT, ID, SET, TYPE, VOCAB};
use crate::errors::TckError;

const DSP_CONTEXT_DOCUMENT: &str = include_str!("../../resources/dsp-2025-1.jsonld");

/// Context documents keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    documents: HashMap<String, Value>,
}

impl ContextRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the bundled DSP 2025-1 context.
    pub fn with_dsp_context() -> Result<Self, TckError> {
        let document: Value = serde_json::from_str(DSP_CONTEXT_DOCUMENT).map_err(|e| {
            TckError::ValidationFailure(format!("Bundled context {DSPACE_CONTEXT} is invalid: {e}"))
        })?;
        let mut registry = Self::new();
        registry.register(DSPACE_CONTEXT, document);
        Ok(registry)
    }

    /// The document is the full JSON-LD file, i.e. an object carrying `@context`.
    fn register(&mut self, uri: impl Into<String>, document: Value) {
        self.documents.insert(uri.into(), document);
    }

    /// The `@context` value of a registered document.
    pub fn resolve(&self, uri: &str) -> Result<&Value, TckError> {
        let document = self
            .documents
            .get(uri)
            .ok_or_else(|| TckError::ValidationFailure(format!("Unknown context: {uri}")))?;
        document.get(CONTEXT).ok_or_else(|| {
            TckError::ValidationFailure(format!("Context document has no @context: {uri}"))
        })
    }
}

/// Value coercion declared by a term definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    /// `"@type": "@id"`: strings are document-relative identifiers.
    Id,
    /// `"@type": "@vocab"`: strings are vocabulary-relative identifiers.
    Vocab,
    /// `"@type": "<iri>"`: strings are typed literals.
    Datatype(String),
}

/// A processed term definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDefinition {
    pub iri: String,
    pub coercion: Option<Coercion>,
    pub set_container: bool,
}

impl TermDefinition {
    fn simple(iri: String) -> Self {
        Self {
            iri,
            coercion: None,
            set_container: false,
        }
    }

    /// Prefix terms are simple definitions whose IRI ends in a gen-delim.
    fn is_prefix(&self) -> bool {
        self.coercion.is_none()
            && !self.set_container
            && (self.iri.ends_with('/') || self.iri.ends_with('#'))
    }
}

/// Processed context used for expansion and compaction.
#[derive(Debug, Clone, Default)]
pub struct ActiveContext {
    vocab: Option<String>,
    terms: BTreeMap<String, TermDefinition>,
}

impl ActiveContext {
    /// Active context for a `@context` value (URI, inline object, or array).
    pub fn from_context(registry: &ContextRegistry, context: &Value) -> Result<Self, TckError> {
        let mut active = Self::default();
        active.merge(registry, context)?;
        Ok(active)
    }

    /// Processes a `@context` value on top of this context.
    pub fn merge(&mut self, registry: &ContextRegistry, context: &Value) -> Result<(), TckError> {
        match context {
            Value::Null => {
                *self = Self::default();
                Ok(())
            }
            Value::String(uri) => {
                let inner = registry.resolve(uri)?;
                self.merge(registry, inner)
            }
            Value::Array(items) => items
                .iter()
                .try_for_each(|item| self.merge(registry, item)),
            Value::Object(definitions) => self.define_all(definitions),
            other => Err(TckError::ValidationFailure(format!(
                "Invalid @context entry: {other}"
            ))),
        }
    }

    fn define_all(&mut self, definitions: &Map<String, Value>) -> Result<(), TckError> {
        // Absolute prefixes first so compact IRIs in the same object resolve
        // regardless of key order.
        for (term, definition) in definitions {
            if let Value::String(iri) = definition {
                let prefix_shaped = iri.ends_with('/') || iri.ends_with('#');
                if !term.starts_with('@') && prefix_shaped && is_absolute(iri) {
                    self.terms
                        .insert(term.clone(), TermDefinition::simple(iri.clone()));
                }
            }
        }

        if let Some(vocab) = definitions.get(VOCAB) {
            self.vocab = match vocab {
                Value::String(v) => self.expand_iri(v, false),
                Value::Null => None,
                other => {
                    return Err(TckError::ValidationFailure(format!(
                        "Invalid @vocab: {other}"
                    )))
                }
            };
        }

        for (term, definition) in definitions {
            if term.starts_with('@') {
                continue;
            }
            match definition {
                Value::Null => {
                    self.terms.remove(term);
                }
                Value::String(iri) => {
                    let iri = self.expand_definition_iri(term, iri)?;
                    self.terms.insert(term.clone(), TermDefinition::simple(iri));
                }
                Value::Object(expanded) => {
                    let definition = self.expanded_definition(term, expanded)?;
                    self.terms.insert(term.clone(), definition);
                }
                other => {
                    return Err(TckError::ValidationFailure(format!(
                        "Invalid definition for term {term}: {other}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn expanded_definition(
        &self,
        term: &str,
        definition: &Map<String, Value>,
    ) -> Result<TermDefinition, TckError> {
        let iri = match definition.get(ID).and_then(Value::as_str) {
            Some(id) => self.expand_definition_iri(term, id)?,
            None => self.expand_definition_iri(term, term)?,
        };
        let coercion = match definition.get(TYPE).and_then(Value::as_str) {
            None => None,
            Some(ID) => Some(Coercion::Id),
            Some(VOCAB) => Some(Coercion::Vocab),
            Some(datatype) => Some(Coercion::Datatype(
                self.expand_definition_iri(term, datatype)?,
            )),
        };
        let set_container = match definition.get(CONTAINER) {
            Some(Value::String(container)) => container == SET,
            Some(Value::Array(containers)) => containers.iter().any(|c| c == SET),
            _ => false,
        };
        Ok(TermDefinition {
            iri,
            coercion,
            set_container,
        })
    }

    fn expand_definition_iri(&self, term: &str, value: &str) -> Result<String, TckError> {
        self.expand_iri(value, true)
            .filter(|iri| is_absolute(iri))
            .ok_or_else(|| {
                TckError::ValidationFailure(format!("Term {term} does not expand to an IRI"))
            })
    }

    pub fn vocab(&self) -> Option<&str> {
        self.vocab.as_deref()
    }

    pub fn term(&self, name: &str) -> Option<&TermDefinition> {
        self.terms.get(name)
    }

    /// Expands a term, compact IRI, or absolute IRI.
    ///
    /// `vocab_relative` selects term and `@vocab` resolution (property keys,
    /// `@type` values). Document-relative values (`@id`) only resolve
    /// prefixes and are otherwise returned unchanged. Returns `None` when a
    /// vocabulary-relative value cannot be resolved.
    pub fn expand_iri(&self, value: &str, vocab_relative: bool) -> Option<String> {
        if vocab_relative {
            if let Some(definition) = self.terms.get(value) {
                return Some(definition.iri.clone());
            }
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if !suffix.starts_with("//") {
                if let Some(definition) = self.terms.get(prefix).filter(|d| d.is_prefix()) {
                    return Some(format!("{}{}", definition.iri, suffix));
                }
            }
            return Some(value.to_string());
        }
        if vocab_relative {
            return self.vocab.as_ref().map(|vocab| format!("{vocab}{value}"));
        }
        Some(value.to_string())
    }

    /// Compacts an IRI: a matching simple term, then a `@vocab`-relative
    /// name, then the longest matching prefix. Document-relative IRIs only
    /// use prefixes.
    pub fn compact_iri(&self, iri: &str, vocab_relative: bool) -> String {
        if vocab_relative {
            if let Some((name, _)) = self.terms.iter().find(|(name, d)| {
                d.iri == iri && d.coercion.is_none() && !d.set_container && !name.contains(':')
            }) {
                return name.clone();
            }
            if let Some(suffix) = self.vocab.as_deref().and_then(|v| iri.strip_prefix(v)) {
                let shadowed = self.terms.get(suffix).is_some_and(|d| d.iri != iri);
                if !suffix.is_empty() && !suffix.contains(':') && !shadowed {
                    return suffix.to_string();
                }
            }
        }
        self.terms
            .iter()
            .filter(|(_, d)| d.is_prefix() && iri.len() > d.iri.len() && iri.starts_with(&d.iri))
            .max_by_key(|(_, d)| d.iri.len())
            .map(|(prefix, d)| format!("{prefix}:{}", &iri[d.iri.len()..]))
            .unwrap_or_else(|| iri.to_string())
    }

    /// Terms defined for an IRI, in name order.
    pub fn terms_for<'a>(
        &'a self,
        iri: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a TermDefinition)> + 'a {
        self.terms
            .iter()
            .filter(move |(name, d)| d.iri == iri && !name.contains(':'))
            .map(|(name, d)| (name.as_str(), d))
    }
}

fn is_absolute(iri: &str) -> bool {
    iri.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        DSPACE_NAMESPACE, PROPERTY_CONSUMER_PID_EXPANDED, PROPERTY_REASON_EXPANDED,
        PROPERTY_STATE_EXPANDED, PROPERTY_TIMESTAMP_EXPANDED, XSD_NAMESPACE,
    };
    use serde_json::json;

    fn dsp() -> ActiveContext {
        let registry = ContextRegistry::with_dsp_context().unwrap();
        ActiveContext::from_context(&registry, &json!([DSPACE_CONTEXT])).unwrap()
    }

    #[test]
    fn bundled_context_parses() {
        let registry = ContextRegistry::with_dsp_context().unwrap();
        assert!(registry.resolve(DSPACE_CONTEXT).unwrap().is_object());
    }

    #[test]
    fn unknown_context_uri_is_rejected() {
        let registry = ContextRegistry::with_dsp_context().unwrap();
        let err = ActiveContext::from_context(&registry, &json!("https://example.com/ctx.jsonld"))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown context"));
    }

    #[test]
    fn dsp_terms_carry_coercions() {
        let active = dsp();
        let consumer = active.term("consumerPid").unwrap();
        assert_eq!(consumer.iri, PROPERTY_CONSUMER_PID_EXPANDED);
        assert_eq!(consumer.coercion, Some(Coercion::Id));
        assert_eq!(active.term("state").unwrap().iri, PROPERTY_STATE_EXPANDED);
        assert_eq!(active.term("state").unwrap().coercion, Some(Coercion::Vocab));
        assert!(active.term("reason").unwrap().set_container);
        assert_eq!(active.term("reason").unwrap().iri, PROPERTY_REASON_EXPANDED);
        assert_eq!(
            active.term("timestamp").unwrap().coercion,
            Some(Coercion::Datatype(format!("{XSD_NAMESPACE}dateTime")))
        );
        assert_eq!(active.term("timestamp").unwrap().iri, PROPERTY_TIMESTAMP_EXPANDED);
    }

    #[test]
    fn expansion_resolves_terms_prefixes_and_vocab() {
        let active = dsp();
        assert_eq!(
            active.expand_iri("REQUESTED", true).unwrap(),
            format!("{DSPACE_NAMESPACE}REQUESTED")
        );
        assert_eq!(
            active.expand_iri("dspace:custom", true).unwrap(),
            format!("{DSPACE_NAMESPACE}custom")
        );
        assert_eq!(
            active.expand_iri("undefinedTerm", true).unwrap(),
            format!("{DSPACE_NAMESPACE}undefinedTerm")
        );
        assert_eq!(active.expand_iri("http://example.com/x", true).unwrap(), "http://example.com/x");
        assert_eq!(active.expand_iri("urn:uuid:1234", false).unwrap(), "urn:uuid:1234");
        assert_eq!(active.expand_iri("plain-id", false).unwrap(), "plain-id");
    }

    #[test]
    fn without_vocab_unknown_terms_do_not_expand() {
        let registry = ContextRegistry::new();
        let active =
            ActiveContext::from_context(&registry, &json!({ "ex": "http://example.com/" })).unwrap();
        assert!(active.expand_iri("unknown", true).is_none());
        assert_eq!(active.expand_iri("ex:a", true).unwrap(), "http://example.com/a");
    }

    #[test]
    fn compaction_prefers_terms_then_vocab_then_prefix() {
        let active = dsp();
        assert_eq!(active.compact_iri(&format!("{DSPACE_NAMESPACE}AGREED"), true), "AGREED");
        assert_eq!(active.compact_iri(&format!("{DSPACE_NAMESPACE}somethingElse"), true), "somethingElse");
        assert_eq!(active.compact_iri("http://www.w3.org/ns/odrl/2/prohibition", true), "odrl:prohibition");
        assert_eq!(active.compact_iri("plain-id", false), "plain-id");
    }

    #[test]
    fn null_context_resets() {
        let registry = ContextRegistry::with_dsp_context().unwrap();
        let active =
            ActiveContext::from_context(&registry, &json!([DSPACE_CONTEXT, null])).unwrap();
        assert!(active.vocab().is_none());
        assert!(active.term("consumerPid").is_none());
    }
}
