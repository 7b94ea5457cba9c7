//! Structural validation of compacted DSP messages.
//!
//! One JSON Schema (draft 2020-12) per message type, selected by the
//! document's compact `@type`. Documents whose type has no registered schema
//! pass through unvalidated; expansion is the authority on content.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{json, Value};

use crate::constants::{
    CONTEXT, CONTRACT_AGREEMENT_MESSAGE, CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
    CONTRACT_NEGOTIATION, CONTRACT_NEGOTIATION_EVENT_MESSAGE,
    CONTRACT_NEGOTIATION_TERMINATION_MESSAGE, CONTRACT_OFFER_MESSAGE, CONTRACT_REQUEST_MESSAGE,
    EVENT_ACCEPTED, EVENT_FINALIZED, PROPERTY_AGREEMENT, PROPERTY_AGREEMENT_ID,
    PROPERTY_CALLBACK_ADDRESS, PROPERTY_CONSUMER_PID, PROPERTY_EVENT_TYPE, PROPERTY_FORMAT,
    PROPERTY_OFFER, PROPERTY_PROVIDER_PID, PROPERTY_STATE, TRANSFER_COMPLETION_MESSAGE,
    TRANSFER_PROCESS, TRANSFER_REQUEST_MESSAGE, TRANSFER_START_MESSAGE,
    TRANSFER_SUSPENSION_MESSAGE, TRANSFER_TERMINATION_MESSAGE, TYPE,
};
use crate::errors::TckError;

/// Required compact properties per DSP message type.
const DSP_REQUIRED_PROPERTIES: [(&str, &[&str]); 13] = [
    (CONTRACT_REQUEST_MESSAGE, &[PROPERTY_CONSUMER_PID, PROPERTY_OFFER]),
    (CONTRACT_OFFER_MESSAGE, &[PROPERTY_PROVIDER_PID, PROPERTY_OFFER]),
    (
        CONTRACT_AGREEMENT_MESSAGE,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID, PROPERTY_AGREEMENT],
    ),
    (
        CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID],
    ),
    (
        CONTRACT_NEGOTIATION_EVENT_MESSAGE,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID, PROPERTY_EVENT_TYPE],
    ),
    (
        CONTRACT_NEGOTIATION_TERMINATION_MESSAGE,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID],
    ),
    (
        CONTRACT_NEGOTIATION,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID, PROPERTY_STATE],
    ),
    (
        TRANSFER_REQUEST_MESSAGE,
        &[
            PROPERTY_CONSUMER_PID,
            PROPERTY_AGREEMENT_ID,
            PROPERTY_FORMAT,
            PROPERTY_CALLBACK_ADDRESS,
        ],
    ),
    (TRANSFER_START_MESSAGE, &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID]),
    (TRANSFER_COMPLETION_MESSAGE, &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID]),
    (TRANSFER_SUSPENSION_MESSAGE, &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID]),
    (TRANSFER_TERMINATION_MESSAGE, &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID]),
    (
        TRANSFER_PROCESS,
        &[PROPERTY_PROVIDER_PID, PROPERTY_CONSUMER_PID, PROPERTY_STATE],
    ),
];

/// Compiled validators keyed by compact message type.
#[derive(Default)]
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.validators.keys().collect();
        types.sort();
        f.debug_struct("SchemaRegistry").field("types", &types).finish()
    }
}

impl SchemaRegistry {
    /// Registry with no schemas; every document passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a structural schema for each of the 13 DSP message types.
    pub fn with_dsp_schemas() -> Result<Self, TckError> {
        let mut registry = Self::new();
        for (message_type, required) in DSP_REQUIRED_PROPERTIES {
            registry.register(message_type, &dsp_schema(message_type, required))?;
        }
        Ok(registry)
    }

    /// Compiles and registers a schema for a compact message type.
    pub fn register(&mut self, message_type: &str, schema: &Value) -> Result<(), TckError> {
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| {
                TckError::ValidationFailure(format!(
                    "Failed to compile schema for {message_type}: {e}"
                ))
            })?;
        self.validators.insert(message_type.to_string(), validator);
        Ok(())
    }

    pub fn has_schema(&self, message_type: &str) -> bool {
        self.validators.contains_key(message_type)
    }

    /// Validates a compacted document against the schema for its `@type`.
    pub fn validate(&self, document: &Value) -> Result<(), TckError> {
        let Some(message_type) = document.get(TYPE).and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(validator) = self.validators.get(message_type) else {
            return Ok(());
        };
        let errors: Vec<String> = validator
            .iter_errors(document)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TckError::ValidationFailure(format!(
                "{message_type} failed schema validation: {}",
                errors.join("; ")
            )))
        }
    }
}

fn dsp_schema(message_type: &str, required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(TYPE.to_string(), json!({ "const": message_type }));
    properties.insert(
        CONTEXT.to_string(),
        json!({ "type": ["string", "array", "object"] }),
    );
    for pid in [PROPERTY_CONSUMER_PID, PROPERTY_PROVIDER_PID, PROPERTY_AGREEMENT_ID] {
        properties.insert(pid.to_string(), json!({ "type": "string", "minLength": 1 }));
    }
    properties.insert(
        PROPERTY_CALLBACK_ADDRESS.to_string(),
        json!({ "type": "string", "minLength": 1 }),
    );
    if message_type == CONTRACT_NEGOTIATION_EVENT_MESSAGE {
        properties.insert(
            PROPERTY_EVENT_TYPE.to_string(),
            json!({ "enum": [EVENT_ACCEPTED, EVENT_FINALIZED] }),
        );
    }

    let mut all_required = vec![CONTEXT, TYPE];
    all_required.extend_from_slice(required);

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": all_required,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DSPACE_CONTEXT, DSP_MESSAGE_TYPES};

    #[test]
    fn every_dsp_message_type_has_a_schema() {
        let registry = SchemaRegistry::with_dsp_schemas().unwrap();
        for message_type in DSP_MESSAGE_TYPES {
            assert!(registry.has_schema(message_type), "missing schema: {message_type}");
        }
    }

    #[test]
    fn valid_verification_passes() {
        let registry = SchemaRegistry::with_dsp_schemas().unwrap();
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
            "providerPid": "p-1",
            "consumerPid": "c-1",
        });
        registry.validate(&document).unwrap();
    }

    #[test]
    fn missing_required_property_fails() {
        let registry = SchemaRegistry::with_dsp_schemas().unwrap();
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": TRANSFER_START_MESSAGE,
            "consumerPid": "c-1",
        });
        let err = registry.validate(&document).unwrap_err();
        assert!(matches!(err, TckError::ValidationFailure(_)));
        assert!(err.to_string().contains(TRANSFER_START_MESSAGE));
    }

    #[test]
    fn unknown_event_type_fails() {
        let registry = SchemaRegistry::with_dsp_schemas().unwrap();
        let document = json!({
            "@context": [DSPACE_CONTEXT],
            "@type": CONTRACT_NEGOTIATION_EVENT_MESSAGE,
            "providerPid": "p-1",
            "consumerPid": "c-1",
            "eventType": "REJECTED",
        });
        assert!(registry.validate(&document).is_err());
    }

    #[test]
    fn untyped_and_unregistered_documents_pass() {
        let registry = SchemaRegistry::with_dsp_schemas().unwrap();
        registry.validate(&json!({ "foo": "bar" })).unwrap();
        registry
            .validate(&json!({ "@type": "CatalogRequestMessage" }))
            .unwrap();
    }
}
