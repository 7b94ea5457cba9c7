//! Compact wire-message builders.
//!
//! Every builder returns a compact JSON-LD document carrying a fresh
//! `@id` (UUID v4), its `@type`, and the DSP `@context`. Documents are
//! canonicalized before any internal use; builders never produce
//! [`CanonicalMessage`](crate::message::CanonicalMessage) directly.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::constants::{
    AGREEMENT_TYPE, CONTEXT, CONTRACT_AGREEMENT_MESSAGE, CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
    CONTRACT_NEGOTIATION, CONTRACT_NEGOTIATION_EVENT_MESSAGE,
    CONTRACT_NEGOTIATION_TERMINATION_MESSAGE, CONTRACT_OFFER_MESSAGE, CONTRACT_REQUEST_MESSAGE,
    DATA_ADDRESS_TYPE, DSPACE_CONTEXT, ENDPOINT_PROPERTY_TYPE, EVENT_ACCEPTED, EVENT_FINALIZED,
    HTTP_ENDPOINT_TYPE, ID, OFFER_TYPE, TRANSFER_COMPLETION_MESSAGE, TRANSFER_PROCESS,
    TRANSFER_REQUEST_MESSAGE, TRANSFER_START_MESSAGE, TRANSFER_SUSPENSION_MESSAGE,
    TRANSFER_TERMINATION_MESSAGE, TYPE,
};

/// Default endpoint used in pull data addresses.
pub const DEFAULT_ENDPOINT: &str = "http://example.com";

fn envelope(message_type: &str, fields: Value) -> Value {
    let mut object = Map::new();
    object.insert(CONTEXT.to_string(), json!([DSPACE_CONTEXT]));
    object.insert(ID.to_string(), Value::String(Uuid::new_v4().to_string()));
    object.insert(TYPE.to_string(), Value::String(message_type.to_string()));
    if let Value::Object(fields) = fields {
        object.extend(fields);
    }
    Value::Object(object)
}

fn reasons(reasons: &[&str]) -> Value {
    Value::Array(reasons.iter().map(|r| json!({ "message": r })).collect())
}

// ── Negotiation ─────────────────────────────────────────────────────

/// Initial consumer request for an offer.
pub fn contract_request(
    consumer_pid: &str,
    offer_id: &str,
    dataset_id: &str,
    callback_address: &str,
) -> Value {
    envelope(
        CONTRACT_REQUEST_MESSAGE,
        json!({
            "consumerPid": consumer_pid,
            "offer": { "@id": offer_id, "@type": OFFER_TYPE, "target": dataset_id },
            "callbackAddress": callback_address,
        }),
    )
}

/// Consumer counter-request on an existing negotiation.
pub fn counter_request(
    provider_pid: &str,
    consumer_pid: &str,
    offer_id: &str,
    dataset_id: &str,
    callback_address: &str,
) -> Value {
    let mut message = contract_request(consumer_pid, offer_id, dataset_id, callback_address);
    message["providerPid"] = Value::String(provider_pid.to_string());
    message
}

/// Provider offer (or counter-offer).
pub fn contract_offer(
    provider_pid: &str,
    consumer_pid: &str,
    offer_id: &str,
    assigner: &str,
    dataset_id: &str,
) -> Value {
    envelope(
        CONTRACT_OFFER_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "offer": {
                "@id": offer_id,
                "@type": OFFER_TYPE,
                "assigner": assigner,
                "target": dataset_id,
                "permission": [{ "action": "use" }],
            },
        }),
    )
}

/// Provider agreement. The agreement carries a UTC timestamp.
pub fn contract_agreement(
    provider_pid: &str,
    consumer_pid: &str,
    assigner: &str,
    assignee: &str,
    dataset_id: &str,
) -> Value {
    envelope(
        CONTRACT_AGREEMENT_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "agreement": {
                "@id": Uuid::new_v4().to_string(),
                "@type": AGREEMENT_TYPE,
                "assigner": assigner,
                "assignee": assignee,
                "target": dataset_id,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                "permission": [{ "action": "use" }],
            },
        }),
    )
}

pub fn agreement_verification(provider_pid: &str, consumer_pid: &str) -> Value {
    envelope(
        CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
        json!({ "providerPid": provider_pid, "consumerPid": consumer_pid }),
    )
}

/// Negotiation event; `event_type` is `ACCEPTED` or `FINALIZED`.
pub fn negotiation_event(provider_pid: &str, consumer_pid: &str, event_type: &str) -> Value {
    envelope(
        CONTRACT_NEGOTIATION_EVENT_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "eventType": event_type,
        }),
    )
}

pub fn accepted_event(provider_pid: &str, consumer_pid: &str) -> Value {
    negotiation_event(provider_pid, consumer_pid, EVENT_ACCEPTED)
}

pub fn finalized_event(provider_pid: &str, consumer_pid: &str) -> Value {
    negotiation_event(provider_pid, consumer_pid, EVENT_FINALIZED)
}

pub fn negotiation_termination(
    provider_pid: &str,
    consumer_pid: &str,
    code: &str,
    reason_messages: &[&str],
) -> Value {
    envelope(
        CONTRACT_NEGOTIATION_TERMINATION_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "code": code,
            "reason": reasons(reason_messages),
        }),
    )
}

/// Negotiation status response; `state` is a compact state name.
pub fn negotiation_response(provider_pid: &str, consumer_pid: &str, state: &str) -> Value {
    envelope(
        CONTRACT_NEGOTIATION,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "state": state,
        }),
    )
}

// ── Transfer ────────────────────────────────────────────────────────

pub fn transfer_request(
    consumer_pid: &str,
    agreement_id: &str,
    format: &str,
    data_address: Option<Value>,
    callback_address: &str,
) -> Value {
    let mut message = envelope(
        TRANSFER_REQUEST_MESSAGE,
        json!({
            "consumerPid": consumer_pid,
            "agreementId": agreement_id,
            "format": format,
            "callbackAddress": callback_address,
        }),
    );
    if let Some(address) = data_address {
        message["dataAddress"] = address;
    }
    message
}

/// Start message; push transfers carry a data address.
pub fn transfer_start(provider_pid: &str, consumer_pid: &str, data_address: Option<Value>) -> Value {
    let mut message = envelope(
        TRANSFER_START_MESSAGE,
        json!({ "providerPid": provider_pid, "consumerPid": consumer_pid }),
    );
    if let Some(address) = data_address {
        message["dataAddress"] = address;
    }
    message
}

pub fn transfer_completion(provider_pid: &str, consumer_pid: &str) -> Value {
    envelope(
        TRANSFER_COMPLETION_MESSAGE,
        json!({ "providerPid": provider_pid, "consumerPid": consumer_pid }),
    )
}

pub fn transfer_suspension(
    provider_pid: &str,
    consumer_pid: &str,
    code: &str,
    reason_messages: &[&str],
) -> Value {
    envelope(
        TRANSFER_SUSPENSION_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "code": code,
            "reason": reasons(reason_messages),
        }),
    )
}

pub fn transfer_termination(
    provider_pid: &str,
    consumer_pid: &str,
    code: &str,
    reason_messages: &[&str],
) -> Value {
    envelope(
        TRANSFER_TERMINATION_MESSAGE,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "code": code,
            "reason": reasons(reason_messages),
        }),
    )
}

/// Transfer status response; `state` is a compact state name.
pub fn transfer_response(provider_pid: &str, consumer_pid: &str, state: &str) -> Value {
    envelope(
        TRANSFER_PROCESS,
        json!({
            "providerPid": provider_pid,
            "consumerPid": consumer_pid,
            "state": state,
        }),
    )
}

// ── Data addresses ──────────────────────────────────────────────────

/// Data address node with `EndpointProperty` entries.
pub fn data_address(endpoint_type: &str, endpoint: &str, properties: &[(&str, &str)]) -> Value {
    let mut address = json!({
        "@type": DATA_ADDRESS_TYPE,
        "endpointType": endpoint_type,
        "endpoint": endpoint,
    });
    if !properties.is_empty() {
        address["endpointProperties"] = Value::Array(
            properties
                .iter()
                .map(|(name, value)| {
                    json!({ "@type": ENDPOINT_PROPERTY_TYPE, "name": name, "value": value })
                })
                .collect(),
        );
    }
    address
}

/// HTTP data address pointing at [`DEFAULT_ENDPOINT`].
pub fn default_data_address() -> Value {
    data_address(HTTP_ENDPOINT_TYPE, DEFAULT_ENDPOINT, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Canonicalizer;

    #[test]
    fn every_builder_canonicalizes() {
        let c = Canonicalizer::dsp().unwrap();
        let documents = [
            contract_request("c", "offer-1", "ds-1", "http://cb"),
            counter_request("p", "c", "offer-2", "ds-1", "http://cb"),
            contract_offer("p", "c", "offer-1", "P1", "ds-1"),
            contract_agreement("p", "c", "P1", "C1", "ds-1"),
            agreement_verification("p", "c"),
            accepted_event("p", "c"),
            finalized_event("p", "c"),
            negotiation_termination("p", "c", "1", &["reason"]),
            negotiation_response("p", "c", "REQUESTED"),
            transfer_request("c", "agreement-1", "HTTP-PULL", None, "http://cb"),
            transfer_start("p", "c", Some(default_data_address())),
            transfer_completion("p", "c"),
            transfer_suspension("p", "c", "1", &[]),
            transfer_termination("p", "c", "1", &["a", "b"]),
            transfer_response("p", "c", "STARTED"),
        ];
        for document in &documents {
            c.canonicalize(document)
                .unwrap_or_else(|e| panic!("{}: {e}", document[TYPE]));
        }
    }

    #[test]
    fn builders_mint_distinct_ids() {
        let a = agreement_verification("p", "c");
        let b = agreement_verification("p", "c");
        assert_ne!(a[ID], b[ID]);
    }

    #[test]
    fn termination_reasons_are_message_objects() {
        let message = transfer_termination("p", "c", "1", &["first", "second"]);
        assert_eq!(message["reason"][1]["message"], "second");
    }

    #[test]
    fn start_data_address_survives_canonicalization() {
        let c = Canonicalizer::dsp().unwrap();
        let address = data_address(HTTP_ENDPOINT_TYPE, "http://example.com/data", &[("authorization", "token")]);
        let message = c
            .canonicalize(&transfer_start("p", "c", Some(address)))
            .unwrap();
        assert!(message.data_address().is_some());
        assert!(c.canonicalize(&transfer_start("p", "c", None)).unwrap().data_address().is_none());
    }
}
