//! Conformance: Canonicalize-then-Extract
//!
//! Inbound messages are only ever read after canonicalization. Property
//! spelling on the wire (term, compact IRI, absolute IRI) must not change
//! what extraction returns. Pids must be plain strings on the surface.

use serde_json::json;
use tck_core::constants::{DSPACE_CONTEXT, DSPACE_NAMESPACE, HTTP_ENDPOINT_TYPE};
use tck_core::message::{Canonicalizer, Term};
use tck_core::messages;
use tck_core::TckError;

fn canonicalizer() -> Canonicalizer {
    Canonicalizer::dsp().unwrap()
}

#[test]
fn conformance_property_spellings_are_equivalent() {
    let c = canonicalizer();
    let spellings = [
        json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "TransferCompletionMessage",
            "providerPid": "p-1",
            "consumerPid": "c-1",
        }),
        json!({
            "@context": [DSPACE_CONTEXT],
            "@type": "TransferCompletionMessage",
            "providerPid": "p-1",
            "consumerPid": "c-1",
            "dspace:providerPid": { "@id": "p-1" },
        }),
    ];
    for document in &spellings {
        let message = c.canonicalize(document).unwrap();
        assert_eq!(message.provider_pid().unwrap(), "p-1");
        assert_eq!(message.consumer_pid().unwrap(), "c-1");
        assert_eq!(message.message_type(), Some("TransferCompletionMessage"));
    }
}

#[test]
fn conformance_value_object_pid_fails_surface_schema() {
    let document = json!({
        "@context": [DSPACE_CONTEXT],
        "@type": "TransferCompletionMessage",
        "providerPid": { "@id": "p-1" },
        "consumerPid": "c-1",
    });
    assert!(matches!(
        canonicalizer().canonicalize(&document),
        Err(TckError::ValidationFailure(m)) if m.contains("TransferCompletionMessage")
    ));
}

#[test]
fn conformance_absolute_iri_keys_expand() {
    let mut document = json!({
        "@context": [DSPACE_CONTEXT],
        "@type": "TransferProcess",
        "providerPid": "p-1",
        "consumerPid": "c-1",
        "state": "STARTED",
    });
    document[format!("{DSPACE_NAMESPACE}format")] = json!("HTTP-PULL");
    let message = canonicalizer().canonicalize(&document).unwrap();
    assert_eq!(message.format().unwrap(), "HTTP-PULL");
    assert_eq!(message.state_name().unwrap(), "STARTED");
}

#[test]
fn conformance_missing_properties_fail_extraction_not_canonicalization() {
    let message = canonicalizer()
        .canonicalize(&messages::transfer_completion("p-1", "c-1"))
        .unwrap();
    assert!(matches!(
        message.agreement_id(),
        Err(TckError::ValidationFailure(_))
    ));
}

#[test]
fn conformance_data_address_nested_extraction() {
    let c = canonicalizer();
    let address =
        messages::data_address(HTTP_ENDPOINT_TYPE, "http://example.com/data", &[("k", "v")]);
    let message = c
        .canonicalize(&messages::transfer_start("p-1", "c-1", Some(address)))
        .unwrap();
    let data_address = message.data_address().unwrap();
    assert_eq!(
        data_address
            .id_property(&format!("{DSPACE_NAMESPACE}endpointType"))
            .unwrap(),
        HTTP_ENDPOINT_TYPE
    );
    let properties: Vec<_> = data_address
        .nodes(&format!("{DSPACE_NAMESPACE}endpointProperties"))
        .collect();
    assert_eq!(properties.len(), 1);
    assert_eq!(
        properties[0]
            .string_property(&format!("{DSPACE_NAMESPACE}name"))
            .unwrap(),
        "k"
    );
}

#[test]
fn conformance_agreement_round_trips_through_serialize() {
    let c = canonicalizer();
    let message = c
        .canonicalize(&messages::contract_agreement("p-1", "c-1", "P", "C", "ds-1"))
        .unwrap();
    let agreement = message.agreement().unwrap();
    assert!(matches!(
        agreement.first(&format!("{DSPACE_NAMESPACE}timestamp")).unwrap(),
        Term::Literal(l) if l.datatype.is_some()
    ));

    let compact = c.serialize(&message).unwrap();
    assert_eq!(compact["@type"], "ContractAgreementMessage");
    assert_eq!(compact["agreement"]["@type"], "Agreement");
    assert_eq!(compact["agreement"]["permission"][0]["action"], "use");
    assert_eq!(c.canonicalize(&compact).unwrap(), message);
}

#[test]
fn conformance_invalid_messages_fail_canonicalization() {
    let c = canonicalizer();
    let missing_pid = json!({
        "@context": [DSPACE_CONTEXT],
        "@type": "TransferStartMessage",
        "consumerPid": "c-1",
    });
    assert!(c.canonicalize(&missing_pid).is_err());
    assert!(c.canonicalize(&json!("not an object")).is_err());
}
