//! Conformance: DSP Message Type Registry

use tck_core::constants::{is_dsp_message_type, DSP_MESSAGE_TYPES};
use tck_core::message::SchemaRegistry;

#[test]
fn conformance_message_types_exact_list() {
    let expected: [&str; 13] = [
        "ContractRequestMessage",
        "ContractOfferMessage",
        "ContractAgreementMessage",
        "ContractAgreementVerificationMessage",
        "ContractNegotiationEventMessage",
        "ContractNegotiationTerminationMessage",
        "ContractNegotiation",
        "TransferRequestMessage",
        "TransferStartMessage",
        "TransferCompletionMessage",
        "TransferSuspensionMessage",
        "TransferTerminationMessage",
        "TransferProcess",
    ];
    assert_eq!(DSP_MESSAGE_TYPES, expected, "DSP_MESSAGE_TYPES drift");
}

#[test]
fn conformance_message_types_are_case_sensitive() {
    assert!(is_dsp_message_type("TransferProcess"));
    assert!(!is_dsp_message_type("transferprocess"));
    assert!(!is_dsp_message_type("CatalogRequestMessage"));
}

#[test]
fn conformance_every_message_type_is_schema_checked() {
    let schemas = SchemaRegistry::with_dsp_schemas().unwrap();
    for message_type in DSP_MESSAGE_TYPES {
        assert!(schemas.has_schema(message_type), "{message_type}");
    }
}
