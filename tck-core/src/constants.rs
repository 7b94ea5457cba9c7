//! Protocol constants: the DSP 2025-1 vocabulary shared by every harness crate.
//!
//! Compact names are what appears on the wire under the DSP context.
//! Expanded names are the fully-qualified IRIs that canonical messages are
//! keyed by. Every expanded name MUST be its compact name prefixed with
//! [`DSPACE_NAMESPACE`] (or [`ODRL_NAMESPACE`] for policy terms); drift is
//! caught by the tests at the bottom of this file.

macro_rules! dspace {
    ($term:literal) => {
        concat!("https://w3id.org/dspace/2025/1/", $term)
    };
}

macro_rules! odrl {
    ($term:literal) => {
        concat!("http://www.w3.org/ns/odrl/2/", $term)
    };
}

// ── Namespaces and contexts ─────────────────────────────────────────

/// DSP 2025-1 vocabulary namespace.
pub const DSPACE_NAMESPACE: &str = dspace!("");

/// Prefix bound to [`DSPACE_NAMESPACE`] in the DSP context.
pub const DSPACE_PREFIX: &str = "dspace";

/// URI of the DSP 2025-1 JSON-LD context document.
pub const DSPACE_CONTEXT: &str = dspace!("context.jsonld");

/// Protocol version advertised in connector metadata.
pub const PROTOCOL_VERSION: &str = "2025-1";

/// Well-known path of the version metadata document.
pub const METADATA_PATH: &str = "/.well-known/dspace-version";

/// ODRL 2 vocabulary namespace.
pub const ODRL_NAMESPACE: &str = odrl!("");

/// Prefix bound to [`ODRL_NAMESPACE`] in the DSP context.
pub const ODRL_PREFIX: &str = "odrl";

/// XML Schema datatype namespace.
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";

// ── JSON-LD keywords ────────────────────────────────────────────────

pub const CONTEXT: &str = "@context";
pub const ID: &str = "@id";
pub const TYPE: &str = "@type";
pub const VALUE: &str = "@value";
pub const VOCAB: &str = "@vocab";
pub const CONTAINER: &str = "@container";
pub const SET: &str = "@set";

// ── Harness identity and defaults ───────────────────────────────────

/// Participant id the harness uses for itself in every message it builds.
pub const TCK_PARTICIPANT_ID: &str = "TCK_PARTICIPANT";

/// Default callback address of the harness endpoint.
pub const DEFAULT_CALLBACK_ADDRESS: &str = "http://localhost:8083";

/// Default callback port of the harness endpoint.
pub const DEFAULT_CALLBACK_PORT: u16 = 8083;

/// Default connector-under-test id when none is configured.
pub const DEFAULT_CONNECTOR_UNDER_TEST_ID: &str = "ANONYMOUS";

/// Default overall wait for state predicates and expectations (seconds).
pub const DEFAULT_WAIT_SECONDS: u64 = 15;

/// Fixed pause used by `then_pause` and before replies (milliseconds).
pub const DEFAULT_PAUSE_MS: u64 = 200;

/// Poll interval of state predicates (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default size of the mock executor pool.
pub const DEFAULT_THREAD_POOL: usize = 10;

/// Default transfer format used by scenarios.
pub const DEFAULT_TRANSFER_FORMAT: &str = "HTTP-PULL";

/// Endpoint type of the default data address.
pub const HTTP_ENDPOINT_TYPE: &str = "https://w3id.org/idsa/v4.1/HTTP";

// ── Message types (compact) ─────────────────────────────────────────

pub const CONTRACT_REQUEST_MESSAGE: &str = "ContractRequestMessage";
pub const CONTRACT_OFFER_MESSAGE: &str = "ContractOfferMessage";
pub const CONTRACT_AGREEMENT_MESSAGE: &str = "ContractAgreementMessage";
pub const CONTRACT_AGREEMENT_VERIFICATION_MESSAGE: &str = "ContractAgreementVerificationMessage";
pub const CONTRACT_NEGOTIATION_EVENT_MESSAGE: &str = "ContractNegotiationEventMessage";
pub const CONTRACT_NEGOTIATION_TERMINATION_MESSAGE: &str = "ContractNegotiationTerminationMessage";
pub const CONTRACT_NEGOTIATION: &str = "ContractNegotiation";
pub const TRANSFER_REQUEST_MESSAGE: &str = "TransferRequestMessage";
pub const TRANSFER_START_MESSAGE: &str = "TransferStartMessage";
pub const TRANSFER_COMPLETION_MESSAGE: &str = "TransferCompletionMessage";
pub const TRANSFER_SUSPENSION_MESSAGE: &str = "TransferSuspensionMessage";
pub const TRANSFER_TERMINATION_MESSAGE: &str = "TransferTerminationMessage";
pub const TRANSFER_PROCESS: &str = "TransferProcess";

/// Every message type the harness sends or receives (13 types)
/// (7 negotiation, 6 transfer).
pub const DSP_MESSAGE_TYPES: [&str; 13] = [
    CONTRACT_REQUEST_MESSAGE,
    CONTRACT_OFFER_MESSAGE,
    CONTRACT_AGREEMENT_MESSAGE,
    CONTRACT_AGREEMENT_VERIFICATION_MESSAGE,
    CONTRACT_NEGOTIATION_EVENT_MESSAGE,
    CONTRACT_NEGOTIATION_TERMINATION_MESSAGE,
    CONTRACT_NEGOTIATION,
    TRANSFER_REQUEST_MESSAGE,
    TRANSFER_START_MESSAGE,
    TRANSFER_COMPLETION_MESSAGE,
    TRANSFER_SUSPENSION_MESSAGE,
    TRANSFER_TERMINATION_MESSAGE,
    TRANSFER_PROCESS,
];

/// Returns `true` if `name` is one of the [`DSP_MESSAGE_TYPES`].
pub fn is_dsp_message_type(name: &str) -> bool {
    DSP_MESSAGE_TYPES.contains(&name)
}

/// Nested node types.
pub const DATA_ADDRESS_TYPE: &str = "DataAddress";
pub const ENDPOINT_PROPERTY_TYPE: &str = "EndpointProperty";
pub const OFFER_TYPE: &str = "Offer";
pub const AGREEMENT_TYPE: &str = "Agreement";

// ── Event types ─────────────────────────────────────────────────────

pub const EVENT_ACCEPTED: &str = "ACCEPTED";
pub const EVENT_FINALIZED: &str = "FINALIZED";

// ── Properties (compact) ────────────────────────────────────────────

pub const PROPERTY_CONSUMER_PID: &str = "consumerPid";
pub const PROPERTY_PROVIDER_PID: &str = "providerPid";
pub const PROPERTY_STATE: &str = "state";
pub const PROPERTY_EVENT_TYPE: &str = "eventType";
pub const PROPERTY_CALLBACK_ADDRESS: &str = "callbackAddress";
pub const PROPERTY_OFFER: &str = "offer";
pub const PROPERTY_AGREEMENT: &str = "agreement";
pub const PROPERTY_DATA_ADDRESS: &str = "dataAddress";
pub const PROPERTY_ENDPOINT_TYPE: &str = "endpointType";
pub const PROPERTY_ENDPOINT: &str = "endpoint";
pub const PROPERTY_ENDPOINT_PROPERTIES: &str = "endpointProperties";
pub const PROPERTY_NAME: &str = "name";
pub const PROPERTY_VALUE: &str = "value";
pub const PROPERTY_AGREEMENT_ID: &str = "agreementId";
pub const PROPERTY_FORMAT: &str = "format";
pub const PROPERTY_CODE: &str = "code";
pub const PROPERTY_REASON: &str = "reason";
pub const PROPERTY_TIMESTAMP: &str = "timestamp";
pub const PROPERTY_TARGET: &str = "target";
pub const PROPERTY_ASSIGNER: &str = "assigner";
pub const PROPERTY_ASSIGNEE: &str = "assignee";
pub const PROPERTY_PERMISSION: &str = "permission";
pub const PROPERTY_ACTION: &str = "action";

// ── Properties (expanded) ───────────────────────────────────────────

pub const PROPERTY_CONSUMER_PID_EXPANDED: &str = dspace!("consumerPid");
pub const PROPERTY_PROVIDER_PID_EXPANDED: &str = dspace!("providerPid");
pub const PROPERTY_STATE_EXPANDED: &str = dspace!("state");
pub const PROPERTY_EVENT_TYPE_EXPANDED: &str = dspace!("eventType");
pub const PROPERTY_CALLBACK_ADDRESS_EXPANDED: &str = dspace!("callbackAddress");
pub const PROPERTY_OFFER_EXPANDED: &str = dspace!("offer");
pub const PROPERTY_AGREEMENT_EXPANDED: &str = dspace!("agreement");
pub const PROPERTY_DATA_ADDRESS_EXPANDED: &str = dspace!("dataAddress");
pub const PROPERTY_ENDPOINT_TYPE_EXPANDED: &str = dspace!("endpointType");
pub const PROPERTY_ENDPOINT_EXPANDED: &str = dspace!("endpoint");
pub const PROPERTY_ENDPOINT_PROPERTIES_EXPANDED: &str = dspace!("endpointProperties");
pub const PROPERTY_NAME_EXPANDED: &str = dspace!("name");
pub const PROPERTY_VALUE_EXPANDED: &str = dspace!("value");
pub const PROPERTY_AGREEMENT_ID_EXPANDED: &str = dspace!("agreementId");
pub const PROPERTY_FORMAT_EXPANDED: &str = dspace!("format");
pub const PROPERTY_CODE_EXPANDED: &str = dspace!("code");
pub const PROPERTY_REASON_EXPANDED: &str = dspace!("reason");
pub const PROPERTY_TIMESTAMP_EXPANDED: &str = dspace!("timestamp");
pub const PROPERTY_TARGET_EXPANDED: &str = odrl!("target");
pub const PROPERTY_ASSIGNER_EXPANDED: &str = odrl!("assigner");
pub const PROPERTY_ASSIGNEE_EXPANDED: &str = odrl!("assignee");
pub const PROPERTY_PERMISSION_EXPANDED: &str = odrl!("permission");
pub const PROPERTY_ACTION_EXPANDED: &str = odrl!("action");
