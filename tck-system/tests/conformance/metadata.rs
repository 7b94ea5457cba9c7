//! Conformance: Version Metadata
//!
//! The connector under test advertises the protocol versions it supports.

use tck_core::constants::PROTOCOL_VERSION;
use tck_system::client::MetadataClient;

use crate::support::runtime;

#[test]
fn conformance_metadata_lists_supported_version() {
    let runtime = runtime();
    let metadata = runtime.metadata_client().get_metadata().unwrap();

    let versions = metadata["protocolVersions"]
        .as_array()
        .expect("protocolVersions array");
    assert!(versions
        .iter()
        .any(|entry| entry["version"] == PROTOCOL_VERSION && entry["path"].is_string()));
}
