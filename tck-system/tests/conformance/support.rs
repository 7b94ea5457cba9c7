//! Shared scenario setup.

use std::time::Duration;

use tck_system::{TckConfig, TckRuntime};

pub const DATASET_ID: &str = "ACN0101";
pub const OFFER_ID: &str = "ACN0101:offer-1";
pub const AGREEMENT_ID: &str = "ATP0101";
pub const FORMAT: &str = "HTTP-PULL";

/// Local runtime with short waits.
pub fn runtime() -> TckRuntime {
    tck_system::logging::init_with_default("warn");
    let config = TckConfig {
        wait_seconds: 5,
        poll_interval: Duration::from_millis(10),
        pause: Duration::from_millis(50),
        ..TckConfig::local()
    };
    TckRuntime::new(config).expect("local runtime")
}
