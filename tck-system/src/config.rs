//! Harness configuration.
//!
//! A [`TckConfig`] is assembled once per run from defaults, a property map,
//! or the environment, and handed to [`crate::runtime::TckRuntime::new`].
//!
//! ## Keys
//!
//! Property keys are dotted (`dataspacetck.dsp.thread.pool`). The matching
//! environment variable is the key upper-cased with dots replaced by
//! underscores (`DATASPACETCK_DSP_THREAD_POOL`).

use std::collections::HashMap;
use std::time::Duration;

use tck_core::constants::{
    DEFAULT_CALLBACK_ADDRESS, DEFAULT_CALLBACK_PORT, DEFAULT_CONNECTOR_UNDER_TEST_ID,
    DEFAULT_PAUSE_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_THREAD_POOL, DEFAULT_WAIT_SECONDS,
};
use tck_core::errors::TckError;

pub const LOCAL_CONNECTOR_KEY: &str = "dataspacetck.dsp.local.connector";
pub const CONNECTOR_AGENT_ID_KEY: &str = "dataspacetck.dsp.connector.agent.id";
pub const CONNECTOR_HTTP_URL_KEY: &str = "dataspacetck.dsp.connector.http.url";
pub const CONNECTOR_AUTHORIZATION_KEY: &str = "dataspacetck.dsp.connector.http.headers.authorization";
pub const NEGOTIATION_INITIATE_URL_KEY: &str = "dataspacetck.dsp.connector.negotiation.initiate.url";
pub const TRANSFER_INITIATE_URL_KEY: &str = "dataspacetck.dsp.connector.transfer.initiate.url";
pub const THREAD_POOL_KEY: &str = "dataspacetck.dsp.thread.pool";
pub const DEFAULT_WAIT_KEY: &str = "dataspacetck.dsp.default.wait";
pub const CALLBACK_ADDRESS_KEY: &str = "dataspacetck.callback.address";
pub const PORT_KEY: &str = "dataspacetck.port";

/// Every recognised key, in documentation order.
pub const CONFIG_KEYS: [&str; 10] = [
    LOCAL_CONNECTOR_KEY,
    CONNECTOR_AGENT_ID_KEY,
    CONNECTOR_HTTP_URL_KEY,
    CONNECTOR_AUTHORIZATION_KEY,
    NEGOTIATION_INITIATE_URL_KEY,
    TRANSFER_INITIATE_URL_KEY,
    THREAD_POOL_KEY,
    DEFAULT_WAIT_KEY,
    CALLBACK_ADDRESS_KEY,
    PORT_KEY,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TckConfig {
    /// Run against the embedded reference connector instead of a networked one.
    pub local_connector: bool,
    /// Participant id of the connector under test.
    pub connector_under_test_id: String,
    /// Protocol base URL of the connector under test.
    pub connector_base_url: Option<String>,
    /// Sent as `Authorization` on every networked request.
    pub authorization_header: Option<String>,
    pub negotiation_initiate_url: Option<String>,
    pub transfer_initiate_url: Option<String>,
    /// Upper bound of the mock-action executor.
    pub thread_pool: usize,
    /// Bound for state waits and expectation waits.
    pub wait_seconds: u64,
    /// Harness callback base address advertised to the counter-party.
    pub callback_address: String,
    pub callback_port: u16,
    pub poll_interval: Duration,
    pub pause: Duration,
}

impl Default for TckConfig {
    fn default() -> Self {
        Self {
            local_connector: false,
            connector_under_test_id: DEFAULT_CONNECTOR_UNDER_TEST_ID.to_string(),
            connector_base_url: None,
            authorization_header: None,
            negotiation_initiate_url: None,
            transfer_initiate_url: None,
            thread_pool: DEFAULT_THREAD_POOL,
            wait_seconds: DEFAULT_WAIT_SECONDS,
            callback_address: DEFAULT_CALLBACK_ADDRESS.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            pause: Duration::from_millis(DEFAULT_PAUSE_MS),
        }
    }
}

impl TckConfig {
    /// Defaults with the embedded reference connector enabled.
    pub fn local() -> Self {
        Self {
            local_connector: true,
            ..Self::default()
        }
    }

    /// Builds a config from dotted property keys. Unknown keys are ignored.
    ///
    /// # Contract
    /// - Malformed numbers or booleans fail with `ValidationFailure` naming the key.
    /// - In networked mode the agent id, base URL and both initiate URLs
    ///   must be present.
    pub fn from_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Result<Self, TckError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let properties: HashMap<String, String> = properties
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().trim().to_string()))
            .collect();
        let get = |key: &str| properties.get(key).filter(|v| !v.is_empty()).cloned();

        let mut config = Self::default();
        if let Some(value) = get(LOCAL_CONNECTOR_KEY) {
            config.local_connector = parse(LOCAL_CONNECTOR_KEY, &value)?;
        }
        if let Some(value) = get(THREAD_POOL_KEY) {
            config.thread_pool = parse(THREAD_POOL_KEY, &value)?;
        }
        if let Some(value) = get(DEFAULT_WAIT_KEY) {
            config.wait_seconds = parse(DEFAULT_WAIT_KEY, &value)?;
        }
        if let Some(value) = get(PORT_KEY) {
            config.callback_port = parse(PORT_KEY, &value)?;
        }
        if let Some(value) = get(CALLBACK_ADDRESS_KEY) {
            config.callback_address = value.trim_end_matches('/').to_string();
        }
        config.connector_base_url = get(CONNECTOR_HTTP_URL_KEY);
        config.authorization_header = get(CONNECTOR_AUTHORIZATION_KEY);
        config.negotiation_initiate_url = get(NEGOTIATION_INITIATE_URL_KEY);
        config.transfer_initiate_url = get(TRANSFER_INITIATE_URL_KEY);

        match get(CONNECTOR_AGENT_ID_KEY) {
            Some(agent_id) => config.connector_under_test_id = agent_id,
            None if !config.local_connector => return Err(missing(CONNECTOR_AGENT_ID_KEY)),
            None => {}
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads every key from its environment variable.
    pub fn from_env() -> Result<Self, TckError> {
        Self::from_properties(
            CONFIG_KEYS
                .iter()
                .filter_map(|key| std::env::var(env_var_name(key)).ok().map(|v| (*key, v))),
        )
    }

    /// # Contract
    /// Networked mode needs the base URL and both initiate URLs; the thread
    /// pool must be non-zero.
    pub fn validate(&self) -> Result<(), TckError> {
        if self.thread_pool == 0 {
            return Err(TckError::ValidationFailure(format!(
                "{THREAD_POOL_KEY} must be greater than zero"
            )));
        }
        if !self.local_connector {
            for (key, value) in [
                (CONNECTOR_HTTP_URL_KEY, &self.connector_base_url),
                (NEGOTIATION_INITIATE_URL_KEY, &self.negotiation_initiate_url),
                (TRANSFER_INITIATE_URL_KEY, &self.transfer_initiate_url),
            ] {
                if value.is_none() {
                    return Err(missing(key));
                }
            }
        }
        Ok(())
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }
}

/// `dataspacetck.dsp.thread.pool` → `DATASPACETCK_DSP_THREAD_POOL`.
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TckError> {
    value
        .parse()
        .map_err(|_| TckError::ValidationFailure(format!("Invalid value for {key}: {value}")))
}

fn missing(key: &str) -> TckError {
    TckError::ValidationFailure(format!("Missing required configuration: {key}"))
}
