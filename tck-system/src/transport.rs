//! Synchronous request transport used by networked clients and mock actions.
//!
//! Callers are the test thread and blocking executor threads, never async
//! tasks, so the trait is blocking. [`HttpTransport`] drives `reqwest` on
//! the runtime handle; [`LoopbackTransport`] short-circuits URLs under a
//! known [`CallbackEndpoint`] address straight into its dispatcher.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tck_core::errors::TckError;
use tokio::runtime::Handle;
use tracing::{debug, error, instrument};

use crate::endpoint::{CallbackEndpoint, InboundRequest};

/// Status and parsed body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body text for error reporting.
    pub fn body_text(&self) -> String {
        match &self.body {
            Some(Value::String(text)) => text.clone(),
            Some(body) => body.to_string(),
            None => String::new(),
        }
    }
}

pub trait Transport: Send + Sync {
    fn post(&self, url: &str, body: &Value) -> Result<TransportResponse, TckError>;

    fn get(&self, url: &str) -> Result<TransportResponse, TckError>;
}

// ── HTTP ────────────────────────────────────────────────────────────

/// `reqwest` transport. Every request carries the configured
/// `Authorization` header, if any.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    handle: Handle,
    authorization: Option<String>,
}

impl HttpTransport {
    pub fn new(
        handle: Handle,
        timeout: Duration,
        authorization: Option<String>,
    ) -> Result<Self, TckError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TckError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            handle,
            authorization,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<TransportResponse, TckError> {
        let request = match &self.authorization {
            Some(token) => request.header(AUTHORIZATION, token),
            None => request,
        };
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };
        if !status.is_success() {
            error!(status = %status, "counter-party returned error");
        }
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

impl Transport for HttpTransport {
    #[instrument(skip(self, body))]
    fn post(&self, url: &str, body: &Value) -> Result<TransportResponse, TckError> {
        debug!(url = %url, "POST");
        self.handle.block_on(self.send(self.client.post(url).json(body)))
    }

    #[instrument(skip(self))]
    fn get(&self, url: &str) -> Result<TransportResponse, TckError> {
        debug!(url = %url, "GET");
        self.handle.block_on(self.send(self.client.get(url)))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TckError {
    if e.is_timeout() {
        TckError::Timeout(format!("Request timed out: {e}"))
    } else {
        TckError::Transport(e.to_string())
    }
}

// ── Loopback ────────────────────────────────────────────────────────

/// In-process transport over a set of endpoints. The endpoint with the
/// longest matching address wins.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    endpoints: Vec<Arc<CallbackEndpoint>>,
}

impl LoopbackTransport {
    pub fn new(endpoints: Vec<Arc<CallbackEndpoint>>) -> Self {
        Self { endpoints }
    }

    fn route<'a>(&'a self, url: &'a str) -> Result<(&'a CallbackEndpoint, &'a str), TckError> {
        self.endpoints
            .iter()
            .filter_map(|endpoint| {
                let rest = url.strip_prefix(endpoint.address())?;
                (rest.is_empty() || rest.starts_with('/')).then_some((endpoint.as_ref(), rest))
            })
            .max_by_key(|(endpoint, _)| endpoint.address().len())
            .ok_or_else(|| TckError::Transport(format!("No route to {url}")))
    }

    fn exchange(
        &self,
        url: &str,
        request: impl FnOnce(&str) -> InboundRequest,
    ) -> Result<TransportResponse, TckError> {
        let (endpoint, path) = self.route(url)?;
        let path = path.split('?').next().unwrap_or(path);
        let response = endpoint.dispatch(&request(path));
        Ok(TransportResponse {
            status: response.code,
            body: response.body,
        })
    }
}

impl Transport for LoopbackTransport {
    fn post(&self, url: &str, body: &Value) -> Result<TransportResponse, TckError> {
        debug!(url = %url, "loopback POST");
        self.exchange(url, |path| InboundRequest::post(path, body.clone()))
    }

    fn get(&self, url: &str) -> Result<TransportResponse, TckError> {
        debug!(url = %url, "loopback GET");
        self.exchange(url, InboundRequest::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loopback_routes_by_address_prefix() {
        let harness = Arc::new(CallbackEndpoint::new("http://localhost:8083"));
        let system = Arc::new(CallbackEndpoint::new("http://localhost:8083/system"));
        harness
            .register_handler("/ping", |_| Ok(Some(json!("harness"))))
            .unwrap();
        system
            .register_handler("/ping", |_| Ok(Some(json!("system"))))
            .unwrap();
        let transport = LoopbackTransport::new(vec![harness, system]);

        let response = transport.get("http://localhost:8083/ping").unwrap();
        assert_eq!(response.body, Some(json!("harness")));
        let response = transport
            .post("http://localhost:8083/system/ping", &json!({}))
            .unwrap();
        assert_eq!(response.body, Some(json!("system")));
    }

    #[test]
    fn loopback_unknown_host_is_transport_error() {
        let transport = LoopbackTransport::default();
        assert!(matches!(
            transport.get("http://elsewhere/ping"),
            Err(TckError::Transport(_))
        ));
    }

    #[test]
    fn loopback_reports_handler_status() {
        let endpoint = Arc::new(CallbackEndpoint::new("http://localhost:8083"));
        let transport = LoopbackTransport::new(vec![endpoint]);
        let response = transport.get("http://localhost:8083/none").unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[test]
    fn body_text_renders_json_and_plain_bodies() {
        let plain = TransportResponse {
            status: 500,
            body: Some(Value::String("oops".into())),
        };
        assert_eq!(plain.body_text(), "oops");
        let structured = TransportResponse {
            status: 400,
            body: Some(json!({ "error": "bad" })),
        };
        assert!(structured.body_text().contains("bad"));
    }
}
