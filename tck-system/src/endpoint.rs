//! Callback endpoint with path-pattern keyed inbound dispatch.
//!
//! ## Patterns
//!
//! A pattern is a regular expression over the request path, relative to the
//! endpoint's base address and matched in full. Paths and patterns are
//! normalised the same way: a leading slash is ensured and a trailing slash
//! removed.
//!
//! When several patterns match, the one with the longest literal prefix
//! wins; ties go to the earliest registration. `/negotiations/request`
//! therefore beats `/negotiations/[^/]+`.
//!
//! ## Failure containment
//!
//! Handlers never take the endpoint down: errors become 4xx/5xx responses
//! and a panicking handler is answered with 400.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tck_core::errors::{TckError, SUCCESS_STATUS};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

/// An inbound request as seen by a handler.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: RequestMethod,
    /// Normalised path relative to the endpoint address.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl InboundRequest {
    pub fn post(path: &str, body: Value) -> Self {
        Self {
            method: RequestMethod::Post,
            path: normalize_path(path),
            headers: BTreeMap::new(),
            body: Some(body),
        }
    }

    pub fn get(path: &str) -> Self {
        Self {
            method: RequestMethod::Get,
            path: normalize_path(path),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Body of a POST, or a validation failure when absent.
    pub fn json_body(&self) -> Result<&Value, TckError> {
        self.body
            .as_ref()
            .ok_or_else(|| TckError::ValidationFailure(format!("Missing request body: {}", self.path)))
    }

    /// The `index`-th path segment (0-based, leading slash ignored).
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.trim_start_matches('/').split('/').nth(index)
    }
}

/// Structured handler response.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub code: u16,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl HandlerResponse {
    pub fn ok(body: Option<Value>) -> Self {
        Self {
            code: SUCCESS_STATUS,
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn failure(code: u16, body: Value) -> Self {
        Self {
            code,
            body: Some(body),
            headers: BTreeMap::new(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::failure(404, json!({ "error": format!("No handler for path: {path}") }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// A registered endpoint handler.
pub trait ProtocolHandler: Send + Sync {
    fn apply(&self, request: &InboundRequest) -> HandlerResponse;
}

/// Wraps a fallible closure: success answers 200, any error answers 400
/// with the error message.
pub struct DelegatingHandler<F> {
    work: F,
}

impl<F> DelegatingHandler<F>
where
    F: Fn(&InboundRequest) -> Result<Option<Value>, TckError> + Send + Sync,
{
    pub fn new(work: F) -> Self {
        Self { work }
    }
}

impl<F> ProtocolHandler for DelegatingHandler<F>
where
    F: Fn(&InboundRequest) -> Result<Option<Value>, TckError> + Send + Sync,
{
    fn apply(&self, request: &InboundRequest) -> HandlerResponse {
        match (self.work)(request) {
            Ok(body) => HandlerResponse::ok(body),
            Err(e) => HandlerResponse::failure(400, json!({ "error": e.to_string() })),
        }
    }
}

/// Wire shape of a failure answered by a [`FallibleHandler`].
#[derive(Debug, Clone, Serialize)]
pub struct FailureBody {
    pub code: u16,
    pub reason: String,
}

/// Wraps a fallible closure: errors map to the status of their
/// [`FailureKind`](tck_core::errors::FailureKind).
pub struct FallibleHandler<F> {
    work: F,
}

impl<F> FallibleHandler<F>
where
    F: Fn(&InboundRequest) -> Result<Option<Value>, TckError> + Send + Sync,
{
    pub fn new(work: F) -> Self {
        Self { work }
    }
}

impl<F> ProtocolHandler for FallibleHandler<F>
where
    F: Fn(&InboundRequest) -> Result<Option<Value>, TckError> + Send + Sync,
{
    fn apply(&self, request: &InboundRequest) -> HandlerResponse {
        match (self.work)(request) {
            Ok(body) => HandlerResponse::ok(body),
            Err(e) => {
                let code = e.failure_kind().status_code();
                let body = FailureBody {
                    code,
                    reason: e.to_string(),
                };
                HandlerResponse::failure(
                    code,
                    serde_json::to_value(body).unwrap_or_else(|_| json!({ "code": code })),
                )
            }
        }
    }
}

struct Registration {
    pattern: String,
    regex: Regex,
    literal_prefix: usize,
    handler: Arc<dyn ProtocolHandler>,
}

/// Inbound dispatcher rooted at a base address.
pub struct CallbackEndpoint {
    address: String,
    base_path: String,
    registrations: RwLock<Vec<Registration>>,
}

impl std::fmt::Debug for CallbackEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<String> = self
            .registrations
            .read()
            .iter()
            .map(|r| r.pattern.clone())
            .collect();
        f.debug_struct("CallbackEndpoint")
            .field("address", &self.address)
            .field("patterns", &patterns)
            .finish()
    }
}

impl CallbackEndpoint {
    /// Endpoint for `address` (e.g. `http://localhost:8083`); a trailing
    /// slash is dropped.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into().trim_end_matches('/').to_string();
        let base_path = reqwest::Url::parse(&address)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self {
            address,
            base_path,
            registrations: RwLock::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Path component of the address, without trailing slash (`""` for a bare host).
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Strips the base path from a server-side request path.
    pub fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        if self.base_path.is_empty() {
            return path;
        }
        match path.strip_prefix(self.base_path.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Registers (or replaces) the handler for `pattern`.
    pub fn register_protocol_handler(
        &self,
        pattern: &str,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), TckError> {
        let pattern = normalize_path(pattern);
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            TckError::ValidationFailure(format!("Invalid handler pattern {pattern}: {e}"))
        })?;
        let registration = Registration {
            literal_prefix: literal_prefix_len(&pattern),
            pattern: pattern.clone(),
            regex,
            handler,
        };
        let mut registrations = self.registrations.write();
        match registrations.iter_mut().find(|r| r.pattern == pattern) {
            Some(existing) => *existing = registration,
            None => registrations.push(registration),
        }
        debug!(pattern = %pattern, "handler registered");
        Ok(())
    }

    /// Registers a closure behind a [`DelegatingHandler`].
    pub fn register_handler<F>(&self, pattern: &str, work: F) -> Result<(), TckError>
    where
        F: Fn(&InboundRequest) -> Result<Option<Value>, TckError> + Send + Sync + 'static,
    {
        self.register_protocol_handler(pattern, Arc::new(DelegatingHandler::new(work)))
    }

    /// Removes the handler for `pattern`; returns whether one was registered.
    pub fn deregister_handler(&self, pattern: &str) -> bool {
        let pattern = normalize_path(pattern);
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.pattern != pattern);
        let removed = registrations.len() != before;
        if removed {
            debug!(pattern = %pattern, "handler deregistered");
        }
        removed
    }

    pub fn handles_path(&self, path: &str) -> bool {
        self.select(&normalize_path(path)).is_some()
    }

    fn select(&self, path: &str) -> Option<Arc<dyn ProtocolHandler>> {
        let registrations = self.registrations.read();
        let mut best: Option<&Registration> = None;
        for registration in registrations.iter() {
            if !registration.regex.is_match(path) {
                continue;
            }
            if best.map_or(true, |b| registration.literal_prefix > b.literal_prefix) {
                best = Some(registration);
            }
        }
        best.map(|r| r.handler.clone())
    }

    /// Routes a request to its handler. The registration lock is released
    /// before the handler runs, so handlers may (de)register.
    pub fn dispatch(&self, request: &InboundRequest) -> HandlerResponse {
        let mut request = request.clone();
        request.path = normalize_path(&request.path);
        let Some(handler) = self.select(&request.path) else {
            debug!(path = %request.path, "no handler for path");
            return HandlerResponse::not_found(&request.path);
        };
        match catch_unwind(AssertUnwindSafe(|| handler.apply(&request))) {
            Ok(response) => {
                debug!(path = %request.path, status = response.code, "request dispatched");
                response
            }
            Err(_) => {
                warn!(path = %request.path, "handler panicked");
                HandlerResponse::failure(
                    400,
                    json!({ "error": format!("Handler failed for path: {}", request.path) }),
                )
            }
        }
    }
}

/// Ensures a leading slash and strips trailing slashes.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn literal_prefix_len(pattern: &str) -> usize {
    pattern
        .find(|c: char| ".^$*+?()[]{}|\\".contains(c))
        .unwrap_or(pattern.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(label: &'static str) -> impl Fn(&InboundRequest) -> Result<Option<Value>, TckError> {
        move |_| Ok(Some(json!(label)))
    }

    #[test]
    fn path_normalisation() {
        assert_eq!(normalize_path("negotiations/1/"), "/negotiations/1");
        assert_eq!(normalize_path("/negotiations/1"), "/negotiations/1");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn full_match_only() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083/");
        endpoint
            .register_handler("/negotiations/[^/]+/offers", echo("offers"))
            .unwrap();
        assert!(endpoint.handles_path("negotiations/abc/offers/"));
        assert!(!endpoint.handles_path("/negotiations/abc/offers/extra"));
        assert!(!endpoint.handles_path("/prefix/negotiations/abc/offers"));
    }

    #[test]
    fn longest_literal_prefix_wins() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        endpoint
            .register_handler("/negotiations/[^/]+", echo("by-id"))
            .unwrap();
        endpoint
            .register_handler("/negotiations/request", echo("request"))
            .unwrap();
        let response = endpoint.dispatch(&InboundRequest::post("/negotiations/request", json!({})));
        assert_eq!(response.body, Some(json!("request")));
        let response = endpoint.dispatch(&InboundRequest::get("/negotiations/42"));
        assert_eq!(response.body, Some(json!("by-id")));
    }

    #[test]
    fn ties_go_to_earliest_registration() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        endpoint.register_handler("/a/.*", echo("first")).unwrap();
        endpoint.register_handler("/a/[^/]+", echo("second")).unwrap();
        let response = endpoint.dispatch(&InboundRequest::get("/a/x"));
        assert_eq!(response.body, Some(json!("first")));
    }

    #[test]
    fn handler_errors_become_400() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        endpoint
            .register_handler("/fail", |_| Err(TckError::ValidationFailure("boom".into())))
            .unwrap();
        let response = endpoint.dispatch(&InboundRequest::get("/fail"));
        assert_eq!(response.code, 400);
        assert!(response.body.unwrap()["error"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn panicking_handler_is_contained() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        endpoint
            .register_handler("/panic", |_| panic!("handler bug"))
            .unwrap();
        assert_eq!(endpoint.dispatch(&InboundRequest::get("/panic")).code, 400);
        // Endpoint still serves afterwards.
        endpoint.register_handler("/ok", echo("ok")).unwrap();
        assert!(endpoint.dispatch(&InboundRequest::get("/ok")).is_success());
    }

    #[test]
    fn fallible_handler_maps_failure_kinds() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        let handler = FallibleHandler::new(|request: &InboundRequest| match request.segment(0) {
            Some("missing") => Err(TckError::NotFound {
                kind: "Negotiation",
                id: "x".into(),
            }),
            Some("conflict") => Err(TckError::illegal_transition("A", "B", &["C"])),
            _ => Ok(None),
        });
        endpoint
            .register_protocol_handler("/.*", Arc::new(handler))
            .unwrap();
        assert_eq!(endpoint.dispatch(&InboundRequest::get("/missing")).code, 404);
        let conflict = endpoint.dispatch(&InboundRequest::get("/conflict"));
        assert_eq!(conflict.code, 409);
        assert_eq!(conflict.body.unwrap()["code"], 409);
        assert_eq!(endpoint.dispatch(&InboundRequest::get("/fine")).code, 200);
    }

    #[test]
    fn unmatched_path_is_404() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        assert_eq!(endpoint.dispatch(&InboundRequest::get("/nothing")).code, 404);
    }

    #[test]
    fn handler_may_deregister_itself() {
        let endpoint = Arc::new(CallbackEndpoint::new("http://localhost:8083"));
        let calls = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&endpoint);
        let counter = calls.clone();
        endpoint
            .register_handler("/once", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(endpoint) = weak.upgrade() {
                    endpoint.deregister_handler("/once");
                }
                Ok(None)
            })
            .unwrap();
        assert!(endpoint.dispatch(&InboundRequest::get("/once")).is_success());
        assert_eq!(endpoint.dispatch(&InboundRequest::get("/once")).code, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn base_path_is_stripped_for_server_paths() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083/callback/");
        assert_eq!(endpoint.base_path(), "/callback");
        assert_eq!(endpoint.relative_path("/callback/negotiations/1"), "/negotiations/1");
        assert_eq!(endpoint.relative_path("/callbackx/1"), "/callbackx/1");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let endpoint = CallbackEndpoint::new("http://localhost:8083");
        assert!(endpoint.register_handler("/bad(", echo("x")).is_err());
    }
}
