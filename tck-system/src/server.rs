//! HTTP front for a [`CallbackEndpoint`].
//!
//! Every method and path goes to one fallback route. The request is
//! dispatched on a blocking thread because handlers are synchronous and may
//! themselves perform blocking transport calls.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tck_core::errors::TckError;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::endpoint::{CallbackEndpoint, HandlerResponse, InboundRequest, RequestMethod};

/// A running callback server. Dropping the handle shuts the server down.
#[derive(Debug)]
pub struct CallbackServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CallbackServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals graceful shutdown. In-flight requests finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
            info!(addr = %self.local_addr, "callback server shutting down");
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Binds `addr` and serves `endpoint` on the runtime behind `handle`.
/// Port 0 picks an ephemeral port; see [`CallbackServer::local_addr`].
pub fn serve(
    handle: &Handle,
    endpoint: Arc<CallbackEndpoint>,
    addr: SocketAddr,
) -> Result<CallbackServer, TckError> {
    let listener = handle
        .block_on(TcpListener::bind(addr))
        .map_err(|e| TckError::Transport(format!("Failed to bind {addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| TckError::Transport(e.to_string()))?;

    let app = Router::new().fallback(handle_request).with_state(endpoint);
    let (tx, rx) = oneshot::channel::<()>();
    handle.spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "callback server failed");
        }
    });

    info!(addr = %local_addr, "callback server listening");
    Ok(CallbackServer {
        local_addr,
        shutdown: Some(tx),
    })
}

async fn handle_request(
    State(endpoint): State<Arc<CallbackEndpoint>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = match method {
        Method::GET => RequestMethod::Get,
        Method::POST => RequestMethod::Post,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    let body: Option<Value> = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("Invalid JSON body: {e}") })),
                )
                    .into_response()
            }
        }
    };

    let mut request = match method {
        RequestMethod::Get => InboundRequest::get(endpoint.relative_path(uri.path())),
        RequestMethod::Post => {
            InboundRequest::post(endpoint.relative_path(uri.path()), body.unwrap_or(Value::Null))
        }
    };
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    match tokio::task::spawn_blocking(move || endpoint.dispatch(&request)).await {
        Ok(response) => into_http(response),
        Err(e) => {
            error!(error = %e, "dispatch task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn into_http(response: HandlerResponse) -> Response {
    let status =
        StatusCode::from_u16(response.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = header_map(&response.headers);
    match response.body {
        Some(body) => (status, headers, Json(body)).into_response(),
        None => (status, headers).into_response(),
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    map
}
