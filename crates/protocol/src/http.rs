// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! HTTP transport.
//!
//! | Route            | Method | Body                                    |
//! |------------------|--------|-----------------------------------------|
//! | `/health`        | GET    |                                         |
//! | `/status`        | GET    |                                         |
//! | `/load`          | POST   | `{model_path, model_id?, backend?}`     |
//! | `/predict`       | POST   | `{model_id, input_data}`                |
//! | `/batch_predict` | POST   | `{model_id, inputs}`                    |
//! | `/unload`        | POST   | `{model_id}`                            |
//!
//! Bridge calls run on tokio's blocking pool; a panic there becomes a 500.
//! Request bodies above the configured cap are refused with 413 before they
//! are buffered in full. Shutdown is graceful: the listener closes and
//! in-flight requests finish.

use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::header::CONTENT_LENGTH;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use runtime::{Bridge, DEFAULT_MAX_BODY_BYTES};
use serde_json::{Map, Value};

use crate::command::{dispatch, with_success, Command};
use crate::response::{error_response, json_response, runtime_error_response};
use crate::{ProtocolError, ShutdownHandle};

pub struct HttpServer {
    bridge: Arc<Bridge>,
    shutdown: ShutdownHandle,
    max_body_bytes: usize,
}

impl HttpServer {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        let shutdown = ShutdownHandle::new(Arc::clone(bridge.lifecycle()));
        Self {
            bridge,
            shutdown,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Caps the size of accepted request bodies.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Binds `addr` and serves until shutdown.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), ProtocolError> {
        let listener =
            TcpListener::bind(addr).map_err(|source| ProtocolError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProtocolError> {
        listener.set_nonblocking(true)?;
        let bridge = Arc::clone(&self.bridge);
        let limit = self.max_body_bytes;
        let make_svc = make_service_fn(move |_conn| {
            let bridge = Arc::clone(&bridge);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, Arc::clone(&bridge), limit)
                }))
            }
        });

        let server = Server::from_tcp(listener)?.serve(make_svc);
        tracing::info!("HTTP transport listening on http://{}", server.local_addr());

        let shutdown = self.shutdown.clone();
        server
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("HTTP transport draining");
            })
            .await?;

        self.bridge.lifecycle().stop();
        tracing::info!("HTTP transport stopped");
        Ok(())
    }
}

/// Route table: path -> (method, command name).
fn route(path: &str) -> Option<(Method, &'static str)> {
    match path {
        "/health" => Some((Method::GET, "health")),
        "/status" => Some((Method::GET, "status")),
        "/load" => Some((Method::POST, "load_model")),
        "/predict" => Some((Method::POST, "predict")),
        "/batch_predict" => Some((Method::POST, "batch_predict")),
        "/unload" => Some((Method::POST, "unload_model")),
        _ => None,
    }
}

/// Handles one request. Never fails: every error becomes a JSON response.
///
/// Bodies larger than `max_body_bytes` are answered with 413.
pub async fn handle_request(
    req: Request<Body>,
    bridge: Arc<Bridge>,
    max_body_bytes: usize,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    bridge.stats().record_request();

    let response = match respond(req, &method, &path, &bridge, max_body_bytes).await {
        Ok(resp) => resp,
        Err(resp) => {
            bridge.stats().record_error();
            resp
        }
    };
    tracing::debug!("{method} {path} -> {}", response.status().as_u16());
    Ok(response)
}

/// `Err` carries protocol-level failures; bridge errors are counted by
/// [`dispatch`] and come back as `Ok`.
async fn respond(
    req: Request<Body>,
    method: &Method,
    path: &str,
    bridge: &Arc<Bridge>,
    max_body_bytes: usize,
) -> Result<Response<Body>, Response<Body>> {
    let Some((expected, name)) = route(path) else {
        return Err(error_response(StatusCode::NOT_FOUND, format!("Not found: {path}")));
    };
    if *method != expected {
        return Err(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {method} not allowed for {path}"),
        ));
    }

    let body = if expected == Method::POST {
        let bytes = read_body(req, max_body_bytes).await?;
        serde_json::from_slice::<Value>(&bytes).map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                ProtocolError::InvalidJson(e.to_string()).to_string(),
            )
        })?
    } else {
        Value::Object(Map::new())
    };

    let command = Command::from_parts(name, body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let worker = Arc::clone(bridge);
    match tokio::task::spawn_blocking(move || dispatch(&worker, command)).await {
        Ok(Ok(result)) => {
            let body = if expected == Method::POST {
                with_success(result, true)
            } else {
                result
            };
            Ok(json_response(StatusCode::OK, &body))
        }
        Ok(Err(e)) => Ok(runtime_error_response(&e)),
        Err(join) => {
            tracing::error!("{method} {path} panicked: {join}");
            let body = serde_json::json!({
                "success": false,
                "error": "internal error",
                "detail": join.to_string(),
            });
            Err(json_response(StatusCode::INTERNAL_SERVER_ERROR, &body))
        }
    }
}

/// Buffers a request body of at most `limit` bytes.
async fn read_body(req: Request<Body>, limit: usize) -> Result<Vec<u8>, Response<Body>> {
    let too_large = |size: usize| {
        tracing::warn!("request body of {size} bytes exceeds the {limit} byte limit");
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body too large: limit is {limit} bytes"),
        )
    };

    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(length) = declared.filter(|&length| length > limit) {
        return Err(too_large(length));
    }

    let mut body = req.into_body();
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("cannot read body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(too_large(buf.len() + chunk.len()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
