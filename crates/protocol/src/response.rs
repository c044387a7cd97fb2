// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Response envelopes.

use hyper::{Body, Response, StatusCode};
use runtime::RuntimeError;
use serde_json::{json, Value};

use crate::command::with_success;

/// One line written by the stream transport.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamResponse {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Serializes to a single line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"id":{},"success":false,"error":"cannot serialize response: {e}"}}"#,
                json!(self.id)
            )
        })
    }
}

/// A JSON HTTP response.
pub fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("cache-control", "no-cache")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|e| {
            tracing::error!("failed to build response: {e}");
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
}

/// `{"success": false, "error": ...}` with the given status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    json_response(status, &with_success(json!({ "error": message.into() }), false))
}

/// Maps a [`RuntimeError`] to its status code. Internal errors carry a
/// `detail` field with the debug description.
pub fn runtime_error_response(e: &RuntimeError) -> Response<Body> {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = json!({ "error": e.to_string(), "kind": e.kind() });
    if e.is_internal() {
        body["detail"] = Value::String(format!("{e:?}"));
    }
    json_response(status, &with_success(body, false))
}
