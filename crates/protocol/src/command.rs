// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Commands shared by both transports and their dispatch onto a [`Bridge`].

use runtime::{
    BatchPredictParams, Bridge, LoadParams, PredictParams, RuntimeError, UnloadParams,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::ProtocolError;

/// Id used when a stream request carries none.
pub const DEFAULT_ID: &str = "unknown";
/// Id used for lines that are not valid JSON.
pub const ERROR_ID: &str = "error";

/// One bridge operation with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(LoadParams),
    Predict(PredictParams),
    BatchPredict(BatchPredictParams),
    Unload(UnloadParams),
    Status,
    Health,
    Ping,
    Shutdown,
}

impl Command {
    /// Builds a command from its wire name and a JSON object holding its
    /// fields. Unrelated fields are ignored.
    pub fn from_parts(name: &str, body: Value) -> Result<Self, ProtocolError> {
        match name {
            "load_model" => params(name, body).map(Self::Load),
            "predict" => params(name, body).map(Self::Predict),
            "batch_predict" => params(name, body).map(Self::BatchPredict),
            "unload_model" => params(name, body).map(Self::Unload),
            "status" => Ok(Self::Status),
            "health" => Ok(Self::Health),
            "ping" => Ok(Self::Ping),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_model",
            Self::Predict(_) => "predict",
            Self::BatchPredict(_) => "batch_predict",
            Self::Unload(_) => "unload_model",
            Self::Status => "status",
            Self::Health => "health",
            Self::Ping => "ping",
            Self::Shutdown => "shutdown",
        }
    }
}

fn params<T: DeserializeOwned>(command: &str, body: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(body).map_err(|e| ProtocolError::InvalidParams {
        command: command.to_string(),
        detail: e.to_string(),
    })
}

/// A parsed stream line.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub id: String,
    pub command: Command,
}

/// A stream line that could not be turned into a [`Command`].
#[derive(Debug)]
pub struct Rejected {
    /// The request id, `"error"` when the line was not JSON.
    pub id: String,
    pub error: ProtocolError,
}

/// Parses one line of the stream transport.
pub fn parse_line(line: &str) -> Result<StreamRequest, Rejected> {
    let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
        id: ERROR_ID.to_string(),
        error: ProtocolError::InvalidJson(e.to_string()),
    })?;
    let Value::Object(mut fields) = value else {
        return Err(Rejected {
            id: DEFAULT_ID.to_string(),
            error: ProtocolError::NotAnObject,
        });
    };

    let id = match fields.remove("id") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => DEFAULT_ID.to_string(),
        Some(other) => other.to_string(),
    };
    let name = match fields.remove("command") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => {
            return Err(Rejected {
                id,
                error: ProtocolError::MissingCommand,
            })
        }
        Some(other) => other.to_string(),
    };

    match Command::from_parts(&name, Value::Object(fields)) {
        Ok(command) => Ok(StreamRequest { id, command }),
        Err(error) => Err(Rejected { id, error }),
    }
}

/// Runs `command` against `bridge`, counting failures in the bridge stats.
///
/// Blocking: backend calls run on the calling thread.
pub fn dispatch(bridge: &Bridge, command: Command) -> Result<Value, RuntimeError> {
    tracing::debug!("dispatch {}", command.name());
    let result = match command {
        Command::Load(p) => bridge.load(p).and_then(to_value),
        Command::Predict(p) => bridge.predict(&p.model_id, &p.input_data).and_then(to_value),
        Command::BatchPredict(p) => bridge.predict_batch(&p.model_id, &p.inputs).and_then(to_value),
        Command::Unload(p) => bridge.unload(&p.model_id).and_then(to_value),
        Command::Status => to_value(bridge.status()),
        Command::Health => to_value(bridge.health()),
        Command::Ping => Ok(json!({ "message": "pong" })),
        Command::Shutdown => Ok(json!({ "message": "Shutting down" })),
    };
    bridge.observe(result)
}

fn to_value<T: serde::Serialize>(response: T) -> Result<Value, RuntimeError> {
    serde_json::to_value(response)
        .map_err(|e| RuntimeError::Internal(format!("cannot serialize response: {e}")))
}

/// Adds `"success": true` in front of an object's fields.
pub(crate) fn with_success(value: Value, success: bool) -> Value {
    let mut out = Map::new();
    out.insert("success".to_string(), Value::Bool(success));
    match value {
        Value::Object(fields) => out.extend(fields),
        other => {
            out.insert("result".to_string(), other);
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let req = parse_line(r#"{"id":"1","command":"predict","model_id":"m","input_data":[1,2]}"#)
            .unwrap();
        assert_eq!(req.id, "1");
        match req.command {
            Command::Predict(p) => {
                assert_eq!(p.model_id, "m");
                assert_eq!(p.input_data, json!([1, 2]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_id_defaults() {
        let req = parse_line(r#"{"command":"ping"}"#).unwrap();
        assert_eq!(req.id, DEFAULT_ID);
        assert_eq!(req.command, Command::Ping);
    }

    #[test]
    fn test_numeric_id_is_kept() {
        let req = parse_line(r#"{"id":7,"command":"status"}"#).unwrap();
        assert_eq!(req.id, "7");
    }

    #[test]
    fn test_invalid_json() {
        let rejected = parse_line("{not json").unwrap_err();
        assert_eq!(rejected.id, ERROR_ID);
        assert!(rejected.error.to_string().starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_unknown_command_keeps_id() {
        let rejected = parse_line(r#"{"id":"x","command":"explode"}"#).unwrap_err();
        assert_eq!(rejected.id, "x");
        assert_eq!(rejected.error.to_string(), "Unknown command: explode");
    }

    #[test]
    fn test_missing_params() {
        let rejected = parse_line(r#"{"id":"x","command":"unload_model"}"#).unwrap_err();
        assert!(matches!(rejected.error, ProtocolError::InvalidParams { .. }));
    }

    #[test]
    fn test_non_object_rejected() {
        let rejected = parse_line("[1,2,3]").unwrap_err();
        assert!(matches!(rejected.error, ProtocolError::NotAnObject));
    }

    #[test]
    fn test_with_success() {
        let v = with_success(json!({"message": "ok"}), true);
        assert_eq!(v, json!({"success": true, "message": "ok"}));
    }
}
