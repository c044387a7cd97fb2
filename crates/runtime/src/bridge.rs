// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The transport-agnostic bridge service.
//!
//! [`Bridge`] owns the registry, executor, stats and lifecycle, and exposes
//! every operation as a plain method returning a serializable response.
//! The stream and HTTP front ends only parse requests, call these methods,
//! and wrap the result in their own envelope.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use model_registry::{
    BackendAvailability, BackendKind, BackendPreference, Device, LoadRequest, ModelFormat,
    ModelMetadata, Registry,
};
use serde_json::Value;
use tensor_core::{DType, DecodedTensor, Shape};

use crate::config::{BridgeConfig, PreloadModel};
use crate::executor::as_ms;
use crate::stats::round2;
use crate::{BridgeState, Executor, Lifecycle, RuntimeError, Stats, StatsSnapshot};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Requests ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct LoadParams {
    pub model_path: PathBuf,
    #[serde(default)]
    pub model_id: Option<String>,
    /// `"auto"` or a backend kind; the configured default when absent.
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PredictParams {
    pub model_id: String,
    pub input_data: Value,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct BatchPredictParams {
    pub model_id: String,
    pub inputs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct UnloadParams {
    pub model_id: String,
}

// ── Responses ──────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadResponse {
    pub message: String,
    pub already_loaded: bool,
    #[serde(flatten)]
    pub model: ModelMetadata,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UnloadResponse {
    pub message: String,
    pub model_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PredictResponse {
    pub model_id: String,
    /// The single output's value, or one value per output.
    pub prediction: Value,
    /// Shape of the first output.
    pub shape: Shape,
    /// Element type of the first output.
    pub dtype: DType,
    pub output_names: Vec<String>,
    #[serde(serialize_with = "round2")]
    pub inference_time_ms: f64,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchPredictResponse {
    pub model_id: String,
    pub predictions: Vec<Value>,
    pub batch_size: usize,
    #[serde(serialize_with = "round2")]
    pub inference_time_ms: f64,
    #[serde(serialize_with = "round2")]
    pub per_sample_ms: f64,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelInfo {
    pub backend: BackendKind,
    pub device: Device,
    pub format: ModelFormat,
    pub path: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusResponse {
    pub status: BridgeState,
    pub version: &'static str,
    /// The most preferred available backend.
    pub backend: Option<BackendKind>,
    pub backends: BackendAvailability,
    /// Loaded ids in load order.
    pub models: Vec<String>,
    pub model_types: BTreeMap<String, BackendKind>,
    pub model_info: BTreeMap<String, ModelInfo>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// `"healthy"` while ready, otherwise the lifecycle state.
    pub status: &'static str,
    pub state: BridgeState,
    pub backend: Option<BackendKind>,
    pub models_loaded: usize,
}

/// Announced by the stream transport before it reads any input.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadyResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub backend: Option<BackendKind>,
    pub backends: BackendAvailability,
    pub models: Vec<String>,
}

// ── Bridge ─────────────────────────────────────────────────────

/// Shared state behind every front end.
pub struct Bridge {
    registry: Arc<Registry>,
    executor: Executor,
    stats: Arc<Stats>,
    lifecycle: Arc<Lifecycle>,
    default_backend: BackendPreference,
}

impl Bridge {
    /// A bridge over an existing registry.
    pub fn new(registry: Arc<Registry>, default_backend: BackendPreference) -> Self {
        let stats = Arc::new(Stats::new());
        Self {
            executor: Executor::new(Arc::clone(&registry), Arc::clone(&stats)),
            registry,
            stats,
            lifecycle: Arc::new(Lifecycle::new()),
            default_backend,
        }
    }

    /// A bridge over the built-in backends, configured from `config`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, RuntimeError> {
        let preference = config.backend_preference()?;
        Ok(Self::new(
            Arc::new(Registry::with_builtin_backends()),
            preference,
        ))
    }

    /// Preloads models and moves the bridge to `Ready`.
    ///
    /// A model that fails to preload is logged and skipped. Returns the
    /// number of models loaded.
    pub fn start(&self, preload: &[PreloadModel]) -> Result<usize, RuntimeError> {
        let mut loaded = 0;
        for entry in preload {
            let params = LoadParams {
                model_path: entry.model_path.clone(),
                model_id: entry.model_id.clone(),
                backend: entry.backend.clone(),
            };
            match self.load(params) {
                Ok(resp) => {
                    tracing::info!("preloaded '{}' ({})", resp.model.model_id, resp.model.backend);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("preload of {} failed: {e}", entry.model_path.display());
                }
            }
        }
        self.lifecycle.mark_ready()?;
        Ok(loaded)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Counts a failed operation in `errors_total`.
    pub fn observe<T>(&self, result: Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        if let Err(e) = &result {
            self.stats.record_error();
            tracing::debug!("request failed ({:?}): {e}", e.kind());
        }
        result
    }

    pub fn load(&self, params: LoadParams) -> Result<LoadResponse, RuntimeError> {
        let backend = match params.backend.as_deref() {
            Some(name) => name.parse().map_err(RuntimeError::InvalidInput)?,
            None => self.default_backend,
        };
        let mut request = LoadRequest::new(params.model_path).with_backend(backend);
        if let Some(id) = params.model_id {
            request = request.with_model_id(id);
        }

        let outcome = self.registry.load(&request)?;
        let message = if outcome.already_loaded {
            format!("Model {} already loaded", outcome.metadata.model_id)
        } else {
            format!("Model {} loaded successfully", outcome.metadata.model_id)
        };
        Ok(LoadResponse {
            message,
            already_loaded: outcome.already_loaded,
            model: outcome.metadata,
        })
    }

    pub fn unload(&self, model_id: &str) -> Result<UnloadResponse, RuntimeError> {
        let meta = self.registry.unload(model_id)?;
        Ok(UnloadResponse {
            message: format!("Model {} unloaded", meta.model_id),
            model_id: meta.model_id,
        })
    }

    pub fn predict(&self, model_id: &str, input: &Value) -> Result<PredictResponse, RuntimeError> {
        let result = self.executor.predict(model_id, input)?;
        let (prediction, shape, dtype) = render(&result.outputs, model_id)?;
        Ok(PredictResponse {
            model_id: result.model_id,
            prediction,
            shape,
            dtype,
            output_names: result.outputs.iter().map(|o| o.name.clone()).collect(),
            inference_time_ms: as_ms(result.elapsed),
            backend: result.backend,
        })
    }

    pub fn predict_batch(
        &self,
        model_id: &str,
        inputs: &[Value],
    ) -> Result<BatchPredictResponse, RuntimeError> {
        let result = self.executor.predict_batch(model_id, inputs)?;
        let predictions = result
            .samples
            .iter()
            .map(|outputs| render(outputs, model_id).map(|(prediction, _, _)| prediction))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchPredictResponse {
            batch_size: result.batch_size(),
            model_id: result.model_id,
            predictions,
            inference_time_ms: as_ms(result.elapsed),
            per_sample_ms: as_ms(result.per_sample),
            backend: result.backend,
        })
    }

    pub fn status(&self) -> StatusResponse {
        let mut model_types = BTreeMap::new();
        let mut model_info = BTreeMap::new();
        for record in self.registry.records() {
            let meta = record.metadata();
            model_types.insert(meta.model_id.clone(), meta.backend);
            model_info.insert(
                meta.model_id,
                ModelInfo {
                    backend: meta.backend,
                    device: meta.device,
                    format: meta.format,
                    path: meta.path,
                },
            );
        }
        let availability = self.registry.availability();
        StatusResponse {
            status: self.lifecycle.state(),
            version: VERSION,
            backend: availability.primary(),
            backends: availability.clone(),
            models: self.registry.list(),
            model_types,
            model_info,
            stats: self.stats.snapshot(),
        }
    }

    pub fn health(&self) -> HealthResponse {
        let state = self.lifecycle.state();
        HealthResponse {
            status: if state == BridgeState::Ready {
                "healthy"
            } else {
                state.as_str()
            },
            state,
            backend: self.registry.availability().primary(),
            models_loaded: self.registry.len(),
        }
    }

    pub fn ready(&self) -> ReadyResponse {
        let availability = self.registry.availability();
        ReadyResponse {
            message: "ML bridge ready",
            version: VERSION,
            backend: availability.primary(),
            backends: availability.clone(),
            models: self.registry.list(),
        }
    }
}

/// Collapses decoded outputs into the `prediction` value: the bare value
/// for single-output models, a list otherwise.
fn render(outputs: &[DecodedTensor], model_id: &str) -> Result<(Value, Shape, DType), RuntimeError> {
    let first = outputs.first().ok_or_else(|| {
        RuntimeError::Internal(format!("model '{model_id}' produced no outputs"))
    })?;
    let prediction = if outputs.len() == 1 {
        first.data.clone()
    } else {
        Value::Array(outputs.iter().map(|o| o.data.clone()).collect())
    };
    Ok((prediction, first.shape.clone(), first.dtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_registry::DenseModelWriter;
    use serde_json::json;

    fn sum_model(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("sum.safetensors");
        DenseModelWriter::new()
            .layer(vec![1.0; 5], 5, 1, None)
            .metadata("activation", "none")
            .write(&path)
            .unwrap();
        path
    }

    fn bridge() -> Bridge {
        Bridge::new(Arc::new(Registry::with_builtin_backends()), BackendPreference::Auto)
    }

    fn load_params(path: PathBuf, id: &str) -> LoadParams {
        LoadParams {
            model_path: path,
            model_id: Some(id.into()),
            backend: None,
        }
    }

    #[test]
    fn test_start_moves_to_ready() {
        let b = bridge();
        assert_eq!(b.health().status, "starting");
        assert_eq!(b.start(&[]).unwrap(), 0);
        assert_eq!(b.health().status, "healthy");
    }

    #[test]
    fn test_start_skips_failed_preload() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        let preload = vec![
            PreloadModel {
                model_path: sum_model(dir.path()),
                model_id: Some("sum".into()),
                backend: None,
            },
            PreloadModel {
                model_path: dir.path().join("missing.onnx"),
                model_id: None,
                backend: None,
            },
        ];
        assert_eq!(b.start(&preload).unwrap(), 1);
        assert_eq!(b.registry().list(), vec!["sum".to_string()]);
        assert!(b.lifecycle().is_ready());
    }

    #[test]
    fn test_load_twice_reports_already_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = sum_model(dir.path());
        let b = bridge();
        let first = b.load(load_params(path.clone(), "sum")).unwrap();
        let second = b.load(load_params(path, "sum")).unwrap();
        assert!(!first.already_loaded);
        assert!(second.already_loaded);
        assert_eq!(first.model, second.model);
        assert!(second.message.contains("already loaded"));
    }

    #[test]
    fn test_load_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        let mut params = load_params(sum_model(dir.path()), "sum");
        params.backend = Some("cuda".into());
        let err = b.load(params).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_predict_response_shape() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        b.load(load_params(sum_model(dir.path()), "sum")).unwrap();

        let resp = b.predict("sum", &json!([0.5, 0.5, 0.5, 0.5, 0.5])).unwrap();
        assert_eq!(resp.prediction, json!([[2.5]]));
        assert_eq!(resp.shape, Shape::matrix(1, 1));
        assert_eq!(resp.dtype, DType::F32);
        assert_eq!(resp.backend, BackendKind::Native);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["shape"], json!([1, 1]));
        assert_eq!(json["dtype"], "f32");
    }

    #[test]
    fn test_batch_response() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        b.load(load_params(sum_model(dir.path()), "sum")).unwrap();

        let inputs = vec![json!([1, 1, 1, 1, 1]), json!([[2, 2, 2, 2, 2]])];
        let resp = b.predict_batch("sum", &inputs).unwrap();
        assert_eq!(resp.batch_size, 2);
        assert_eq!(resp.predictions, vec![json!([[5.0]]), json!([[10.0]])]);
        assert_eq!(b.stats().snapshot().inference_total, 2);
    }

    #[test]
    fn test_unload_then_predict_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        b.load(load_params(sum_model(dir.path()), "sum")).unwrap();
        assert_eq!(b.unload("sum").unwrap().model_id, "sum");

        let err = b.predict("sum", &json!([1, 1, 1, 1, 1])).unwrap_err();
        assert!(err.to_string().contains("not loaded"));
        assert!(matches!(b.unload("sum"), Err(RuntimeError::Registry(_))));
    }

    #[test]
    fn test_observe_counts_errors() {
        let b = bridge();
        let _ = b.observe(b.predict("ghost", &json!([1])));
        let _ = b.observe(b.unload("ghost"));
        assert_eq!(b.stats().snapshot().errors_total, 2);
    }

    #[test]
    fn test_status_lists_models() {
        let dir = tempfile::tempdir().unwrap();
        let b = bridge();
        b.start(&[]).unwrap();
        b.load(load_params(sum_model(dir.path()), "sum")).unwrap();

        let status = serde_json::to_value(b.status()).unwrap();
        assert_eq!(status["status"], "ready");
        assert_eq!(status["version"], VERSION);
        assert_eq!(status["models"], json!(["sum"]));
        assert_eq!(status["model_types"]["sum"], "native");
        assert_eq!(status["model_info"]["sum"]["device"], "cpu");
        assert_eq!(status["backends"]["native"], true);
        assert!(status["stats"]["uptime_seconds"].is_number());
    }

    #[test]
    fn test_params_deserialize() {
        let p: LoadParams = serde_json::from_value(json!({"model_path": "/m.onnx"})).unwrap();
        assert_eq!(p.model_id, None);
        assert!(serde_json::from_value::<PredictParams>(json!({"model_id": "m"})).is_err());
    }
}
