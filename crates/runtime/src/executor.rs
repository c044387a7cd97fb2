// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single and batched inference against registered models.
//!
//! The executor is synchronous: async front ends call it from their
//! blocking pool. A record is held by `Arc` for the duration of one call
//! only, so an unload racing a predict never frees a handle in use.

use std::sync::Arc;
use std::time::{Duration, Instant};

use model_registry::{BackendKind, ModelRecord, Registry};
use serde_json::Value;
use tensor_core::{codec, DecodedTensor, Tensor, TensorSpec};

use crate::{RuntimeError, Stats};

/// Outputs of one `predict` call.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub model_id: String,
    pub backend: BackendKind,
    /// One entry per model output, in declaration order.
    pub outputs: Vec<DecodedTensor>,
    pub elapsed: Duration,
}

/// Outputs of one `predict_batch` call.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub model_id: String,
    pub backend: BackendKind,
    /// `samples[i]` holds the outputs for input `i`.
    pub samples: Vec<Vec<DecodedTensor>>,
    pub elapsed: Duration,
    pub per_sample: Duration,
}

impl BatchResult {
    pub fn batch_size(&self) -> usize {
        self.samples.len()
    }
}

/// Runs encode, invoke and decode for registered models.
pub struct Executor {
    registry: Arc<Registry>,
    stats: Arc<Stats>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, stats: Arc<Stats>) -> Self {
        Self { registry, stats }
    }

    /// Runs one inference.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, codec errors for bad payloads, and
    /// [`RuntimeError::Backend`] when the backend fails.
    pub fn predict(&self, model_id: &str, raw: &Value) -> Result<InferenceResult, RuntimeError> {
        let record = self.registry.get(model_id)?;
        let spec = input_spec(&record)?;

        let start = Instant::now();
        let input = codec::encode(raw, spec)?;
        let outputs = invoke(&record, &input)?;
        let decoded = decode_outputs(&record, &outputs)?;
        let elapsed = start.elapsed();

        self.stats.record_inference(as_ms(elapsed));
        tracing::debug!(
            "predict {model_id}: {} outputs in {:.2}ms",
            decoded.len(),
            as_ms(elapsed)
        );

        Ok(InferenceResult {
            model_id: model_id.to_string(),
            backend: record.backend(),
            outputs: decoded,
            elapsed,
        })
    }

    /// Runs a batch of inferences. The batch succeeds or fails as a whole.
    ///
    /// Models whose first input has a dynamic leading dimension get one
    /// stacked backend call; others are called once per sample.
    pub fn predict_batch(
        &self,
        model_id: &str,
        inputs: &[Value],
    ) -> Result<BatchResult, RuntimeError> {
        if inputs.is_empty() {
            return Err(RuntimeError::InvalidInput(
                "inputs must be a non-empty list".to_string(),
            ));
        }
        let record = self.registry.get(model_id)?;
        let spec = input_spec(&record)?;
        let n = inputs.len();

        let start = Instant::now();
        let raw_samples: Vec<Vec<Tensor>> = if record.supports_batching() {
            let stacked = codec::encode_batch(inputs, spec)?;
            let outputs = invoke(&record, &stacked)?;
            let mut samples: Vec<Vec<Tensor>> = (0..n).map(|_| Vec::new()).collect();
            for output in &outputs {
                for (i, part) in codec::split_batch(output, n)?.into_iter().enumerate() {
                    samples[i].push(part);
                }
            }
            samples
        } else {
            let mut samples = Vec::with_capacity(n);
            for raw in inputs {
                let input = codec::encode(raw, spec)?;
                samples.push(invoke(&record, &input)?);
            }
            samples
        };
        let samples = raw_samples
            .iter()
            .map(|outputs| decode_outputs(&record, outputs))
            .collect::<Result<Vec<_>, _>>()?;
        let elapsed = start.elapsed();
        let per_sample = elapsed / n as u32;

        self.stats.record_batch(n, as_ms(per_sample));
        tracing::debug!(
            "batch_predict {model_id}: {n} samples in {:.2}ms",
            as_ms(elapsed)
        );

        Ok(BatchResult {
            model_id: model_id.to_string(),
            backend: record.backend(),
            samples,
            elapsed,
            per_sample,
        })
    }
}

pub(crate) fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn input_spec(record: &ModelRecord) -> Result<&TensorSpec, RuntimeError> {
    record.input_spec().ok_or_else(|| {
        RuntimeError::Internal(format!("model '{}' declares no inputs", record.model_id()))
    })
}

fn invoke(record: &ModelRecord, input: &Tensor) -> Result<Vec<Tensor>, RuntimeError> {
    record
        .invoke(input)
        .map_err(|source| RuntimeError::Backend {
            model_id: record.model_id().to_string(),
            source,
        })
}

/// Decodes each output against its declared spec. Outputs beyond the
/// declared list are rendered as-is under a positional name.
fn decode_outputs(
    record: &ModelRecord,
    outputs: &[Tensor],
) -> Result<Vec<DecodedTensor>, RuntimeError> {
    let specs = record.output_specs();
    outputs
        .iter()
        .enumerate()
        .map(|(i, tensor)| {
            let decoded = match specs.get(i) {
                Some(spec) => codec::decode(tensor, spec)?,
                None => codec::decode(
                    tensor,
                    &TensorSpec::new(format!("output_{i}"), Vec::new(), tensor.dtype()),
                )?,
            };
            Ok(decoded)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_registry::{
        BackendError, BackendProvider, BackendTable, Device, LoadRequest, ModelHandle,
        ModelSignature,
    };
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tensor_core::{DType, Shape};

    /// Doubles its input. Fixed batch of one unless `dynamic`.
    struct Doubler {
        signature: ModelSignature,
        calls: Arc<AtomicUsize>,
        fail_on_negative: bool,
    }

    impl ModelHandle for Doubler {
        fn describe(&self) -> &ModelSignature {
            &self.signature
        }

        fn infer(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let values = input.as_f32_slice()?;
            if self.fail_on_negative && values.iter().any(|v| *v < 0.0) {
                return Err(BackendError::Inference("negative input".into()));
            }
            let doubled: Vec<f32> = values.iter().map(|v| v * 2.0).collect();
            Ok(vec![Tensor::from_f32(input.shape().clone(), &doubled)?])
        }
    }

    struct DoublerProvider {
        dynamic: bool,
        calls: Arc<AtomicUsize>,
    }

    impl BackendProvider for DoublerProvider {
        fn kind(&self) -> BackendKind {
            BackendKind::Native
        }

        fn load(&self, _: &Path, _: Device) -> Result<Box<dyn ModelHandle>, BackendError> {
            let batch = if self.dynamic { None } else { Some(1) };
            let shape = vec![batch, Some(3)];
            Ok(Box::new(Doubler {
                signature: ModelSignature {
                    inputs: vec![TensorSpec::new("x", shape.clone(), DType::F32)],
                    outputs: vec![TensorSpec::new("y", shape, DType::F32)],
                },
                calls: Arc::clone(&self.calls),
                fail_on_negative: true,
            }))
        }
    }

    fn setup(dynamic: bool) -> (Executor, Arc<Stats>, Arc<AtomicUsize>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("double.safetensors");
        std::fs::write(&path, b"stub").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let table = BackendTable::new().with_provider(DoublerProvider {
            dynamic,
            calls: Arc::clone(&calls),
        });
        let registry = Arc::new(Registry::new(table));
        registry
            .load(&LoadRequest::new(&path).with_model_id("double"))
            .unwrap();

        let stats = Arc::new(Stats::new());
        (
            Executor::new(registry, Arc::clone(&stats)),
            stats,
            calls,
            dir,
        )
    }

    #[test]
    fn test_predict_adds_batch_dim() {
        let (exec, stats, _, _dir) = setup(true);
        let result = exec.predict("double", &json!([1.0, 2.0, 3.0])).unwrap();
        assert_eq!(result.backend, BackendKind::Native);
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].shape, Shape::matrix(1, 3));
        assert_eq!(result.outputs[0].data, json!([[2.0, 4.0, 6.0]]));
        assert_eq!(stats.snapshot().inference_total, 1);
    }

    #[test]
    fn test_predict_unknown_model() {
        let (exec, stats, _, _dir) = setup(true);
        let err = exec.predict("nope", &json!([1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Model nope not loaded");
        assert_eq!(stats.snapshot().inference_total, 0);
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let (exec, _, calls, _dir) = setup(true);
        let err = exec.predict("double", &json!([1.0, 2.0])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ShapeMismatch);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_batch_stacks_when_dynamic() {
        let (exec, stats, calls, _dir) = setup(true);
        let inputs = vec![json!([1.0, 1.0, 1.0]), json!([2.0, 2.0, 2.0])];
        let result = exec.predict_batch("double", &inputs).unwrap();
        assert_eq!(result.batch_size(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.samples[1][0].data, json!([[4.0, 4.0, 4.0]]));
        assert_eq!(stats.snapshot().inference_total, 2);
    }

    #[test]
    fn test_batch_loops_when_fixed() {
        let (exec, _, calls, _dir) = setup(false);
        let inputs = vec![json!([1.0, 1.0, 1.0]), json!([2.0, 2.0, 2.0]), json!([3.0, 3.0, 3.0])];
        let result = exec.predict_batch("double", &inputs).unwrap();
        assert_eq!(result.batch_size(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.samples[2][0].data, json!([[6.0, 6.0, 6.0]]));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let (exec, stats, calls, _dir) = setup(false);
        let inputs = vec![json!([1.0, 1.0, 1.0]), json!([-1.0, 0.0, 0.0]), json!([3.0, 3.0, 3.0])];
        let err = exec.predict_batch("double", &inputs).unwrap_err();
        assert!(matches!(err, RuntimeError::Backend { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.snapshot().inference_total, 0);
    }

    #[test]
    fn test_empty_batch_is_invalid() {
        let (exec, _, _, _dir) = setup(true);
        let err = exec.predict_batch("double", &[]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
