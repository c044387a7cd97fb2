// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Loaded model records.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tensor_core::{Tensor, TensorSpec};

use crate::{BackendError, BackendKind, Device, ModelFormat, ModelHandle, ModelSignature};

/// A model held by the registry.
///
/// Records are created on successful load, destroyed on unload, and never
/// mutated in place. The backend handle is owned exclusively by the record.
pub struct ModelRecord {
    model_id: String,
    backend: BackendKind,
    device: Device,
    format: ModelFormat,
    source_path: PathBuf,
    loaded_at: SystemTime,
    load_time: Duration,
    handle: Box<dyn ModelHandle>,
    /// Serializes `infer` for handles that are not concurrent-safe.
    invoke_lock: Mutex<()>,
}

impl ModelRecord {
    pub(crate) fn new(
        model_id: String,
        backend: BackendKind,
        device: Device,
        format: ModelFormat,
        source_path: PathBuf,
        load_time: Duration,
        handle: Box<dyn ModelHandle>,
    ) -> Self {
        Self {
            model_id,
            backend,
            device,
            format,
            source_path,
            loaded_at: SystemTime::now(),
            load_time,
            handle,
            invoke_lock: Mutex::new(()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn source_path(&self) -> &std::path::Path {
        &self.source_path
    }

    pub fn signature(&self) -> &ModelSignature {
        self.handle.describe()
    }

    /// The spec payloads are encoded against (the model's first input).
    pub fn input_spec(&self) -> Option<&TensorSpec> {
        self.signature().inputs.first()
    }

    pub fn output_specs(&self) -> &[TensorSpec] {
        &self.signature().outputs
    }

    pub fn supports_batching(&self) -> bool {
        self.handle.supports_batching()
    }

    /// Runs the backend once, holding the record's lock if the handle
    /// cannot run concurrently.
    pub fn invoke(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError> {
        if self.handle.is_concurrent_safe() {
            self.handle.infer(input)
        } else {
            let _guard = self
                .invoke_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.handle.infer(input)
        }
    }

    /// A serializable summary of this record.
    pub fn metadata(&self) -> ModelMetadata {
        let sig = self.signature();
        ModelMetadata {
            model_id: self.model_id.clone(),
            backend: self.backend,
            device: self.device,
            format: self.format,
            path: self.source_path.display().to_string(),
            loaded_at: self
                .loaded_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
            load_time_ms: self.load_time.as_secs_f64() * 1000.0,
            input_names: sig.inputs.iter().map(|s| s.name.clone()).collect(),
            output_names: sig.outputs.iter().map(|s| s.name.clone()).collect(),
            input_shapes: sig.inputs.iter().map(|s| s.shape.clone()).collect(),
            inputs: sig.inputs.clone(),
            outputs: sig.outputs.clone(),
        }
    }
}

impl std::fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRecord")
            .field("model_id", &self.model_id)
            .field("backend", &self.backend)
            .field("device", &self.device)
            .field("source_path", &self.source_path)
            .finish_non_exhaustive()
    }
}

/// What callers see of a loaded model.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub backend: BackendKind,
    pub device: Device,
    pub format: ModelFormat,
    pub path: String,
    /// Unix seconds.
    pub loaded_at: f64,
    pub load_time_ms: f64,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub input_shapes: Vec<Vec<Option<usize>>>,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}
