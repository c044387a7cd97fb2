// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model registry: `model_id -> ModelRecord`.
//!
//! Loads are serialized by a dedicated mutex so the duplicate check, the
//! (slow) backend load and the insert are atomic with respect to other
//! loads. The map itself sits behind an `RwLock` that is only held for
//! lookups and inserts, so lookups for inference never wait on a load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use crate::{
    BackendAvailability, BackendPreference, BackendTable, FallbackStep, ModelFormat,
    ModelMetadata, ModelRecord, RegistryError,
};

/// A request to load one model.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub source_path: PathBuf,
    /// Defaults to the source file's name when absent or empty.
    pub model_id: Option<String>,
    pub backend: BackendPreference,
}

impl LoadRequest {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            model_id: None,
            backend: BackendPreference::Auto,
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    /// The id the model will be registered under.
    pub fn resolved_model_id(&self) -> Result<String, RegistryError> {
        if let Some(id) = self.model_id.as_deref().map(str::trim) {
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RegistryError::InvalidModelId(format!(
                    "cannot derive a model id from '{}'",
                    self.source_path.display()
                ))
            })
    }
}

/// Result of [`Registry::load`].
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub metadata: ModelMetadata,
    /// `true` when the id was already registered and nothing was loaded.
    pub already_loaded: bool,
}

#[derive(Default)]
struct Models {
    order: Vec<String>,
    by_id: HashMap<String, Arc<ModelRecord>>,
}

/// Owns every loaded model and the backend selection policy.
pub struct Registry {
    table: BackendTable,
    availability: BackendAvailability,
    models: RwLock<Models>,
    load_lock: Mutex<()>,
}

impl Registry {
    /// Creates a registry over `table`, probing every backend once.
    pub fn new(table: BackendTable) -> Self {
        let availability = table.probe();
        Self {
            table,
            availability,
            models: RwLock::new(Models::default()),
            load_lock: Mutex::new(()),
        }
    }

    /// A registry over the providers compiled into this build.
    pub fn with_builtin_backends() -> Self {
        Self::new(BackendTable::builtin())
    }

    pub fn availability(&self) -> &BackendAvailability {
        &self.availability
    }

    /// Loads a model, walking the format's fallback chain.
    ///
    /// Loading an id that is already registered returns the existing
    /// metadata without touching any backend.
    ///
    /// # Errors
    /// - [`RegistryError::FileNotFound`] if `source_path` does not exist.
    /// - [`RegistryError::UnsupportedFormat`] if the artifact is not
    ///   recognised, or the preferred backend cannot read it.
    /// - [`RegistryError::BackendUnavailable`] if every step failed.
    pub fn load(&self, request: &LoadRequest) -> Result<LoadOutcome, RegistryError> {
        let _serial = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let model_id = request.resolved_model_id()?;
        if let Some(existing) = self.read().by_id.get(&model_id) {
            tracing::info!("model '{model_id}' already loaded, skipping");
            return Ok(LoadOutcome {
                metadata: existing.metadata(),
                already_loaded: true,
            });
        }

        let path = request.source_path.as_path();
        if !path.exists() {
            return Err(RegistryError::FileNotFound(path.to_path_buf()));
        }

        let format = ModelFormat::detect(path)?;
        let steps = select_steps(format, request.backend)?;
        let record = self.load_with_fallback(&model_id, path, format, &steps)?;
        let metadata = record.metadata();

        let mut models = self.write();
        models.order.push(model_id.clone());
        models.by_id.insert(model_id, Arc::new(record));

        Ok(LoadOutcome {
            metadata,
            already_loaded: false,
        })
    }

    fn load_with_fallback(
        &self,
        model_id: &str,
        path: &Path,
        format: ModelFormat,
        steps: &[FallbackStep],
    ) -> Result<ModelRecord, RegistryError> {
        let started = Instant::now();
        let mut attempts = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            let label = step.to_string();
            let provider = match self.table.get(step.backend) {
                Some(p) if self.availability.is_available(step.backend) => p,
                _ => {
                    tracing::debug!("skipping {label} for '{model_id}': unavailable");
                    attempts.push(format!("{label}: unavailable"));
                    continue;
                }
            };

            match provider.load(path, step.device) {
                Ok(handle) => {
                    let load_time = started.elapsed();
                    tracing::info!(
                        "loaded model '{model_id}' from {} via {label} in {:.1} ms",
                        path.display(),
                        load_time.as_secs_f64() * 1000.0,
                    );
                    return Ok(ModelRecord::new(
                        model_id.to_string(),
                        step.backend,
                        step.device,
                        format,
                        path.to_path_buf(),
                        load_time,
                        handle,
                    ));
                }
                Err(e) => {
                    if i + 1 < steps.len() {
                        tracing::warn!("{label} failed for '{model_id}': {e}; falling back");
                    } else {
                        tracing::warn!("{label} failed for '{model_id}': {e}");
                    }
                    attempts.push(format!("{label}: {e}"));
                }
            }
        }

        Err(RegistryError::BackendUnavailable {
            path: path.to_path_buf(),
            attempts: attempts.join("; "),
        })
    }

    /// Removes a model. The id is unusable as soon as this returns; the
    /// backend handle is released once in-flight calls finish with it.
    pub fn unload(&self, model_id: &str) -> Result<ModelMetadata, RegistryError> {
        let mut models = self.write();
        let record = models
            .by_id
            .remove(model_id)
            .ok_or_else(|| RegistryError::NotLoaded(model_id.to_string()))?;
        models.order.retain(|id| id != model_id);
        tracing::info!("unloaded model '{model_id}'");
        Ok(record.metadata())
    }

    pub fn get(&self, model_id: &str) -> Result<Arc<ModelRecord>, RegistryError> {
        self.read()
            .by_id
            .get(model_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotLoaded(model_id.to_string()))
    }

    /// Loaded model ids in load order.
    pub fn list(&self) -> Vec<String> {
        self.read().order.clone()
    }

    /// Loaded records in load order.
    pub fn records(&self) -> Vec<Arc<ModelRecord>> {
        let models = self.read();
        models
            .order
            .iter()
            .filter_map(|id| models.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Models> {
        self.models.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Models> {
        self.models.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.table)
            .field("models", &self.list())
            .finish()
    }
}

fn select_steps(
    format: ModelFormat,
    preference: BackendPreference,
) -> Result<Vec<FallbackStep>, RegistryError> {
    let chain = format.fallback_chain();
    match preference {
        BackendPreference::Auto => Ok(chain.to_vec()),
        BackendPreference::Only(kind) => {
            let steps: Vec<_> = chain.iter().filter(|s| s.backend == kind).copied().collect();
            if steps.is_empty() {
                Err(RegistryError::UnsupportedFormat(format!(
                    "backend {kind} cannot load {format} models"
                )))
            } else {
                Ok(steps)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tensor_core::{DType, Tensor, TensorSpec};

    use super::*;
    use crate::{BackendError, BackendKind, BackendProvider, Device, ModelHandle, ModelSignature};

    struct EchoHandle {
        signature: ModelSignature,
    }

    impl ModelHandle for EchoHandle {
        fn describe(&self) -> &ModelSignature {
            &self.signature
        }

        fn infer(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError> {
            Ok(vec![input.clone()])
        }
    }

    /// Succeeds only on `device`; counts every load call.
    struct FakeProvider {
        kind: BackendKind,
        device: Device,
        loads: Arc<AtomicUsize>,
    }

    impl BackendProvider for FakeProvider {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn load(&self, _: &Path, device: Device) -> Result<Box<dyn ModelHandle>, BackendError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if device != self.device {
                return Err(BackendError::DeviceUnsupported {
                    backend: self.kind,
                    device,
                });
            }
            let spec = TensorSpec::new("x", vec![None, Some(2)], DType::F32);
            Ok(Box::new(EchoHandle {
                signature: ModelSignature {
                    inputs: vec![spec.clone()],
                    outputs: vec![spec],
                },
            }))
        }
    }

    fn fake(kind: BackendKind, device: Device) -> (FakeProvider, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let provider = FakeProvider {
            kind,
            device,
            loads: Arc::clone(&loads),
        };
        (provider, loads)
    }

    fn onnx_file(dir: &Path) -> PathBuf {
        let path = dir.join("model.onnx");
        std::fs::write(&path, b"not really onnx").unwrap();
        path
    }

    #[test]
    fn test_duplicate_load_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (onnx, loads) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(onnx));
        let request = LoadRequest::new(onnx_file(dir.path())).with_model_id("demo");

        let first = registry.load(&request).unwrap();
        let second = registry.load(&request).unwrap();

        assert!(!first.already_loaded);
        assert!(second.already_loaded);
        assert_eq!(first.metadata, second.metadata);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.list(), vec!["demo".to_string()]);
    }

    #[test]
    fn test_falls_back_through_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (max, max_loads) = fake(BackendKind::Max, Device::Cpu);
        let (onnx, _) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(max).with_provider(onnx));

        let outcome = registry.load(&LoadRequest::new(onnx_file(dir.path()))).unwrap();

        // Max@accelerator fails, Max@cpu succeeds.
        assert_eq!(max_loads.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.metadata.backend, BackendKind::Max);
        assert_eq!(outcome.metadata.device, Device::Cpu);
        assert_eq!(outcome.metadata.model_id, "model.onnx");
    }

    #[test]
    fn test_unavailable_steps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (onnx, _) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(onnx));

        let outcome = registry.load(&LoadRequest::new(onnx_file(dir.path()))).unwrap();
        assert_eq!(outcome.metadata.backend, BackendKind::Onnx);
    }

    #[test]
    fn test_exhausted_chain_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (onnx, _) = fake(BackendKind::Onnx, Device::Accelerator);
        let registry = Registry::new(BackendTable::new().with_provider(onnx));

        let err = registry
            .load(&LoadRequest::new(onnx_file(dir.path())))
            .unwrap_err();
        match err {
            RegistryError::BackendUnavailable { attempts, .. } => {
                assert!(attempts.contains("max@accelerator: unavailable"));
                assert!(attempts.contains("onnx@cpu"));
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_explicit_backend_limits_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (max, _) = fake(BackendKind::Max, Device::Cpu);
        let (onnx, _) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(max).with_provider(onnx));
        let path = onnx_file(dir.path());

        let outcome = registry
            .load(&LoadRequest::new(&path).with_backend(BackendPreference::Only(BackendKind::Onnx)))
            .unwrap();
        assert_eq!(outcome.metadata.backend, BackendKind::Onnx);

        let err = registry
            .load(
                &LoadRequest::new(&path)
                    .with_model_id("other")
                    .with_backend(BackendPreference::Only(BackendKind::Sklearn)),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_names_path() {
        let registry = Registry::new(BackendTable::new());
        let err = registry
            .load(&LoadRequest::new("/no/such/model.onnx"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::FileNotFound(_)));
        assert!(err.to_string().contains("/no/such/model.onnx"));
    }

    #[test]
    fn test_unload_then_get_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let (onnx, _) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(onnx));
        registry
            .load(&LoadRequest::new(onnx_file(dir.path())).with_model_id("demo"))
            .unwrap();

        let held = registry.get("demo").unwrap();
        registry.unload("demo").unwrap();

        assert!(matches!(registry.get("demo"), Err(RegistryError::NotLoaded(_))));
        assert!(matches!(registry.unload("demo"), Err(RegistryError::NotLoaded(_))));
        // An in-flight holder can still finish its call.
        assert_eq!(held.model_id(), "demo");
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let (onnx, _) = fake(BackendKind::Onnx, Device::Cpu);
        let registry = Registry::new(BackendTable::new().with_provider(onnx));
        let path = onnx_file(dir.path());
        for id in ["c", "a", "b"] {
            registry.load(&LoadRequest::new(&path).with_model_id(id)).unwrap();
        }
        registry.unload("a").unwrap();
        assert_eq!(registry.list(), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_blank_model_id_uses_file_name() {
        let request = LoadRequest::new("/models/demo/model.onnx").with_model_id("  ");
        assert_eq!(request.resolved_model_id().unwrap(), "model.onnx");
    }
}
