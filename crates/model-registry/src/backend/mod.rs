// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend capability providers.
//!
//! Every inference engine sits behind the same two traits:
//!
//! - [`BackendProvider`]: `load(path, device) -> handle`, plus an
//!   availability probe run once at startup.
//! - [`ModelHandle`]: `describe() -> signature` and `infer(tensor)`.
//!
//! [`BackendTable`] is the set of providers compiled into (or injected into)
//! a registry; [`BackendAvailability`] is the read-only result of probing it.

pub mod native;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tensor_core::{Tensor, TensorSpec};

use crate::{BackendError, BackendKind, Device};

/// Declared inputs and outputs of a loaded model.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelSignature {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

/// A model loaded by a backend.
///
/// Handles are owned by exactly one [`crate::ModelRecord`] and are only
/// borrowed for the duration of a single call.
pub trait ModelHandle: Send + Sync {
    /// Input and output specs reported by the backend.
    fn describe(&self) -> &ModelSignature;

    /// Runs the model on an encoded input, returning one tensor per output.
    fn infer(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError>;

    /// Whether several samples can be stacked into one call.
    fn supports_batching(&self) -> bool {
        self.describe()
            .inputs
            .first()
            .is_some_and(TensorSpec::has_dynamic_batch)
    }

    /// Whether `infer` may be called from several threads at once.
    /// Handles returning `false` are serialized by their record.
    fn is_concurrent_safe(&self) -> bool {
        true
    }
}

/// Loads artifacts for one [`BackendKind`].
pub trait BackendProvider: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Checks that the engine behind this provider is usable.
    ///
    /// Called once when the availability table is built; an `Err` carries
    /// the reason for the log.
    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    /// Loads the artifact at `path` on `device`.
    fn load(&self, path: &Path, device: Device) -> Result<Box<dyn ModelHandle>, BackendError>;
}

/// The providers a registry can draw on, at most one per kind.
#[derive(Clone, Default)]
pub struct BackendTable {
    providers: BTreeMap<BackendKind, Arc<dyn BackendProvider>>,
}

impl BackendTable {
    /// An empty table: every backend probes as unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// The providers compiled into this build.
    pub fn builtin() -> Self {
        let table = Self::new().with_provider(native::NativeProvider);
        #[cfg(feature = "onnx")]
        let table = table.with_provider(onnx::OnnxProvider);
        table
    }

    /// Adds (or replaces) the provider for `provider.kind()`.
    pub fn with_provider(mut self, provider: impl BackendProvider + 'static) -> Self {
        self.providers.insert(provider.kind(), Arc::new(provider));
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn BackendProvider>> {
        self.providers.get(&kind)
    }

    /// Probes every known backend kind once.
    pub fn probe(&self) -> BackendAvailability {
        let mut table = BTreeMap::new();
        for kind in BackendKind::ALL {
            let available = match self.providers.get(&kind) {
                Some(provider) => match provider.probe() {
                    Ok(()) => {
                        tracing::info!("backend {kind}: available");
                        true
                    }
                    Err(reason) => {
                        tracing::warn!("backend {kind}: probe failed: {reason}");
                        false
                    }
                },
                None => {
                    tracing::debug!("backend {kind}: not compiled in");
                    false
                }
            };
            table.insert(kind, available);
        }
        BackendAvailability { table }
    }
}

impl std::fmt::Debug for BackendTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

/// Which backends passed their startup probe. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct BackendAvailability {
    table: BTreeMap<BackendKind, bool>,
}

impl BackendAvailability {
    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.table.get(&kind).copied().unwrap_or(false)
    }

    /// Available backends in preference order.
    pub fn available(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.is_available(*k))
            .collect()
    }

    /// The most preferred available backend, reported as the bridge's
    /// primary backend.
    pub fn primary(&self) -> Option<BackendKind> {
        self.available().first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BackendKind, bool)> + '_ {
        self.table.iter().map(|(k, v)| (*k, *v))
    }
}
