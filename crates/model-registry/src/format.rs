// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Artifact format detection and per-format fallback chains.
//!
//! The format table is static: every recognised artifact maps to exactly one
//! [`ModelFormat`], and every format carries an ordered list of
//! `(backend, device)` steps. The registry walks that list until one step
//! loads the model.

use std::fmt;
use std::path::Path;

use crate::{BackendKind, Device, RegistryError};

/// Saved-model directories are recognised by this file.
const SAVED_MODEL_FILE: &str = "saved_model.pb";

/// Browser-format models are recognised by this file.
const TFJS_MODEL_FILE: &str = "model.json";

/// Suffix the edge TPU compiler gives its output.
const EDGETPU_SUFFIX: &str = "_edgetpu.tflite";

/// A model artifact family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Onnx,
    EdgeTpuTfLite,
    TfLite,
    SavedModel,
    TfJs,
    Pickle,
    Joblib,
    Keras,
    SafeTensors,
}

/// One attempt in a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackStep {
    pub backend: BackendKind,
    pub device: Device,
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.backend, self.device)
    }
}

const fn step(backend: BackendKind, device: Device) -> FallbackStep {
    FallbackStep { backend, device }
}

const ONNX_CHAIN: &[FallbackStep] = &[
    step(BackendKind::Max, Device::Accelerator),
    step(BackendKind::Max, Device::Cpu),
    step(BackendKind::Onnx, Device::Cpu),
];
const EDGETPU_CHAIN: &[FallbackStep] = &[
    step(BackendKind::EdgeTpu, Device::Accelerator),
    step(BackendKind::TfLite, Device::Cpu),
];
const TFLITE_CHAIN: &[FallbackStep] = &[step(BackendKind::TfLite, Device::Cpu)];
const SAVED_MODEL_CHAIN: &[FallbackStep] = &[
    step(BackendKind::TensorFlow, Device::Accelerator),
    step(BackendKind::TensorFlow, Device::Cpu),
];
const TFJS_CHAIN: &[FallbackStep] = &[step(BackendKind::TfJs, Device::Cpu)];
const SKLEARN_CHAIN: &[FallbackStep] = &[step(BackendKind::Sklearn, Device::Cpu)];
const KERAS_CHAIN: &[FallbackStep] = &[
    step(BackendKind::Keras, Device::Accelerator),
    step(BackendKind::Keras, Device::Cpu),
];
const NATIVE_CHAIN: &[FallbackStep] = &[step(BackendKind::Native, Device::Cpu)];

impl ModelFormat {
    pub const ALL: [ModelFormat; 9] = [
        ModelFormat::Onnx,
        ModelFormat::EdgeTpuTfLite,
        ModelFormat::TfLite,
        ModelFormat::SavedModel,
        ModelFormat::TfJs,
        ModelFormat::Pickle,
        ModelFormat::Joblib,
        ModelFormat::Keras,
        ModelFormat::SafeTensors,
    ];

    /// Detects the format of the artifact at `path`.
    ///
    /// Directories are classified by their marker file; files by name and
    /// extension (case-insensitive).
    ///
    /// # Errors
    /// Returns [`RegistryError::UnsupportedFormat`] naming the extension (or
    /// the directory) when nothing matches.
    pub fn detect(path: &Path) -> Result<Self, RegistryError> {
        if path.is_dir() {
            if path.join(SAVED_MODEL_FILE).is_file() {
                return Ok(ModelFormat::SavedModel);
            }
            if path.join(TFJS_MODEL_FILE).is_file() {
                return Ok(ModelFormat::TfJs);
            }
            return Err(RegistryError::UnsupportedFormat(format!(
                "directory '{}' has neither {SAVED_MODEL_FILE} nor {TFJS_MODEL_FILE}",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if file_name.ends_with(EDGETPU_SUFFIX) {
            return Ok(ModelFormat::EdgeTpuTfLite);
        }
        if file_name == TFJS_MODEL_FILE {
            return Ok(ModelFormat::TfJs);
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "onnx" => Ok(ModelFormat::Onnx),
            "tflite" => Ok(ModelFormat::TfLite),
            "pkl" | "pickle" => Ok(ModelFormat::Pickle),
            "joblib" => Ok(ModelFormat::Joblib),
            "keras" | "h5" => Ok(ModelFormat::Keras),
            "safetensors" => Ok(ModelFormat::SafeTensors),
            "" => Err(RegistryError::UnsupportedFormat(format!(
                "'{}' has no extension",
                path.display()
            ))),
            other => Err(RegistryError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// The ordered `(backend, device)` steps tried for this format.
    pub fn fallback_chain(self) -> &'static [FallbackStep] {
        match self {
            ModelFormat::Onnx => ONNX_CHAIN,
            ModelFormat::EdgeTpuTfLite => EDGETPU_CHAIN,
            ModelFormat::TfLite => TFLITE_CHAIN,
            ModelFormat::SavedModel => SAVED_MODEL_CHAIN,
            ModelFormat::TfJs => TFJS_CHAIN,
            ModelFormat::Pickle | ModelFormat::Joblib => SKLEARN_CHAIN,
            ModelFormat::Keras => KERAS_CHAIN,
            ModelFormat::SafeTensors => NATIVE_CHAIN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFormat::Onnx => "onnx",
            ModelFormat::EdgeTpuTfLite => "edgetpu_tflite",
            ModelFormat::TfLite => "tflite",
            ModelFormat::SavedModel => "saved_model",
            ModelFormat::TfJs => "tfjs",
            ModelFormat::Pickle => "pickle",
            ModelFormat::Joblib => "joblib",
            ModelFormat::Keras => "keras",
            ModelFormat::SafeTensors => "safetensors",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
