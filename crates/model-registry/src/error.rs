// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and backend execution.

use std::path::PathBuf;

use crate::{BackendKind, Device};

/// Errors returned by a single backend provider or model handle.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend cannot run on the requested device.
    #[error("{backend} does not support device {device}")]
    DeviceUnsupported { backend: BackendKind, device: Device },

    /// The artifact could not be opened or parsed by this backend.
    #[error("failed to load model: {0}")]
    Load(String),

    /// The input tensor does not fit the model.
    #[error("input rejected: {0}")]
    InvalidInput(String),

    /// The backend failed while running the model.
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),
}

/// Errors returned by the [`crate::Registry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No model is registered under this id.
    #[error("Model {0} not loaded")]
    NotLoaded(String),

    /// The source path does not exist.
    #[error("Model file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The artifact format is unknown, or the requested backend cannot read it.
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    /// Every step of the fallback chain failed or was unavailable.
    #[error("no backend could load '{}': {attempts}", path.display())]
    BackendUnavailable { path: PathBuf, attempts: String },

    /// The caller supplied an unusable model id.
    #[error("invalid model id: {0}")]
    InvalidModelId(String),
}
