// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the bridge runtime.

use model_registry::{BackendError, RegistryError};
use tensor_core::CodecError;

/// Errors surfaced by bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Registry lookups, loads and unloads.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Payload encoding or output decoding.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The backend failed while running a model.
    #[error("inference failed for model '{model_id}': {source}")]
    Backend {
        model_id: String,
        #[source]
        source: BackendError,
    },

    /// The request itself is malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    BackendUnavailable,
    ShapeMismatch,
    InvalidInput,
    Internal,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(e) => match e {
                RegistryError::NotLoaded(_) | RegistryError::FileNotFound(_) => ErrorKind::NotFound,
                RegistryError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                RegistryError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
                RegistryError::InvalidModelId(_) => ErrorKind::InvalidInput,
            },
            Self::Codec(e) => match e {
                CodecError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
                CodecError::InvalidInput(_) => ErrorKind::InvalidInput,
                CodecError::Tensor(_) => ErrorKind::Internal,
            },
            Self::Backend { source, .. } => match source {
                BackendError::InvalidInput(_) => ErrorKind::InvalidInput,
                _ => ErrorKind::Internal,
            },
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ConfigError(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::UnsupportedFormat | ErrorKind::ShapeMismatch | ErrorKind::InvalidInput => 400,
            ErrorKind::BackendUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
