// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-registry
//!
//! Holds loaded models and decides which backend loads each one.
//!
//! - [`BackendProvider`] / [`ModelHandle`]: the uniform `{load, infer,
//!   describe}` capability every engine is wrapped in.
//! - [`BackendTable`] / [`BackendAvailability`]: the providers in this build
//!   and which of them passed their startup probe.
//! - [`ModelFormat`]: artifact detection and ordered fallback chains.
//! - [`Registry`]: `model_id -> ModelRecord` with idempotent load, unload,
//!   lookup and listing.
//!
//! # Example
//! ```no_run
//! use model_registry::{LoadRequest, Registry};
//!
//! let registry = Registry::with_builtin_backends();
//! let outcome = registry
//!     .load(&LoadRequest::new("models/classifier.safetensors").with_model_id("clf"))
//!     .unwrap();
//! println!("{} via {}", outcome.metadata.model_id, outcome.metadata.backend);
//! ```

pub mod backend;
mod error;
mod format;
mod kind;
mod record;
mod registry;

pub use backend::native::{DenseModel, DenseModelWriter, NativeProvider};
pub use backend::{BackendAvailability, BackendProvider, BackendTable, ModelHandle, ModelSignature};
pub use error::{BackendError, RegistryError};
pub use format::{FallbackStep, ModelFormat};
pub use kind::{BackendKind, BackendPreference, Device};
pub use record::{ModelMetadata, ModelRecord};
pub use registry::{LoadOutcome, LoadRequest, Registry};
