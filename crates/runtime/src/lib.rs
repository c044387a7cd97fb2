// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Everything between a parsed request and a loaded model:
//!
//! - [`Executor`]: encode, invoke and decode for single and batched calls.
//! - [`Stats`]: request, inference and error counters shared by all
//!   front ends.
//! - [`Lifecycle`]: the `Starting -> Ready -> Draining -> Stopped` state
//!   machine.
//! - [`Bridge`]: the transport-agnostic service that ties them to a
//!   [`model_registry::Registry`].
//! - [`BridgeConfig`]: TOML and environment configuration.
//!
//! Nothing here is async. Front ends run [`Bridge`] methods on a blocking
//! pool (HTTP) or inline, one command at a time (stream).

mod bridge;
mod config;
mod error;
mod executor;
mod lifecycle;
mod stats;

pub use bridge::{
    BatchPredictParams, BatchPredictResponse, Bridge, HealthResponse, LoadParams, LoadResponse,
    ModelInfo, PredictParams, PredictResponse, ReadyResponse, StatusResponse, UnloadParams,
    UnloadResponse, VERSION,
};
pub use config::{
    BridgeConfig, PreloadModel, Transport, DEFAULT_MAX_BODY_BYTES, ENV_HOST, ENV_HOST_ALIAS,
    ENV_PORT, ENV_PORT_ALIAS, ENV_TRANSPORT,
};
pub use error::{ErrorKind, RuntimeError};
pub use executor::{BatchResult, Executor, InferenceResult};
pub use lifecycle::{BridgeState, Lifecycle};
pub use stats::{Stats, StatsSnapshot};
