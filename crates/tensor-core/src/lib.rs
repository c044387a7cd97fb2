// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor types and the JSON tensor codec for ml-bridge.
//!
//! This crate provides:
//! - [`Tensor`]: an owned n-dimensional tensor over typed storage ([`TensorData`]).
//! - [`Shape`]: concrete shape descriptors.
//! - [`DType`]: supported element types (f32, f64, i8, u8, i32, i64).
//! - [`TensorSpec`] and [`Quantization`]: declared model inputs and outputs.
//! - [`codec`]: JSON nested arrays to tensors and back, with batch
//!   normalization, shape reconciliation and quantization.
//! - Core operations for the native dense backend: matmul, bias, activations.

pub mod codec;
mod dtype;
mod error;
mod ops;
mod shape;
mod spec;
mod tensor;

pub use codec::DecodedTensor;
pub use dtype::DType;
pub use error::{CodecError, TensorError};
pub use ops::{add_bias, matmul, softmax, Activation};
pub use shape::Shape;
pub use spec::{Quantization, TensorSpec};
pub use tensor::{Tensor, TensorData, TensorView};
