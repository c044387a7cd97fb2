// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor arithmetic operations used by the native dense backend.
//!
//! Each operation works on pre-allocated output buffers or mutates in place.

mod activation_op;
mod matmul_op;
mod softmax_op;

pub use activation_op::Activation;
pub use matmul_op::{add_bias, matmul};
pub use softmax_op::softmax;
