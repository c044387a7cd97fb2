// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication operation.

use crate::{DType, Shape, Tensor, TensorError, TensorView};

/// Performs matrix multiplication: `output = lhs @ rhs`.
///
/// Both inputs must be 2-D tensors with compatible inner dimensions:
/// `lhs` is `[M, K]`, `rhs` is `[K, N]`, and `output` must be `[M, N]`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible.
/// Returns [`TensorError::UnsupportedDType`] if the dtype is not `F32`.
pub fn matmul(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    if lhs.dtype() != DType::F32 || rhs.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op: "matmul",
            dtype: if lhs.dtype() != DType::F32 {
                lhs.dtype()
            } else {
                rhs.dtype()
            },
        });
    }

    if lhs.shape().rank() != 2 || !lhs.shape().is_matmul_compatible(rhs.shape()) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let lhs_dims = lhs.shape().dims();
    let rhs_dims = rhs.shape().dims();
    let m = lhs_dims[0];
    let k = lhs_dims[1];
    let n = rhs_dims[rhs_dims.len() - 1];

    let expected_shape = Shape::matrix(m, n);
    if output.shape() != &expected_shape || output.dtype() != DType::F32 {
        return Err(TensorError::ShapeMismatch {
            op: "matmul (output)",
            lhs: expected_shape,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.as_f32_slice()?;
    let b = rhs.as_f32_slice()?;
    let c = output.as_f32_slice_mut()?;

    matmul_f32_generic(a, b, c, m, k, n);

    Ok(())
}

/// Adds a `[N]` bias row to every row of a `[M, N]` tensor in place.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the bias length differs from `N`.
pub fn add_bias(target: &mut Tensor, bias: &[f32]) -> Result<(), TensorError> {
    let n = target.shape().dims().last().copied().unwrap_or(1);
    if bias.len() != n {
        return Err(TensorError::ShapeMismatch {
            op: "add_bias",
            lhs: target.shape().clone(),
            rhs: Shape::vector(bias.len()),
        });
    }
    for row in target.as_f32_slice_mut()?.chunks_mut(n.max(1)) {
        for (x, b) in row.iter_mut().zip(bias) {
            *x += b;
        }
    }
    Ok(())
}

/// Portable f32 matrix multiplication with an ikj loop order, so the inner
/// loop walks a row of `b` and a row of `c` sequentially.
fn matmul_f32_generic(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);

    for i in 0..m {
        for p in 0..k {
            let a_ip = a[i * k + p];
            let c_row = &mut c[i * n..(i + 1) * n];
            let b_row = &b[p * n..(p + 1) * n];
            for j in 0..n {
                c_row[j] += a_ip * b_row[j];
            }
        }
    }
}
