// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion between JSON nested arrays and [`Tensor`]s.
//!
//! Encoding runs these steps in order:
//!
//! 1. Numeric coercion of a rectangular nested array.
//! 2. Batch normalization: a payload one rank short of the declared rank
//!    gets a leading dimension of 1.
//! 3. Shape reconciliation: exact match, same-count reshape, or inference of
//!    a single dynamic dimension. Anything else is a shape mismatch.
//! 4. Quantization `q = round(x / scale + zero_point)` for integer inputs
//!    that declare parameters, clamped to the element type's range.
//!
//! Decoding reverses step 4 (`x = (q - zero_point) * scale`) and renders
//! the tensor as nested JSON arrays plus its shape and dtype.
//!
//! The codec holds no state and knows nothing about backends.

use serde_json::Value;

use crate::{CodecError, DType, Shape, Tensor, TensorData, TensorSpec};

/// A model output rendered for the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DecodedTensor {
    pub name: String,
    pub data: Value,
    pub shape: Shape,
    pub dtype: DType,
}

/// Encodes one JSON payload against a declared input.
///
/// # Errors
/// [`CodecError::InvalidInput`] for non-numeric, ragged or empty payloads and
/// invalid quantization parameters; [`CodecError::ShapeMismatch`] when the
/// payload cannot be reconciled with `spec.shape`.
pub fn encode(raw: &Value, spec: &TensorSpec) -> Result<Tensor, CodecError> {
    let (dims, values) = flatten(raw)?;
    let shape = reconcile(dims, spec)?;

    let data = match spec.active_quantization() {
        Some(q) => {
            if !q.is_valid() {
                return Err(CodecError::InvalidInput(format!(
                    "quantization scale for '{}' must be positive, got {}",
                    spec.name, q.scale
                )));
            }
            let quantized: Vec<f64> = values.iter().map(|&x| q.quantize(x)).collect();
            TensorData::from_f64(spec.dtype, &quantized)
        }
        None => TensorData::from_f64(spec.dtype, &values),
    };

    Ok(Tensor::new(shape, data)?)
}

/// Encodes each sample separately and stacks them along a new leading axis.
///
/// Every sample must encode to a leading dimension of 1; the batch fails as a
/// whole on the first bad sample.
pub fn encode_batch(samples: &[Value], spec: &TensorSpec) -> Result<Tensor, CodecError> {
    if samples.is_empty() {
        return Err(CodecError::InvalidInput("batch is empty".to_string()));
    }
    let mut parts = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        let tensor = encode(sample, spec)?;
        if tensor.shape().dim(0) != Some(1) {
            return Err(CodecError::ShapeMismatch {
                name: format!("{}[{i}]", spec.name),
                actual: tensor.shape().clone(),
                expected: format!("a single sample of {spec}"),
            });
        }
        parts.push(tensor);
    }
    Ok(Tensor::stack(&parts)?)
}

/// Decodes a backend output against its declared spec.
pub fn decode(tensor: &Tensor, spec: &TensorSpec) -> Result<DecodedTensor, CodecError> {
    let (leaves, dtype) = match spec.active_quantization().filter(|_| tensor.dtype().is_integer()) {
        Some(q) => {
            if !q.is_valid() {
                return Err(CodecError::InvalidInput(format!(
                    "quantization scale for '{}' must be positive, got {}",
                    spec.name, q.scale
                )));
            }
            let leaves = tensor
                .data()
                .to_f64_vec()
                .into_iter()
                .map(|v| Value::from(q.dequantize(v) as f32 as f64))
                .collect::<Vec<_>>();
            (leaves, DType::F32)
        }
        None => (json_leaves(tensor.data()), tensor.dtype()),
    };

    let mut iter = leaves.into_iter();
    let data = nest(&mut iter, tensor.shape().dims());
    Ok(DecodedTensor {
        name: spec.name.clone(),
        data,
        shape: tensor.shape().clone(),
        dtype,
    })
}

/// Splits a stacked output back into `n` per-sample tensors.
pub fn split_batch(tensor: &Tensor, n: usize) -> Result<Vec<Tensor>, CodecError> {
    Ok(tensor.split_leading(n)?)
}

fn json_leaves(data: &TensorData) -> Vec<Value> {
    match data {
        TensorData::F32(v) => v.iter().map(|&x| Value::from(x as f64)).collect(),
        TensorData::F64(v) => v.iter().map(|&x| Value::from(x)).collect(),
        TensorData::I8(v) => v.iter().map(|&x| Value::from(x)).collect(),
        TensorData::U8(v) => v.iter().map(|&x| Value::from(x)).collect(),
        TensorData::I32(v) => v.iter().map(|&x| Value::from(x)).collect(),
        TensorData::I64(v) => v.iter().map(|&x| Value::from(x)).collect(),
    }
}

fn nest(leaves: &mut impl Iterator<Item = Value>, dims: &[usize]) -> Value {
    match dims.split_first() {
        None => leaves.next().unwrap_or(Value::Null),
        Some((&d, rest)) => Value::Array((0..d).map(|_| nest(leaves, rest)).collect()),
    }
}

/// Walks the payload, returning its dimensions and row-major values.
fn flatten(raw: &Value) -> Result<(Vec<usize>, Vec<f64>), CodecError> {
    let mut dims = Vec::new();
    let mut cursor = raw;
    while let Value::Array(items) = cursor {
        dims.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    // `dims` follows only the first path through the payload and is not
    // trusted for sizing until `collect` has checked every row.
    let mut values = Vec::new();
    collect(raw, 0, &dims, &mut values)?;
    if values.is_empty() {
        return Err(CodecError::InvalidInput("input is empty".to_string()));
    }
    Ok((dims, values))
}

fn collect(value: &Value, depth: usize, dims: &[usize], out: &mut Vec<f64>) -> Result<(), CodecError> {
    match value {
        Value::Array(items) => {
            if depth >= dims.len() || items.len() != dims[depth] {
                return Err(CodecError::InvalidInput(format!(
                    "ragged nested array at depth {depth}"
                )));
            }
            for item in items {
                collect(item, depth + 1, dims, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            if depth != dims.len() {
                return Err(CodecError::InvalidInput(format!(
                    "ragged nested array at depth {depth}"
                )));
            }
            let x = n
                .as_f64()
                .ok_or_else(|| CodecError::InvalidInput(format!("number {n} is not representable")))?;
            out.push(x);
            Ok(())
        }
        other => Err(CodecError::InvalidInput(format!(
            "expected a number, found {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Applies batch normalization and shape reconciliation.
fn reconcile(mut dims: Vec<usize>, spec: &TensorSpec) -> Result<Shape, CodecError> {
    if dims.len() + 1 == spec.rank() {
        dims.insert(0, 1);
    }
    if spec.accepts(&dims) {
        return Ok(Shape::new(dims));
    }

    let count: usize = dims.iter().product();
    let known: usize = spec.shape.iter().flatten().product();
    let mismatch = || CodecError::ShapeMismatch {
        name: spec.name.clone(),
        actual: Shape::new(dims.clone()),
        expected: spec.to_string(),
    };

    match spec.dynamic_dims() {
        0 if known == count => Ok(Shape::new(spec.shape.iter().flatten().copied().collect())),
        1 if known > 0 && count % known == 0 => {
            let inferred = count / known;
            Ok(Shape::new(
                spec.shape.iter().map(|d| d.unwrap_or(inferred)).collect(),
            ))
        }
        _ => Err(mismatch()),
    }
}
