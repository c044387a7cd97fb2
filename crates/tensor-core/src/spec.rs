// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Declared tensor signatures reported by model backends.

use std::fmt;

use crate::DType;

/// Affine quantization parameters: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quantization {
    pub scale: f32,
    pub zero_point: i32,
}

impl Quantization {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Returns `true` when `scale` is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }

    /// `round(x / scale + zero_point)`, unclamped.
    pub fn quantize(&self, x: f64) -> f64 {
        (x / self.scale as f64 + self.zero_point as f64).round()
    }

    /// `(q - zero_point) * scale`.
    pub fn dequantize(&self, q: f64) -> f64 {
        (q - self.zero_point as f64) * self.scale as f64
    }
}

/// Name, shape, element type and quantization of one model input or output.
///
/// A `None` dimension is dynamic (typically the batch axis).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<Option<usize>>,
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<Option<usize>>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            quantization: None,
        }
    }

    /// Attaches quantization parameters.
    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = Some(quantization);
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of dynamic dimensions.
    pub fn dynamic_dims(&self) -> usize {
        self.shape.iter().filter(|d| d.is_none()).count()
    }

    /// Returns `true` when the leading dimension is dynamic, so inputs can
    /// be stacked into one call.
    pub fn has_dynamic_batch(&self) -> bool {
        matches!(self.shape.first(), Some(None))
    }

    /// Returns `true` if `dims` satisfies every declared dimension.
    pub fn accepts(&self, dims: &[usize]) -> bool {
        dims.len() == self.shape.len()
            && self
                .shape
                .iter()
                .zip(dims)
                .all(|(declared, &d)| declared.map_or(true, |x| x == d))
    }

    /// The quantization that applies to this tensor, if its dtype is integer.
    pub fn active_quantization(&self) -> Option<&Quantization> {
        if self.dtype.is_integer() {
            self.quantization.as_ref()
        } else {
            None
        }
    }
}

/// Renders dynamic dimensions as `?`, e.g. `[?, 5]`.
impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match d {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_dequantize() {
        let q = Quantization::new(0.5, 10);
        assert_eq!(q.quantize(1.0), 12.0);
        assert_eq!(q.dequantize(12.0), 1.0);
        assert!(!Quantization::new(0.0, 0).is_valid());
    }

    #[test]
    fn test_accepts_dynamic_batch() {
        let spec = TensorSpec::new("x", vec![None, Some(5)], DType::F32);
        assert!(spec.accepts(&[3, 5]));
        assert!(!spec.accepts(&[3, 4]));
        assert!(!spec.accepts(&[5]));
        assert!(spec.has_dynamic_batch());
        assert_eq!(spec.to_string(), "[?, 5]");
    }

    #[test]
    fn test_quantization_only_active_for_integers() {
        let q = Quantization::new(0.1, 0);
        let float = TensorSpec::new("x", vec![Some(1)], DType::F32).with_quantization(q);
        let int = TensorSpec::new("x", vec![Some(1)], DType::I8).with_quantization(q);
        assert!(float.active_quantization().is_none());
        assert_eq!(int.active_quantization(), Some(&q));
    }
}
