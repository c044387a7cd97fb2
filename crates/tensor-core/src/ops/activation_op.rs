// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise activations applied in place.

use crate::{Tensor, TensorError};

/// Element-wise activation functions used between dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Identity.
    None,
    /// `max(0, x)`.
    Relu,
    /// `1 / (1 + exp(-x))`.
    Sigmoid,
    /// Numerically stable softmax over the last dimension.
    Softmax,
}

impl Activation {
    /// Parses an activation name; unknown names return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "linear" | "identity" => Some(Activation::None),
            "relu" => Some(Activation::Relu),
            "sigmoid" => Some(Activation::Sigmoid),
            "softmax" => Some(Activation::Softmax),
            _ => None,
        }
    }

    /// Applies the activation to `tensor`, replacing its contents.
    ///
    /// # Errors
    /// Returns [`TensorError::UnsupportedDType`] if the tensor is not `F32`.
    pub fn apply(self, tensor: &mut Tensor) -> Result<(), TensorError> {
        match self {
            Activation::None => {
                tensor.as_f32_slice()?;
            }
            Activation::Relu => {
                for x in tensor.as_f32_slice_mut()? {
                    *x = x.max(0.0);
                }
            }
            Activation::Sigmoid => {
                for x in tensor.as_f32_slice_mut()? {
                    *x = 1.0 / (1.0 + (-*x).exp());
                }
            }
            Activation::Softmax => {
                let mut out = Tensor::zeros(tensor.shape().clone(), tensor.dtype());
                super::softmax(&tensor.view(), &mut out)?;
                *tensor = out;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    #[test]
    fn test_relu_clips_negatives() {
        let mut t = Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 2.0]).unwrap();
        Activation::Relu.apply(&mut t).unwrap();
        assert_eq!(t.as_f32_slice().unwrap(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_sigmoid_midpoint() {
        let mut t = Tensor::from_f32(Shape::vector(1), &[0.0]).unwrap();
        Activation::Sigmoid.apply(&mut t).unwrap();
        assert!((t.as_f32_slice().unwrap()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_via_activation() {
        let mut t = Tensor::from_f32(Shape::matrix(1, 2), &[0.0, 0.0]).unwrap();
        Activation::Softmax.apply(&mut t).unwrap();
        assert_eq!(t.as_f32_slice().unwrap(), &[0.5, 0.5]);
    }

    #[test]
    fn test_activation_requires_f32() {
        let mut t = Tensor::zeros(Shape::vector(2), DType::I8);
        assert!(Activation::Relu.apply(&mut t).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Activation::parse("ReLU"), Some(Activation::Relu));
        assert_eq!(Activation::parse("linear"), Some(Activation::None));
        assert_eq!(Activation::parse("gelu"), None);
    }
}
