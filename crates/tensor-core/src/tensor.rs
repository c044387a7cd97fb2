// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{DType, Shape, TensorError};

/// Typed, contiguous element storage in row-major (C) order.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Applies `$body` to the inner vector of every variant, yielding a plain value.
macro_rules! with_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => $body,
            TensorData::F64($v) => $body,
            TensorData::I8($v) => $body,
            TensorData::U8($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::I64($v) => $body,
        }
    };
}

/// Applies `$body` to the inner vector of every variant and rewraps the result.
macro_rules! map_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => TensorData::F32($body),
            TensorData::F64($v) => TensorData::F64($body),
            TensorData::I8($v) => TensorData::I8($body),
            TensorData::U8($v) => TensorData::U8($body),
            TensorData::I32($v) => TensorData::I32($body),
            TensorData::I64($v) => TensorData::I64($body),
        }
    };
}

impl TensorData {
    /// Allocates `len` zero elements of `dtype`.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::F64 => TensorData::F64(vec![0.0; len]),
            DType::I8 => TensorData::I8(vec![0; len]),
            DType::U8 => TensorData::U8(vec![0; len]),
            DType::I32 => TensorData::I32(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
        }
    }

    /// Builds storage of `dtype` from `f64` values.
    ///
    /// Integer targets are rounded and clamped to their range; this is the
    /// only narrowing point in the crate.
    pub fn from_f64(dtype: DType, values: &[f64]) -> Self {
        let narrow = |x: f64| dtype.clamp(x.round());
        match dtype {
            DType::F32 => TensorData::F32(values.iter().map(|&x| x as f32).collect()),
            DType::F64 => TensorData::F64(values.to_vec()),
            DType::I8 => TensorData::I8(values.iter().map(|&x| narrow(x) as i8).collect()),
            DType::U8 => TensorData::U8(values.iter().map(|&x| narrow(x) as u8).collect()),
            DType::I32 => TensorData::I32(values.iter().map(|&x| narrow(x) as i32).collect()),
            DType::I64 => TensorData::I64(values.iter().map(|&x| narrow(x) as i64).collect()),
        }
    }

    /// Returns the element type of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I8(_) => DType::I8,
            TensorData::U8(_) => DType::U8,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        with_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_variant!(self, v => v.iter().map(|&x| x as f64).collect())
    }

    /// Widens (or narrows) every element to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        with_variant!(self, v => v.iter().map(|&x| x as f32).collect())
    }

    fn slice(&self, start: usize, end: usize) -> TensorData {
        map_variant!(self, v => v[start..end].to_vec())
    }

    fn append(&mut self, other: &TensorData) -> Result<(), TensorError> {
        match (self, other) {
            (TensorData::F32(a), TensorData::F32(b)) => a.extend_from_slice(b),
            (TensorData::F64(a), TensorData::F64(b)) => a.extend_from_slice(b),
            (TensorData::I8(a), TensorData::I8(b)) => a.extend_from_slice(b),
            (TensorData::U8(a), TensorData::U8(b)) => a.extend_from_slice(b),
            (TensorData::I32(a), TensorData::I32(b)) => a.extend_from_slice(b),
            (TensorData::I64(a), TensorData::I64(b)) => a.extend_from_slice(b),
            (_, other) => {
                return Err(TensorError::UnsupportedDType {
                    op: "stack",
                    dtype: other.dtype(),
                })
            }
        }
        Ok(())
    }
}

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// `Tensor` is the data carrier between the codec and the backends.
/// It owns its storage and exposes immutable views via [`TensorView`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let data = TensorData::zeros(dtype, shape.num_elements());
        Self { shape, data }
    }

    /// Creates a tensor from typed storage.
    ///
    /// Returns an error if the element count does not match the shape.
    pub fn new(shape: Shape, data: TensorData) -> Result<Self, TensorError> {
        if data.len() != shape.num_elements() {
            let elem = data.dtype().size_bytes();
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.num_elements() * elem,
                actual: data.len() * elem,
            });
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::F32(values.to_vec()))
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Returns the typed storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Consumes the tensor, returning shape and storage.
    pub fn into_parts(self) -> (Shape, TensorData) {
        (self.shape, self.data)
    }

    /// Returns the total size of the storage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype())
    }

    /// Returns an immutable view of this tensor.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Reinterprets the tensor under a new shape with the same element count.
    pub fn reshape(self, shape: Shape) -> Result<Self, TensorError> {
        if shape.num_elements() != self.shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape,
                rhs: shape,
            });
        }
        Ok(Self {
            shape,
            data: self.data,
        })
    }

    /// Borrows the storage as `f32`.
    ///
    /// # Errors
    /// Returns [`TensorError::UnsupportedDType`] for any other element type.
    pub fn as_f32_slice(&self) -> Result<&[f32], TensorError> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_f32_slice",
                dtype: other.dtype(),
            }),
        }
    }

    /// Mutably borrows the storage as `f32`.
    pub fn as_f32_slice_mut(&mut self) -> Result<&mut [f32], TensorError> {
        match &mut self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_f32_slice_mut",
                dtype: other.dtype(),
            }),
        }
    }

    /// Concatenates tensors along the leading dimension.
    ///
    /// All parts must share dtype and trailing dimensions. The result has a
    /// leading dimension equal to the sum of the parts' leading dimensions.
    pub fn stack(parts: &[Tensor]) -> Result<Tensor, TensorError> {
        let first = parts.first().ok_or(TensorError::Numeric {
            op: "stack",
            detail: "no tensors to stack".to_string(),
        })?;
        if first.shape.rank() == 0 {
            return Err(TensorError::ShapeMismatch {
                op: "stack",
                lhs: first.shape.clone(),
                rhs: Shape::vector(1),
            });
        }
        let trailing = first.shape.without_leading();
        let mut leading = 0;
        let mut data = TensorData::zeros(first.dtype(), 0);
        for part in parts {
            if part.shape.without_leading() != trailing {
                return Err(TensorError::ShapeMismatch {
                    op: "stack",
                    lhs: first.shape.clone(),
                    rhs: part.shape.clone(),
                });
            }
            leading += part.shape.dims()[0];
            data.append(&part.data)?;
        }
        Tensor::new(trailing.prepend(leading), data)
    }

    /// Splits the tensor along its leading dimension into `n` equal parts.
    ///
    /// Each part keeps a leading dimension of `dims[0] / n`.
    pub fn split_leading(&self, n: usize) -> Result<Vec<Tensor>, TensorError> {
        let leading = self.shape.dim(0).unwrap_or(0);
        if n == 0 || leading % n != 0 {
            return Err(TensorError::Numeric {
                op: "split_leading",
                detail: format!("cannot split {} into {n} parts", self.shape),
            });
        }
        let part_shape = self.shape.without_leading().prepend(leading / n);
        let step = part_shape.num_elements();
        Ok((0..n)
            .map(|i| Tensor {
                shape: part_shape.clone(),
                data: self.data.slice(i * step, (i + 1) * step),
            })
            .collect())
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    data: &'a TensorData,
}

impl<'a> TensorView<'a> {
    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the data type of the viewed tensor.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Returns the typed storage.
    pub fn data(&self) -> &'a TensorData {
        self.data
    }

    /// Borrows the viewed storage as `f32`.
    pub fn as_f32_slice(&self) -> Result<&'a [f32], TensorError> {
        match self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_f32_slice",
                dtype: other.dtype(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.shape(), &Shape::matrix(2, 3));
        assert_eq!(t.dtype(), DType::F32);
        assert!(t.as_f32_slice().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_new_size_mismatch() {
        let result = Tensor::new(Shape::matrix(2, 3), TensorData::I8(vec![0; 5]));
        assert!(matches!(
            result,
            Err(TensorError::BufferSizeMismatch { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_wrong_dtype_access() {
        let t = Tensor::zeros(Shape::vector(2), DType::I64);
        assert!(t.as_f32_slice().is_err());
    }

    #[test]
    fn test_from_f64_narrows_integers() {
        let data = TensorData::from_f64(DType::I8, &[1.4, 1.6, 500.0, -500.0]);
        assert_eq!(data, TensorData::I8(vec![1, 2, 127, -128]));
    }

    #[test]
    fn test_reshape_keeps_data() {
        let t = Tensor::from_f32(Shape::vector(6), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let r = t.reshape(Shape::matrix(2, 3)).unwrap();
        assert_eq!(r.shape().dims(), &[2, 3]);
        assert!(r.reshape(Shape::vector(4)).is_err());
    }

    #[test]
    fn test_stack_then_split() {
        let a = Tensor::from_f32(Shape::matrix(1, 2), &[1.0, 2.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(1, 2), &[3.0, 4.0]).unwrap();
        let stacked = Tensor::stack(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(stacked.shape().dims(), &[2, 2]);

        let parts = stacked.split_leading(2).unwrap();
        assert_eq!(parts, vec![a, b]);
    }

    #[test]
    fn test_stack_rejects_mixed_widths() {
        let a = Tensor::zeros(Shape::matrix(1, 2), DType::F32);
        let b = Tensor::zeros(Shape::matrix(1, 3), DType::F32);
        assert!(Tensor::stack(&[a, b]).is_err());
    }

    #[test]
    fn test_view_lifetime() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let v = t.view();
        assert_eq!(v.shape(), &Shape::vector(4));
        assert_eq!(v.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
