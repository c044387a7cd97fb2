// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

use std::fmt;
use std::str::FromStr;

/// Enumerates the numeric types a [`crate::Tensor`] can hold.
///
/// The codec uses `DType` to decide how JSON numbers are coerced and whether
/// quantization parameters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 64-bit IEEE 754 floating point.
    F64,
    /// 8-bit signed integer (quantised tensors).
    I8,
    /// 8-bit unsigned integer (quantised tensors).
    U8,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer (token ids, class indices).
    I64,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I8 | DType::U8 => 1,
            DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
        }
    }

    /// Returns `true` for integer element types.
    pub fn is_integer(self) -> bool {
        !matches!(self, DType::F32 | DType::F64)
    }

    /// Clamps `value` into the representable range of an integer type.
    ///
    /// Floating point types are returned unchanged.
    pub fn clamp(self, value: f64) -> f64 {
        match self {
            DType::I8 => value.clamp(i8::MIN as f64, i8::MAX as f64),
            DType::U8 => value.clamp(u8::MIN as f64, u8::MAX as f64),
            DType::I32 => value.clamp(i32::MIN as f64, i32::MAX as f64),
            DType::I64 => value.clamp(i64::MIN as f64, i64::MAX as f64),
            DType::F32 | DType::F64 => value,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses both the short labels (`f32`, `i8`) and the long names model
/// formats tend to use (`float32`, `int8`, `uint8`).
impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float32" | "float" => Ok(DType::F32),
            "f64" | "float64" | "double" => Ok(DType::F64),
            "i8" | "int8" => Ok(DType::I8),
            "u8" | "uint8" => Ok(DType::U8),
            "i32" | "int32" => Ok(DType::I32),
            "i64" | "int64" => Ok(DType::I64),
            other => Err(format!("unknown dtype '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("float32".parse::<DType>().unwrap(), DType::F32);
        assert_eq!("INT8".parse::<DType>().unwrap(), DType::I8);
        assert_eq!("u8".parse::<DType>().unwrap(), DType::U8);
        assert!("f16".parse::<DType>().is_err());
    }

    #[test]
    fn test_clamp_ranges() {
        assert_eq!(DType::I8.clamp(300.0), 127.0);
        assert_eq!(DType::I8.clamp(-300.0), -128.0);
        assert_eq!(DType::U8.clamp(-1.0), 0.0);
        assert_eq!(DType::F32.clamp(1e9), 1e9);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&DType::I64).unwrap(), "\"i64\"");
    }
}
