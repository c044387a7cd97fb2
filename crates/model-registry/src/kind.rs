// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend and device identifiers.

use std::fmt;
use std::str::FromStr;

/// The closed set of inference backends the bridge knows about.
///
/// Whether a backend can actually be used is decided once at startup by
/// [`crate::BackendTable::probe`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// High-performance graph engine, preferred for ONNX when present.
    Max,
    /// General-purpose ONNX runtime.
    Onnx,
    /// Edge interpreter for `.tflite` flatbuffers.
    TfLite,
    /// Edge interpreter with an attached TPU delegate.
    EdgeTpu,
    /// Full TensorFlow runtime for saved-model directories.
    TensorFlow,
    /// Browser graph/layers format.
    TfJs,
    /// Classical ML estimators (pickle / joblib).
    Sklearn,
    /// Keras `.keras` / `.h5` models.
    Keras,
    /// Built-in dense network executor for `.safetensors` files.
    Native,
}

impl BackendKind {
    /// Every kind, in preference order for reporting a "primary" backend.
    pub const ALL: [BackendKind; 9] = [
        BackendKind::Max,
        BackendKind::Onnx,
        BackendKind::Native,
        BackendKind::TensorFlow,
        BackendKind::TfLite,
        BackendKind::EdgeTpu,
        BackendKind::Keras,
        BackendKind::TfJs,
        BackendKind::Sklearn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Max => "max",
            BackendKind::Onnx => "onnx",
            BackendKind::TfLite => "tflite",
            BackendKind::EdgeTpu => "edgetpu",
            BackendKind::TensorFlow => "tensorflow",
            BackendKind::TfJs => "tfjs",
            BackendKind::Sklearn => "sklearn",
            BackendKind::Keras => "keras",
            BackendKind::Native => "native",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown backend '{s}'"))
    }
}

/// Where a backend runs a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// GPU or other accelerator.
    Accelerator,
    Cpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Accelerator => "accelerator",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend a load request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Walk the format's full fallback chain.
    #[default]
    Auto,
    /// Only try the steps of this backend.
    Only(BackendKind),
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPreference::Auto => f.write_str("auto"),
            BackendPreference::Only(kind) => kind.fmt(f),
        }
    }
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") || s.is_empty() {
            Ok(BackendPreference::Auto)
        } else {
            s.parse().map(BackendPreference::Only)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("pytorch".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&BackendKind::EdgeTpu).unwrap();
        assert_eq!(json, "\"edgetpu\"");
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("auto".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!("".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!(
            "ONNX".parse::<BackendPreference>().unwrap(),
            BackendPreference::Only(BackendKind::Onnx)
        );
        assert!("gpu".parse::<BackendPreference>().is_err());
    }
}
