// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Registry tests against real `.safetensors` models on disk.

use model_registry::{
    BackendKind, BackendPreference, DenseModelWriter, Device, LoadRequest, Registry,
    RegistryError,
};
use tensor_core::{Shape, Tensor};

// ── Helpers ─────────────────────────────────────────────────────

fn write_sum_model(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("sum.safetensors");
    DenseModelWriter::new()
        .layer(vec![1.0; 5], 5, 1, None)
        .metadata("activation", "none")
        .write(&path)
        .unwrap();
    path
}

// ── Tests ───────────────────────────────────────────────────────

#[test]
fn loads_native_model_with_auto_backend() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_builtin_backends();

    let outcome = registry
        .load(&LoadRequest::new(write_sum_model(dir.path())))
        .unwrap();

    let meta = &outcome.metadata;
    assert_eq!(meta.model_id, "sum.safetensors");
    assert_eq!(meta.backend, BackendKind::Native);
    assert_eq!(meta.device, Device::Cpu);
    assert_eq!(meta.input_names, vec!["input".to_string()]);
    assert_eq!(meta.input_shapes, vec![vec![None, Some(5)]]);
}

#[test]
fn record_runs_inference() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_builtin_backends();
    registry
        .load(&LoadRequest::new(write_sum_model(dir.path())).with_model_id("sum"))
        .unwrap();

    let record = registry.get("sum").unwrap();
    let input = Tensor::from_f32(Shape::matrix(1, 5), &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let outputs = record.invoke(&input).unwrap();
    assert_eq!(outputs[0].as_f32_slice().unwrap(), &[15.0]);
}

#[test]
fn corrupt_file_reports_backend_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.safetensors");
    std::fs::write(&path, b"definitely not safetensors").unwrap();

    let registry = Registry::with_builtin_backends();
    let err = registry.load(&LoadRequest::new(&path)).unwrap_err();
    assert!(matches!(err, RegistryError::BackendUnavailable { .. }));
    assert!(err.to_string().contains("native@cpu"));
}

#[test]
fn formats_without_providers_are_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clf.joblib");
    std::fs::write(&path, b"\x80\x04").unwrap();

    let registry = Registry::with_builtin_backends();
    let err = registry.load(&LoadRequest::new(&path)).unwrap_err();
    assert!(matches!(err, RegistryError::BackendUnavailable { .. }));
}

#[test]
fn unknown_extension_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.bin");
    std::fs::write(&path, b"").unwrap();

    let registry = Registry::with_builtin_backends();
    let err = registry.load(&LoadRequest::new(&path)).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported model format: .bin");
}

#[test]
fn native_cannot_be_forced_onto_onnx_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    std::fs::write(&path, b"").unwrap();

    let registry = Registry::with_builtin_backends();
    let err = registry
        .load(&LoadRequest::new(&path).with_backend(BackendPreference::Only(BackendKind::Native)))
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnsupportedFormat(_)));
}
