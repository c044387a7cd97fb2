// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: the bridge service end to end.
//!
//! These tests drive [`Bridge`] the way both front ends do, from a config
//! file through load, predict, batch, unload and status, against real
//! `.safetensors` models written to a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use model_registry::{BackendPreference, DenseModelWriter, Registry};
use runtime::{Bridge, BridgeConfig, BridgeState, ErrorKind, LoadParams};
use serde_json::json;
use tensor_core::DType;

// ── Helpers ────────────────────────────────────────────────────

/// Five inputs summed into one output.
fn demo_model(dir: &Path) -> PathBuf {
    let path = dir.join("demo.safetensors");
    DenseModelWriter::new()
        .layer(vec![1.0; 5], 5, 1, None)
        .metadata("activation", "none")
        .write(&path)
        .unwrap();
    path
}

/// Identity over two int8 features with scale 0.5.
fn quantized_model(dir: &Path) -> PathBuf {
    let path = dir.join("quant.safetensors");
    DenseModelWriter::new()
        .layer(vec![1.0, 0.0, 0.0, 1.0], 2, 2, None)
        .metadata("activation", "none")
        .metadata("input_dtype", "int8")
        .metadata("input_scale", "0.5")
        .metadata("output_dtype", "int8")
        .metadata("output_scale", "0.5")
        .write(&path)
        .unwrap();
    path
}

fn load(path: PathBuf, id: &str) -> LoadParams {
    LoadParams {
        model_path: path,
        model_id: Some(id.to_string()),
        backend: None,
    }
}

fn ready_bridge() -> Bridge {
    let bridge = Bridge::new(Arc::new(Registry::with_builtin_backends()), BackendPreference::Auto);
    bridge.start(&[]).unwrap();
    bridge
}

// ── Tests ──────────────────────────────────────────────────────

#[test]
fn load_predict_unload_predict() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();

    let loaded = bridge.load(load(demo_model(dir.path()), "demo")).unwrap();
    assert_eq!(loaded.model.model_id, "demo");
    assert_eq!(loaded.model.input_shapes, vec![vec![None, Some(5)]]);

    let resp = bridge
        .predict("demo", &json!([0.5, 0.5, 0.5, 0.5, 0.5]))
        .unwrap();
    assert_eq!(resp.prediction, json!([[2.5]]));

    bridge.unload("demo").unwrap();
    let err = bridge
        .predict("demo", &json!([0.5, 0.5, 0.5, 0.5, 0.5]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("not loaded"));
}

#[test]
fn missing_model_error_mentions_path() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();
    let missing = dir.path().join("nowhere").join("model.onnx");

    let err = bridge.observe(bridge.load(load(missing.clone(), "x"))).unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(err.to_string().contains(&missing.display().to_string()));
    assert_eq!(bridge.stats().snapshot().errors_total, 1);
}

#[test]
fn narrow_input_is_shape_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();
    bridge.load(load(demo_model(dir.path()), "demo")).unwrap();

    let err = bridge.predict("demo", &json!([1, 2])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert_eq!(err.status_code(), 400);
}

#[test]
fn quantized_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();
    bridge.load(load(quantized_model(dir.path()), "q")).unwrap();

    let resp = bridge.predict("q", &json!([1.0, -2.5])).unwrap();
    assert_eq!(resp.dtype, DType::F32);
    assert_eq!(resp.prediction, json!([[1.0, -2.5]]));
}

#[test]
fn quantized_values_snap_to_step() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();
    bridge.load(load(quantized_model(dir.path()), "q")).unwrap();

    let resp = bridge.predict("q", &json!([[0.7, 100.0]])).unwrap();
    let row = resp.prediction[0].as_array().unwrap();
    let first = row[0].as_f64().unwrap();
    assert!((first - 0.7).abs() <= 0.5);
    // 100 / 0.5 saturates at i8::MAX.
    assert_eq!(row[1].as_f64().unwrap(), 63.5);
}

#[test]
fn batch_then_stats() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ready_bridge();
    bridge.load(load(demo_model(dir.path()), "demo")).unwrap();

    let inputs: Vec<_> = (1..=4).map(|i| json!([i, i, i, i, i])).collect();
    let resp = bridge.predict_batch("demo", &inputs).unwrap();
    assert_eq!(resp.batch_size, 4);
    assert_eq!(resp.predictions[3], json!([[20.0]]));
    assert!(resp.per_sample_ms <= resp.inference_time_ms);

    bridge.predict("demo", &inputs[0]).unwrap();
    let stats = bridge.stats().snapshot();
    assert_eq!(stats.inference_total, 5);
}

#[test]
fn concurrent_predicts_during_load() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(ready_bridge());
    bridge.load(load(demo_model(dir.path()), "demo")).unwrap();
    let quant = quantized_model(dir.path());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let resp = bridge.predict("demo", &json!([1, 1, 1, 1, 1])).unwrap();
                    assert_eq!(resp.prediction, json!([[5.0]]));
                }
            })
        })
        .collect();
    bridge.load(load(quant, "q")).unwrap();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(bridge.stats().snapshot().inference_total, 200);
    assert_eq!(bridge.registry().list(), vec!["demo".to_string(), "q".to_string()]);
}

#[test]
fn config_file_preloads_models() {
    let dir = tempfile::tempdir().unwrap();
    let model = demo_model(dir.path());
    let config_path = dir.path().join("bridge.toml");
    std::fs::write(
        &config_path,
        format!(
            "transport = \"http\"\nport = 9100\n\n[[preload]]\nmodel_path = {:?}\nmodel_id = \"demo\"\n",
            model.display().to_string()
        ),
    )
    .unwrap();

    let config = BridgeConfig::from_file(&config_path).unwrap();
    let bridge = Bridge::from_config(&config).unwrap();
    assert_eq!(bridge.lifecycle().state(), BridgeState::Starting);
    assert_eq!(bridge.start(&config.preload).unwrap(), 1);

    let health = bridge.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.models_loaded, 1);
}

#[test]
fn shutdown_sequence() {
    let bridge = ready_bridge();
    assert!(bridge.lifecycle().begin_drain());
    assert!(!bridge.lifecycle().begin_drain());
    assert_eq!(bridge.health().status, "draining");
    assert_eq!(bridge.lifecycle().stop(), BridgeState::Stopped);
}
