// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `ml-bridge inspect` command: load one model and print its signature.
//!
//! Goes through the same registry and fallback chain as `load_model`, so
//! the backend shown is the one the bridge would pick.

use std::path::PathBuf;

use model_registry::{BackendPreference, LoadRequest, Registry};
use tensor_core::TensorSpec;

pub async fn execute(model: PathBuf, backend: String) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              ml-bridge · Model Inspector            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let preference: BackendPreference = backend
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid --backend: {e}"))?;
    let request = LoadRequest::new(&model).with_backend(preference);

    let meta = tokio::task::spawn_blocking(move || {
        let registry = Registry::with_builtin_backends();
        registry.load(&request).map(|outcome| outcome.metadata)
    })
    .await?
    .map_err(|e| anyhow::anyhow!("failed to load model from '{}': {e}", model.display()))?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Model:     {}", meta.model_id);
    println!("  Path:      {}", meta.path);
    println!("  Format:    {}", meta.format);
    println!("  Backend:   {} on {}", meta.backend, meta.device);
    println!("  Load time: {:.1} ms", meta.load_time_ms);
    println!();

    // ── Signature ──────────────────────────────────────────────
    print_specs("Inputs", &meta.inputs);
    print_specs("Outputs", &meta.outputs);

    Ok(())
}

fn print_specs(title: &str, specs: &[TensorSpec]) {
    println!("  {title}:");
    println!("  {:<24} {:<16} {:<6} {}", "Name", "Shape", "DType", "Quantization");
    println!("  {}", "-".repeat(64));
    for spec in specs {
        let quant = match spec.active_quantization() {
            Some(q) => format!("scale={} zero_point={}", q.scale, q.zero_point),
            None => "-".to_string(),
        };
        println!(
            "  {:<24} {:<16} {:<6} {}",
            truncate(&spec.name, 24),
            spec.to_string(),
            spec.dtype.as_str(),
            quant,
        );
    }
    println!();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
