// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `ml-bridge backends`: probe every backend and print the result.

use model_registry::{BackendTable, ModelFormat};

pub async fn execute() -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              ml-bridge · Backend Status             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let availability = BackendTable::builtin().probe();

    println!("  {:<12} {:<10}", "Backend", "Status");
    println!("  {}", "-".repeat(24));
    for (kind, available) in availability.iter() {
        let status = if available { "available" } else { "-" };
        println!("  {:<12} {:<10}", kind.as_str(), status);
    }
    println!();

    match availability.primary() {
        Some(primary) => println!("  Primary backend: {primary}"),
        None => println!("  No backend available"),
    }
    println!();

    // ── Fallback chains ────────────────────────────────────────
    println!("  Fallback chains:");
    for format in ModelFormat::ALL {
        let chain: Vec<String> = format
            .fallback_chain()
            .iter()
            .map(|step| {
                let mark = if availability.is_available(step.backend) { "" } else { " (n/a)" };
                format!("{step}{mark}")
            })
            .collect();
        println!("   {:<16} {}", format.as_str(), chain.join(" -> "));
    }
    println!();

    Ok(())
}
