// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # ml-bridge
//!
//! Command-line interface for the model-serving bridge.
//!
//! ## Usage
//! ```bash
//! # Serve line-delimited JSON on stdin/stdout
//! ml-bridge serve
//!
//! # Serve HTTP on port 8765
//! ml-bridge serve --transport http --port 8765
//!
//! # Show which backends this build can use
//! ml-bridge backends
//!
//! # Load a model once and print its inputs and outputs
//! ml-bridge inspect --model ./models/demo/model.onnx
//! ```
//!
//! Logs go to stderr; stdout belongs to the stream transport.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use runtime::{BridgeConfig, Transport};

#[derive(Parser)]
#[command(
    name = "ml-bridge",
    about = "Load ML models once and serve inference over stdio or HTTP",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge.
    Serve {
        /// Front end: stdio or http.
        #[arg(short, long)]
        transport: Option<Transport>,

        /// HTTP bind host.
        #[arg(long)]
        host: Option<String>,

        /// HTTP bind port.
        #[arg(short, long)]
        port: Option<u16>,

        /// Default backend for loads that name none ("auto" or a backend kind).
        #[arg(short, long)]
        backend: Option<String>,

        /// Model to load before accepting requests (repeatable).
        #[arg(long = "preload", value_name = "PATH")]
        preload: Vec<PathBuf>,
    },

    /// Probe and list the inference backends available in this build.
    Backends,

    /// Load a model and print its declared inputs and outputs.
    Inspect {
        /// Path to the model artifact.
        #[arg(short, long)]
        model: PathBuf,

        /// Backend to use ("auto" or a backend kind).
        #[arg(short, long, default_value = "auto")]
        backend: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    }
    .apply_env()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = rt.block_on(async move {
        match cli.command {
            Commands::Serve {
                transport,
                host,
                port,
                backend,
                preload,
            } => {
                let config = commands::serve::apply_flags(config, transport, host, port, backend, preload);
                commands::serve::execute(config).await
            }
            Commands::Backends => commands::backends::execute().await,
            Commands::Inspect { model, backend } => {
                commands::inspect::execute(model, backend).await
            }
        }
    });
    // A pending stdin read holds a blocking thread that never returns.
    rt.shutdown_timeout(Duration::from_millis(500));
    result
}
