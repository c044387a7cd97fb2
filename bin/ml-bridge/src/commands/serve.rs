// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `ml-bridge serve`: start the bridge on the configured transport.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use protocol::{spawn_signal_listener, HttpServer, ShutdownHandle, StreamServer};
use runtime::{Bridge, BridgeConfig, PreloadModel, Transport};

/// Layers CLI flags over the file and environment configuration.
pub fn apply_flags(
    mut config: BridgeConfig,
    transport: Option<Transport>,
    host: Option<String>,
    port: Option<u16>,
    backend: Option<String>,
    preload: Vec<PathBuf>,
) -> BridgeConfig {
    if let Some(transport) = transport {
        config.transport = transport;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(backend) = backend {
        config.default_backend = backend;
    }
    config
        .preload
        .extend(preload.into_iter().map(|model_path| PreloadModel {
            model_path,
            model_id: None,
            backend: None,
        }));
    config
}

/// The transport chosen by the configuration, built before startup so the
/// signal listener is armed while models preload.
enum Front {
    Stream(StreamServer),
    Http(HttpServer, SocketAddr),
}

impl Front {
    fn build(config: &BridgeConfig, bridge: Arc<Bridge>) -> anyhow::Result<Self> {
        Ok(match config.transport {
            Transport::Stdio => Self::Stream(StreamServer::new(bridge)),
            Transport::Http => Self::Http(
                HttpServer::new(bridge).with_max_body_bytes(config.max_body_bytes),
                config.socket_addr()?,
            ),
        })
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        match self {
            Self::Stream(server) => server.shutdown_handle(),
            Self::Http(server, _) => server.shutdown_handle(),
        }
    }
}

pub async fn execute(config: BridgeConfig) -> anyhow::Result<()> {
    let bridge = Arc::new(Bridge::from_config(&config)?);
    let available = bridge.registry().availability().available();
    tracing::info!(
        "ml-bridge {} starting ({} transport, backends: {:?})",
        runtime::VERSION,
        config.transport,
        available,
    );

    let front = Front::build(&config, Arc::clone(&bridge))?;
    let shutdown = front.shutdown_handle();
    spawn_signal_listener(shutdown.clone());

    let starting = Arc::clone(&bridge);
    let preload = config.preload.clone();
    let loaded = tokio::task::spawn_blocking(move || starting.start(&preload)).await??;
    if !config.preload.is_empty() {
        tracing::info!("preloaded {loaded}/{} models", config.preload.len());
    }
    if shutdown.resume_deferred() {
        tracing::info!("draining on a signal received during startup");
    }

    match front {
        Front::Stream(server) => {
            let exit = server.run_stdio().await?;
            tracing::debug!("stream loop ended: {exit:?}");
        }
        Front::Http(server, addr) => server.run(addr).await?,
    }
    Ok(())
}
