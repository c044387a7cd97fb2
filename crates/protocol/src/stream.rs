// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Line-delimited JSON transport.
//!
//! One request object per input line, one response object per output line.
//! Commands run strictly one at a time. Before reading input the server
//! writes a `{"id":"ready",...}` line. The loop ends on EOF, on a `shutdown`
//! command, or when a [`ShutdownHandle`] is triggered. In the last case the
//! command in flight still completes and a final `{"id":"shutdown",...}`
//! line is written.

use std::sync::Arc;

use runtime::Bridge;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::command::{dispatch, parse_line, Command, ERROR_ID};
use crate::{ProtocolError, ShutdownHandle, StreamResponse};

/// Why [`StreamServer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The input reached EOF.
    EndOfInput,
    /// A `shutdown` command was received.
    ShutdownCommand,
    /// The shutdown handle was triggered.
    Signalled,
}

pub struct StreamServer {
    bridge: Arc<Bridge>,
    shutdown: ShutdownHandle,
}

impl StreamServer {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        let shutdown = ShutdownHandle::new(Arc::clone(bridge.lifecycle()));
        Self { bridge, shutdown }
    }

    /// The handle that stops this server; hand it to the signal listener.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves stdin/stdout until EOF or shutdown.
    pub async fn run_stdio(&self) -> Result<StreamExit, ProtocolError> {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serves one reader/writer pair until EOF or shutdown.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<StreamExit, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ready = serde_json::to_value(self.bridge.ready()).unwrap_or_default();
        write_line(&mut writer, &StreamResponse::ok("ready", ready)).await?;
        tracing::info!("stream transport ready");

        // Partial reads survive a cancelled `read_until`, so the buffer
        // lives across iterations and is only taken on a full line.
        let mut buf = Vec::new();
        let exit = loop {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break StreamExit::Signalled,
                read = reader.read_until(b'\n', &mut buf) => read?,
            };
            if read == 0 && buf.is_empty() {
                break StreamExit::EndOfInput;
            }
            let line = match String::from_utf8(std::mem::take(&mut buf)) {
                Ok(line) => line,
                Err(e) => {
                    self.bridge.stats().record_request();
                    self.bridge.stats().record_error();
                    tracing::debug!("rejected non-UTF-8 line: {e}");
                    let error = ProtocolError::InvalidJson(e.to_string()).to_string();
                    write_line(&mut writer, &StreamResponse::err(ERROR_ID, error)).await?;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let (response, stop) = self.handle_line(&line).await;
            write_line(&mut writer, &response).await?;
            if stop {
                break StreamExit::ShutdownCommand;
            }
        };

        if exit == StreamExit::Signalled {
            let farewell = StreamResponse::ok("shutdown", json!({ "message": "Bridge shutting down" }));
            write_line(&mut writer, &farewell).await?;
        }
        self.bridge.lifecycle().stop();
        tracing::info!("stream transport stopped ({exit:?})");
        Ok(exit)
    }

    /// Handles one non-blank line. The flag is set for `shutdown`.
    async fn handle_line(&self, line: &str) -> (StreamResponse, bool) {
        self.bridge.stats().record_request();

        let request = match parse_line(line) {
            Ok(r) => r,
            Err(rejected) => {
                self.bridge.stats().record_error();
                tracing::debug!("rejected request {}: {}", rejected.id, rejected.error);
                return (StreamResponse::err(rejected.id, rejected.error.to_string()), false);
            }
        };

        let id = request.id;
        let stop = request.command == Command::Shutdown;
        let bridge = Arc::clone(&self.bridge);
        let outcome =
            tokio::task::spawn_blocking(move || dispatch(&bridge, request.command)).await;

        let response = match outcome {
            Ok(Ok(result)) => StreamResponse::ok(id, result),
            Ok(Err(e)) => StreamResponse::err(id, e.to_string()),
            Err(join) => {
                self.bridge.stats().record_error();
                tracing::error!("command {id} panicked: {join}");
                StreamResponse::err(id, format!("internal error: {join}"))
            }
        };
        if stop {
            self.bridge.lifecycle().begin_drain();
        }
        (response, stop)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &StreamResponse,
) -> Result<(), ProtocolError> {
    let mut line = response.to_line();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
