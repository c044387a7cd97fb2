// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the transports.

use std::net::SocketAddr;

/// Errors raised while reading requests or running a transport.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A line or body that is not JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// The request is JSON but not an object.
    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("Missing command")]
    MissingCommand,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A known command with missing or mistyped fields.
    #[error("invalid parameters for '{command}': {detail}")]
    InvalidParams { command: String, detail: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
