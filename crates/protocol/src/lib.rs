// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # protocol
//!
//! The two front ends of the bridge. Both parse requests into the same
//! [`Command`], run it through [`dispatch`] against a shared
//! [`runtime::Bridge`], and differ only in framing:
//!
//! - [`StreamServer`]: one JSON object per line over any async reader and
//!   writer (stdin/stdout in production). Commands run one at a time.
//! - [`HttpServer`]: hyper, one route per command, concurrent requests.
//!
//! [`ShutdownHandle`] moves the bridge to `Draining` and stops whichever
//! transport owns it; [`spawn_signal_listener`] wires it to SIGINT/SIGTERM.

pub mod command;
mod error;
pub mod http;
mod response;
mod signal;
mod stream;

pub use command::{dispatch, parse_line, Command, StreamRequest};
pub use error::ProtocolError;
pub use http::HttpServer;
pub use response::StreamResponse;
pub use signal::{spawn_signal_listener, ShutdownHandle};
pub use stream::{StreamExit, StreamServer};
