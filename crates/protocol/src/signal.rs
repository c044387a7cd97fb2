// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shutdown signalling shared by the transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use runtime::{BridgeState, Lifecycle};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Requests a drain and wakes whichever transport is waiting on it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    lifecycle: Arc<Lifecycle>,
    notify: Arc<Notify>,
    /// Set by a request that arrived while the bridge was starting.
    deferred: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            notify: Arc::new(Notify::new()),
            deferred: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Moves the bridge to `Draining` and wakes the transport.
    ///
    /// Returns `false` if the bridge was not `Ready` (already draining, or
    /// still starting), in which case nothing is signalled.
    pub fn trigger(&self) -> bool {
        if self.lifecycle.begin_drain() {
            self.notify.notify_one();
            true
        } else {
            false
        }
    }

    /// Remembers a shutdown request made while the bridge is `Starting`.
    ///
    /// The drain happens in [`Self::resume_deferred`] once the bridge is
    /// ready. Returns `false` if the bridge is not starting.
    pub fn defer(&self) -> bool {
        if self.lifecycle.state() != BridgeState::Starting {
            return false;
        }
        self.deferred.store(true, Ordering::SeqCst);
        // Startup may have finished between the check and the store.
        if self.lifecycle.state() != BridgeState::Starting {
            self.resume_deferred();
        }
        true
    }

    /// Triggers a drain if one was deferred during startup. Call after the
    /// bridge is marked ready.
    pub fn resume_deferred(&self) -> bool {
        self.deferred.swap(false, Ordering::SeqCst) && self.trigger()
    }

    /// Resolves once [`Self::trigger`] has fired. A trigger that happens
    /// while nobody is waiting is remembered for the next call.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

/// Spawns a task that triggers `handle` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        if handle.trigger() {
            tracing::info!("shutdown signal received, draining");
        } else if handle.defer() {
            tracing::info!("shutdown signal received while starting, draining once ready");
        } else {
            tracing::warn!(
                "shutdown signal received in state '{}', ignoring",
                handle.lifecycle().state()
            );
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::warn!("cannot listen for SIGINT: {e}");
                        let _ = term.recv().await;
                    }
                }
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {e}");
            ctrl_c_or_pending().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_pending().await;
}

async fn ctrl_c_or_pending() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for SIGINT: {e}");
        std::future::pending::<()>().await;
    }
}
