// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bridge lifecycle: `Starting -> Ready -> Draining -> Stopped`.
//!
//! Every transition is a single compare-and-swap, so a signal handler and
//! the request loop can race on [`Lifecycle::begin_drain`] and exactly one
//! of them wins.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::RuntimeError;

/// Where the bridge is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BridgeState {
    /// Probing backends and preloading models.
    Starting = 0,
    /// Accepting requests.
    Ready = 1,
    /// A shutdown was requested; in-flight work finishes, nothing new starts.
    Draining = 2,
    Stopped = 3,
}

impl BridgeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Ready,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shared state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(BridgeState::Starting as u8),
        }
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BridgeState::Ready
    }

    /// `Starting -> Ready`.
    pub fn mark_ready(&self) -> Result<(), RuntimeError> {
        self.transition(BridgeState::Starting, BridgeState::Ready)
            .map_err(|from| {
                RuntimeError::Internal(format!("cannot become ready from state '{from}'"))
            })?;
        tracing::info!("bridge ready");
        Ok(())
    }

    /// `Ready -> Draining`. Returns `true` only for the caller that
    /// performed the transition.
    pub fn begin_drain(&self) -> bool {
        let won = self
            .transition(BridgeState::Ready, BridgeState::Draining)
            .is_ok();
        if won {
            tracing::info!("bridge draining");
        }
        won
    }

    /// Finishes shutdown, passing through `Draining` if needed.
    ///
    /// A bridge that never became ready stays in `Starting`.
    pub fn stop(&self) -> BridgeState {
        self.begin_drain();
        if self
            .transition(BridgeState::Draining, BridgeState::Stopped)
            .is_ok()
        {
            tracing::info!("bridge stopped");
        }
        self.state()
    }

    fn transition(&self, from: BridgeState, to: BridgeState) -> Result<(), BridgeState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(BridgeState::from_u8)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_full_lifecycle() {
        let l = Lifecycle::new();
        assert_eq!(l.state(), BridgeState::Starting);
        l.mark_ready().unwrap();
        assert!(l.is_ready());
        assert!(l.begin_drain());
        assert_eq!(l.state(), BridgeState::Draining);
        assert_eq!(l.stop(), BridgeState::Stopped);
    }

    #[test]
    fn test_ready_only_once() {
        let l = Lifecycle::new();
        l.mark_ready().unwrap();
        assert!(l.mark_ready().is_err());
    }

    #[test]
    fn test_drain_requires_ready() {
        let l = Lifecycle::new();
        assert!(!l.begin_drain());
        assert_eq!(l.stop(), BridgeState::Starting);
    }

    #[test]
    fn test_stop_from_ready_passes_through_draining() {
        let l = Lifecycle::new();
        l.mark_ready().unwrap();
        assert_eq!(l.stop(), BridgeState::Stopped);
        assert!(!l.begin_drain());
    }

    #[test]
    fn test_drain_entered_once_under_contention() {
        let l = Arc::new(Lifecycle::new());
        l.mark_ready().unwrap();
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = Arc::clone(&l);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if l.begin_drain() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(BridgeState::Draining).unwrap(), "draining");
    }
}
