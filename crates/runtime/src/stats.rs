// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Request and inference counters.
//!
//! [`Stats`] is shared by every front end. All read-modify-write sequences
//! happen under one mutex so concurrent requests never lose an update; the
//! running mean uses the incremental form
//! `avg' = avg + (x - avg) / n`.

use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    requests_total: u64,
    inference_total: u64,
    errors_total: u64,
    avg_inference_time_ms: f64,
}

impl Counters {
    fn push_inference(&mut self, ms: f64) {
        self.inference_total += 1;
        let n = self.inference_total as f64;
        self.avg_inference_time_ms += (ms - self.avg_inference_time_ms) / n;
    }
}

/// Process-wide bridge statistics.
#[derive(Debug)]
pub struct Stats {
    counters: Mutex<Counters>,
    started: Instant,
    /// Unix seconds.
    start_time: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
            start_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
        }
    }

    pub fn record_request(&self) {
        self.with(|c| c.requests_total += 1);
    }

    pub fn record_error(&self) {
        self.with(|c| c.errors_total += 1);
    }

    /// Records one completed inference taking `ms` milliseconds.
    pub fn record_inference(&self, ms: f64) {
        self.with(|c| c.push_inference(ms));
    }

    /// Records a batch as `n` inferences of `per_sample_ms` each.
    pub fn record_batch(&self, n: usize, per_sample_ms: f64) {
        self.with(|c| {
            for _ in 0..n {
                c.push_inference(per_sample_ms);
            }
        });
    }

    /// A consistent copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let c = *self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        StatsSnapshot {
            requests_total: c.requests_total,
            inference_total: c.inference_total,
            errors_total: c.errors_total,
            avg_inference_time_ms: c.avg_inference_time_ms,
            start_time: self.start_time,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }

    fn with(&self, f: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut counters);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub inference_total: u64,
    pub errors_total: u64,
    #[serde(serialize_with = "round2")]
    pub avg_inference_time_ms: f64,
    pub start_time: f64,
    #[serde(serialize_with = "round2")]
    pub uptime_seconds: f64,
}

pub(crate) fn round2<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}
