// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Streaming latency statistics.
//!
//! Sums are kept in 128-bit integers and durations are clamped to `u32::MAX` microseconds. The population variance
//! `(n * sum(d^2) - sum(d)^2) / n^2` is exact while both products fit in 128 bits, which always holds below 2^32
//! samples. Past that it falls back to the truncated moments `sum(d^2) / n - (sum(d) / n)^2`. It is never negative.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::harness::sample::LatencySample;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Accumulates latency samples.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    n: u64,
    sum: u128,
    sum_sq: u128,
    max: u64,
    anomalies: u64,
}

/// Summary of a set of latency samples, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Number of valid samples.
    pub n: u64,
    /// Truncated mean.
    pub mean: u64,
    pub max: u64,
    /// Population variance, truncated.
    pub variance: u64,
    /// Samples that never executed or executed before they were invoked.
    pub anomalies: u64,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample, counting it as an anomaly if it has no valid duration.
    pub fn push(&mut self, sample: &LatencySample) {
        match sample.valid_duration() {
            Some(us) => self.push_duration(us),
            None => {
                trace!("push(): anomalous sample {:?}", sample);
                self.record_anomaly()
            },
        }
    }

    pub fn push_duration(&mut self, us: u64) {
        let d: u64 = us.min(u32::MAX as u64);
        self.n = self.n.saturating_add(1);
        self.sum = self.sum.saturating_add(d as u128);
        self.sum_sq = self.sum_sq.saturating_add((d as u128) * (d as u128));
        self.max = self.max.max(d);
    }

    pub fn record_anomaly(&mut self) {
        self.anomalies += 1;
    }

    pub fn finish(&self) -> Statistics {
        if self.n == 0 {
            return Statistics {
                anomalies: self.anomalies,
                ..Statistics::default()
            };
        }

        let n: u128 = self.n as u128;
        let mean: u128 = self.sum / n;
        let variance: u128 = match (n.checked_mul(self.sum_sq), self.sum.checked_mul(self.sum)) {
            (Some(scaled), Some(squared)) => scaled.saturating_sub(squared) / (n * n),
            _ => (self.sum_sq / n).saturating_sub(mean * mean),
        };
        Statistics {
            n: self.n,
            mean: mean as u64,
            max: self.max,
            variance: variance.min(u64::MAX as u128) as u64,
            anomalies: self.anomalies,
        }
    }
}

impl Statistics {
    /// Computes statistics over a sequence of samples.
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a LatencySample>,
    {
        let mut aggregator: Aggregator = Aggregator::new();
        for sample in samples {
            aggregator.push(sample);
        }
        aggregator.finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
