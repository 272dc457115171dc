// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Human-readable reports of run results and latency distributions.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    control::TestResult,
    harness::{
        sample::LatencySample,
        stats::Statistics,
    },
    runtime::fail::Fail,
};
use ::histogram::{
    Bucket,
    Histogram,
};
use ::std::io::{
    self,
    Write,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Relative precision of the distribution is 2^-GROUPING_POWER.
const GROUPING_POWER: u8 = 7;

/// Largest latency the distribution can hold is 2^MAX_VALUE_POWER - 1 microseconds.
const MAX_VALUE_POWER: u8 = 32;

/// Percentiles printed by [LatencyDistribution::write].
const PERCENTILES: [(&str, f64); 3] = [("p50", 50.0), ("p90", 90.0), ("p99", 99.0)];

//======================================================================================================================
// Structures
//======================================================================================================================

/// Latency histogram, in microseconds.
pub struct LatencyDistribution {
    histogram: Histogram,
    max: u64,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl LatencyDistribution {
    pub fn new() -> Result<Self, Fail> {
        let histogram: Histogram = match Histogram::new(GROUPING_POWER, MAX_VALUE_POWER) {
            Ok(histogram) => histogram,
            Err(e) => {
                let cause: String = format!("cannot create histogram ({:?})", e);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        Ok(Self {
            histogram,
            max: 0,
        })
    }

    /// Builds the distribution of the valid samples in `samples`.
    pub fn from_samples<'a, I>(samples: I) -> Result<Self, Fail>
    where
        I: IntoIterator<Item = &'a LatencySample>,
    {
        let mut distribution: LatencyDistribution = Self::new()?;
        for us in samples.into_iter().filter_map(LatencySample::valid_duration) {
            distribution.record(us)?;
        }
        Ok(distribution)
    }

    pub fn record(&mut self, us: u64) -> Result<(), Fail> {
        if let Err(e) = self.histogram.increment(us) {
            let cause: String = format!("latency out of range (us={}, {:?})", us, e);
            warn!("record(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        self.max = self.max.max(us);
        Ok(())
    }

    /// Upper bound of the bucket holding the `p`-th percentile, `p` in `0.0..=100.0`. Never larger than the largest
    /// recorded latency. `None` if nothing was recorded.
    pub fn percentile(&self, p: f64) -> Result<Option<u64>, Fail> {
        match self.histogram.percentile(p) {
            Ok(bucket) => Ok(bucket.map(|bucket: Bucket| bucket.end().min(self.max))),
            Err(e) => {
                let cause: String = format!("invalid percentile (p={}, {:?})", p, e);
                error!("percentile(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }

    /// Writes one line per percentile.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), Fail> {
        for (name, p) in PERCENTILES {
            match self.percentile(p)? {
                Some(us) => writeln!(out, "{}:   {} us", name, us)?,
                None => writeln!(out, "{}:   -", name)?,
            }
        }
        Ok(())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Writes a run result the way `wl-test` prints it.
pub fn write_result<W: Write>(out: &mut W, result: &TestResult) -> io::Result<()> {
    writeln!(out, "N = {}", result.n)?;
    writeln!(out, "Avg delay = {} us", result.avg)?;
    writeln!(out, "Std Dev = {:.3} us", result.std_dev())?;
    writeln!(out, "Max delay = {} us", result.max)?;
    if result.err_cnt != 0 {
        writeln!(out, "Errors = {}", result.err_cnt)?;
    }
    Ok(())
}

/// Writes statistics computed outside the control channel.
pub fn write_statistics<W: Write>(out: &mut W, stats: &Statistics) -> io::Result<()> {
    writeln!(out, "N = {}", stats.n)?;
    writeln!(out, "Avg delay = {} us", stats.mean)?;
    writeln!(out, "Std Dev = {:.3} us", (stats.variance as f64).sqrt())?;
    writeln!(out, "Max delay = {} us", stats.max)?;
    Ok(())
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
