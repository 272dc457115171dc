// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    harness::RunReport,
    runtime::fail::Fail,
};
use ::std::mem;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Result aggregate of a run, as written back through the control channel. Times are in microseconds.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestResult {
    /// Declared size of this structure. Set by the caller, checked before a run.
    pub size: u32,
    /// Valid samples.
    pub n: u32,
    pub avg: u32,
    pub max: u32,
    /// Population variance, in square microseconds.
    pub var: u64,
    pub err_cnt: u32,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TestResult {
    /// Size of the structure, as declared by well-behaved callers.
    pub const SIZE: u32 = mem::size_of::<TestResult>() as u32;

    /// Creates an empty result with its size field preset.
    pub fn new() -> Self {
        Self {
            size: Self::SIZE,
            ..Default::default()
        }
    }

    /// Fails with `EINVAL` if the declared size does not match the structure.
    pub fn check_size(&self) -> Result<(), Fail> {
        if self.size != Self::SIZE {
            let cause: String = format!(
                "result buffer size mismatch (declared={}, expected={})",
                self.size,
                Self::SIZE
            );
            error!("check_size(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(())
    }

    /// Fills in the statistics of `report`, keeping the declared size.
    pub fn fill(&mut self, report: &RunReport) {
        let clamp = |v: u64| -> u32 { v.min(u32::MAX as u64) as u32 };
        self.n = clamp(report.stats.n);
        self.avg = clamp(report.stats.mean);
        self.max = clamp(report.stats.max);
        self.var = report.stats.variance;
        self.err_cnt = clamp(report.err_cnt());
    }

    /// Standard deviation in microseconds.
    pub fn std_dev(&self) -> f64 {
        (self.var as f64).sqrt()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
