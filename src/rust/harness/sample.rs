// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    clock::{
        AtomicTimestamp,
        Timestamp,
    },
    fail::Fail,
};
use ::std::collections::TryReserveError;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Invoke and execution times of one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencySample {
    pub invoke: Timestamp,
    /// Missing if the dispatched unit never ran.
    pub exec: Option<Timestamp>,
}

/// Execution time cells written by the completion callback, one per iteration.
pub struct ExecStamps(Vec<AtomicTimestamp>);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl LatencySample {
    pub fn new(invoke: Timestamp, exec: Option<Timestamp>) -> Self {
        Self { invoke, exec }
    }

    /// A sample is anomalous if it has no execution time or if it executed before it was invoked.
    pub fn is_anomaly(&self) -> bool {
        match self.exec {
            Some(exec) => exec < self.invoke,
            None => true,
        }
    }

    /// Invoke-to-execution latency in microseconds, saturating at zero. `None` if the unit never ran.
    pub fn duration(&self) -> Option<u64> {
        self.exec.map(|exec: Timestamp| exec.saturating_micros_since(self.invoke))
    }

    /// Latency of a valid sample.
    pub fn valid_duration(&self) -> Option<u64> {
        if self.is_anomaly() {
            None
        } else {
            self.duration()
        }
    }
}

impl ExecStamps {
    /// Allocates `n` unset cells. Fails with `ENOMEM` instead of aborting the process.
    pub fn allocate(n: usize) -> Result<Self, Fail> {
        let mut cells: Vec<AtomicTimestamp> = Vec::new();
        cells.try_reserve_exact(n).map_err(|e: TryReserveError| {
            let cause: String = format!("cannot allocate {} timestamps ({})", n, e);
            error!("allocate(): {}", cause);
            Fail::new(libc::ENOMEM, &cause)
        })?;
        cells.resize_with(n, AtomicTimestamp::new);
        Ok(Self(cells))
    }

    /// Stamps the current time into cell `i`. Out-of-range indices are ignored.
    pub fn stamp(&self, i: usize) {
        match self.0.get(i) {
            Some(cell) => cell.stamp(),
            None => warn!("stamp(): completion data out of range (i={}, len={})", i, self.0.len()),
        }
    }

    pub fn clear(&self, i: usize) {
        if let Some(cell) = self.0.get(i) {
            cell.clear();
        }
    }

    pub fn get(&self, i: usize) -> Option<Timestamp> {
        self.0.get(i).and_then(AtomicTimestamp::load)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
