// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Monotonic microsecond clock used to stamp dispatch and execution times.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    fmt,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        OnceLock,
    },
    time::Instant,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Raw value of an [AtomicTimestamp] that has not been stamped.
const UNSET: u64 = u64::MAX;

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Reference point of all timestamps in this process.
static EPOCH: OnceLock<Instant> = OnceLock::new();

//======================================================================================================================
// Structures
//======================================================================================================================

/// Microseconds elapsed since the process clock epoch.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

/// A timestamp cell that can be stamped from any thread without locking.
pub struct AtomicTimestamp(AtomicU64);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Timestamp {
    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Difference `self - earlier` in microseconds, saturating at zero.
    pub fn saturating_micros_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl AtomicTimestamp {
    pub const fn new() -> Self {
        Self(AtomicU64::new(UNSET))
    }

    /// Records the current time.
    pub fn stamp(&self) {
        self.0.store(now().as_micros(), Ordering::Release);
    }

    pub fn store(&self, timestamp: Timestamp) {
        self.0.store(timestamp.as_micros(), Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(UNSET, Ordering::Release);
    }

    /// Returns the recorded time, if any.
    pub fn load(&self) -> Option<Timestamp> {
        match self.0.load(Ordering::Acquire) {
            UNSET => None,
            us => Some(Timestamp(us)),
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Reads the monotonic clock.
pub fn now() -> Timestamp {
    let epoch: &Instant = EPOCH.get_or_init(Instant::now);
    Timestamp(epoch.elapsed().as_micros() as u64)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl Default for AtomicTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
