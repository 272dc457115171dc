// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    thread,
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Polls `condition` until it holds, yielding the processor between rounds. Without a `timeout` this may spin
/// forever; with one, expiry is reported as `ETIMEDOUT`. Must only be called from a context that may block.
pub fn yield_until<F>(mut condition: F, timeout: Option<Duration>, what: &str) -> Result<(), Fail>
where
    F: FnMut() -> bool,
{
    let deadline: Option<Instant> = timeout.map(|timeout: Duration| Instant::now() + timeout);
    loop {
        if condition() {
            return Ok(());
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let cause: String = format!("timed out waiting for {} (timeout={:?})", what, timeout);
                error!("yield_until(): {}", cause);
                return Err(Fail::new(libc::ETIMEDOUT, &cause));
            }
        }
        thread::yield_now();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
