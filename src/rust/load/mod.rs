// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Background CPU load: priority-elevated threads that spin until told to stop.

pub mod priority;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::priority::ThreadPriority;
use crate::runtime::fail::Fail;
use ::std::{
    hint,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread::{
        self,
        JoinHandle,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Default number of load threads.
pub const DEFAULT_LOAD_THREADS: usize = 50;

//======================================================================================================================
// Structures
//======================================================================================================================

/// One background load thread.
struct LoadThread {
    id: usize,
    exit: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A set of background load threads.
pub struct LoadGenerator {
    threads: Vec<LoadThread>,
    requested: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl LoadGenerator {
    /// Spawns `nthreads` load threads running at `priority`. A thread that cannot be spawned is logged and skipped.
    pub fn start(nthreads: usize, priority: ThreadPriority) -> Self {
        let mut threads: Vec<LoadThread> = Vec::with_capacity(nthreads);
        for id in 0..nthreads {
            let exit: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
            let flag: Arc<AtomicBool> = exit.clone();
            let builder: thread::Builder = thread::Builder::new().name(format!("wl-load/{}", id));
            match builder.spawn(move || Self::spin(id, priority, flag)) {
                Ok(handle) => threads.push(LoadThread { id, exit, handle }),
                Err(e) => warn!("start(): load thread {} didn't start ({})", id, e),
            }
        }
        info!("start(): {} of {} load threads running", threads.len(), nthreads);
        Self {
            threads,
            requested: nthreads,
        }
    }

    /// Number of threads that were spawned.
    pub fn running(&self) -> usize {
        self.threads.len()
    }

    /// Number of threads that were asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Tells every thread to exit, then joins them all.
    pub fn stop(mut self) -> Result<(), Fail> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Fail> {
        for thread in &self.threads {
            thread.exit.store(true, Ordering::Release);
        }
        let mut result: Result<(), Fail> = Ok(());
        for thread in self.threads.drain(..) {
            if thread.handle.join().is_err() {
                let cause: String = format!("load thread {} panicked", thread.id);
                error!("stop(): {}", cause);
                result = Err(Fail::new(libc::EIO, &cause));
            }
        }
        result
    }

    fn spin(id: usize, priority: ThreadPriority, exit: Arc<AtomicBool>) {
        priority.apply_or_warn(&format!("wl-load/{}", id));
        let (mut a, mut b): (u32, u32) = (179, 983);
        while !exit.load(Ordering::Acquire) {
            // Junk multiplication.
            let c: u32 = hint::black_box(a.wrapping_mul(b));
            a = b;
            b = c;
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("drop(): {:?}", e);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
