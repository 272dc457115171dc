// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Direct thread-wake probe: measures how long a sleeping thread takes to run after being signalled, with no backend
//! in between.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    harness::{
        sample::LatencySample,
        stats::{
            Aggregator,
            Statistics,
        },
    },
    load::priority::ThreadPriority,
    runtime::{
        clock::{
            self,
            Timestamp,
        },
        fail::Fail,
    },
};
use ::crossbeam_channel::{
    Receiver,
    RecvTimeoutError,
    Sender,
};
use ::std::{
    thread::{
        self,
        JoinHandle,
    },
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Default number of probe iterations.
pub const DEFAULT_PROBE_ITERATIONS: u32 = 100;

/// Name of the probe thread.
const PROBE_NAME: &str = "wl-probe";

//======================================================================================================================
// Structures
//======================================================================================================================

/// Driver to probe.
enum Signal {
    /// Wake up. Carries the invoke time.
    Invoke(Timestamp),
    Exit,
}

/// Probe to driver.
enum Event {
    Ready,
    Done(LatencySample),
}

/// Outcome of a probe run.
#[derive(Clone, Debug)]
pub struct ProbeReport {
    pub iterations: u32,
    pub samples: Vec<LatencySample>,
    pub stats: Statistics,
}

/// A probe thread and the channels that drive it.
pub struct DirectProbe {
    invoke: Sender<Signal>,
    done: Receiver<Event>,
    handle: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl DirectProbe {
    /// Spawns the probe thread at `priority` and waits until it is ready. Each later wait for the probe is bounded
    /// by `timeout`.
    pub fn spawn(priority: ThreadPriority, timeout: Option<Duration>) -> Result<Self, Fail> {
        let (invoke, invoke_rx): (Sender<Signal>, Receiver<Signal>) = crossbeam_channel::bounded(1);
        let (done_tx, done): (Sender<Event>, Receiver<Event>) = crossbeam_channel::bounded(1);

        let builder: thread::Builder = thread::Builder::new().name(PROBE_NAME.to_string());
        let handle: JoinHandle<()> = match builder.spawn(move || Self::serve(priority, invoke_rx, done_tx)) {
            Ok(handle) => handle,
            Err(e) => {
                let cause: String = format!("cannot create probe thread ({})", e);
                error!("spawn(): {}", cause);
                return Err(Fail::new(libc::EAGAIN, &cause));
            },
        };

        let mut probe: DirectProbe = DirectProbe {
            invoke,
            done,
            handle: Some(handle),
            timeout,
        };
        match probe.wait()? {
            Event::Ready => Ok(probe),
            Event::Done(_) => {
                probe.shutdown_inner()?;
                Err(Fail::new(libc::EPROTO, "probe reported a sample before it was ready"))
            },
        }
    }

    /// Wakes the probe `iterations` times, one wake-up at a time. `progress` is called every 10 iterations.
    pub fn run<F: FnMut(u32)>(&mut self, iterations: u32, mut progress: F) -> Result<ProbeReport, Fail> {
        let mut samples: Vec<LatencySample> = Vec::new();
        samples.try_reserve_exact(iterations as usize).map_err(|e| {
            let cause: String = format!("cannot allocate {} samples ({})", iterations, e);
            error!("run(): {}", cause);
            Fail::new(libc::ENOMEM, &cause)
        })?;

        let mut aggregator: Aggregator = Aggregator::new();
        for i in 0..iterations {
            if i % 10 == 0 {
                progress(i);
            }
            if self.invoke.send(Signal::Invoke(clock::now())).is_err() {
                return Err(Self::gone());
            }
            match self.wait()? {
                Event::Done(sample) => {
                    trace!("run(): iteration {}: {:?}", i, sample);
                    aggregator.push(&sample);
                    samples.push(sample);
                },
                Event::Ready => warn!("run(): unexpected ready signal"),
            }
        }

        let stats: Statistics = aggregator.finish();
        info!(
            "run(): probe n={} avg={}us max={}us var={}",
            stats.n, stats.mean, stats.max, stats.variance
        );
        Ok(ProbeReport {
            iterations,
            samples,
            stats,
        })
    }

    /// Tells the probe thread to exit and joins it.
    pub fn shutdown(mut self) -> Result<(), Fail> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), Fail> {
        let handle: JoinHandle<()> = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        let _ = self.invoke.send(Signal::Exit);
        if handle.join().is_err() {
            let cause: String = format!("{} panicked", PROBE_NAME);
            error!("shutdown(): {}", cause);
            return Err(Fail::new(libc::EIO, &cause));
        }
        Ok(())
    }

    fn wait(&self) -> Result<Event, Fail> {
        let result: Result<Event, RecvTimeoutError> = match self.timeout {
            Some(timeout) => self.done.recv_timeout(timeout),
            None => self.done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match result {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => {
                let cause: String = format!("probe did not answer within {:?}", self.timeout);
                error!("wait(): {}", cause);
                Err(Fail::new(libc::ETIMEDOUT, &cause))
            },
            Err(RecvTimeoutError::Disconnected) => Err(Self::gone()),
        }
    }

    fn gone() -> Fail {
        Fail::new(libc::EPIPE, "probe thread exited")
    }

    fn serve(priority: ThreadPriority, invoke: Receiver<Signal>, done: Sender<Event>) {
        priority.apply_or_warn(PROBE_NAME);
        if let Ok(current) = ThreadPriority::current() {
            info!("{}: {}", PROBE_NAME, current);
        }
        if done.send(Event::Ready).is_err() {
            return;
        }
        for signal in invoke {
            match signal {
                Signal::Invoke(at) => {
                    let sample: LatencySample = LatencySample::new(at, Some(clock::now()));
                    if done.send(Event::Done(sample)).is_err() {
                        break;
                    }
                },
                Signal::Exit => break,
            }
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for DirectProbe {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            warn!("drop(): {:?}", e);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
