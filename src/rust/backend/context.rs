// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Execution contexts in which a dispatched unit may run.
//!
//! A dispatched unit and its completion callback only ever receive a context token. Worker threads hand out a
//! [WorkerContext], which may block on a channel; the deferred procedure executor hands out an [AtomicContext], which
//! cannot leave the executor thread and only offers non-blocking operations.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::crossbeam_channel::{
    Receiver,
    RecvTimeoutError,
    TryRecvError,
};
use ::std::{
    marker::PhantomData,
    time::Duration,
};

//======================================================================================================================
// Traits
//======================================================================================================================

mod private {
    pub trait Sealed {}
}

/// Context in which an executed unit runs.
pub trait ExecContext: private::Sealed {
    /// Name of the context, for tracing.
    fn name(&self) -> &'static str;

    /// Can code in this context block or sleep?
    fn may_sleep(&self) -> bool;

    /// Borrows the context as an [ExecScope] for the completion callback.
    fn scope(&self) -> ExecScope<'_>;
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Context of a thread that may block: work queue workers and dedicated worker threads.
pub struct WorkerContext {
    _private: (),
}

/// Context of a deferred procedure. Neither `Send` nor `Sync`, so it stays on the executor thread.
pub struct AtomicContext {
    _marker: PhantomData<*const ()>,
}

/// Context handed to a completion callback. Only the worker arm gives access to blocking operations.
#[derive(Clone, Copy)]
pub enum ExecScope<'a> {
    Worker(&'a WorkerContext),
    Atomic(&'a AtomicContext),
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl WorkerContext {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }

    /// Blocks until a message arrives on `rx`. With a `timeout`, expiry fails with `ETIMEDOUT`. A disconnected
    /// channel fails with `EPIPE`.
    pub fn recv<T>(&self, rx: &Receiver<T>, timeout: Option<Duration>) -> Result<T, Fail> {
        match timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e: RecvTimeoutError| match e {
                RecvTimeoutError::Timeout => Fail::new(libc::ETIMEDOUT, "receive timed out"),
                RecvTimeoutError::Disconnected => Fail::new(libc::EPIPE, "channel disconnected"),
            }),
            None => rx.recv().map_err(|_| Fail::new(libc::EPIPE, "channel disconnected")),
        }
    }
}

impl AtomicContext {
    pub(crate) fn new() -> Self {
        Self { _marker: PhantomData }
    }

    /// Takes a message from `rx` if one is ready. Never blocks.
    pub fn try_recv<T>(&self, rx: &Receiver<T>) -> Result<Option<T>, Fail> {
        match rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Fail::new(libc::EPIPE, "channel disconnected")),
        }
    }
}

impl ExecScope<'_> {
    pub fn may_sleep(&self) -> bool {
        match self {
            ExecScope::Worker(ctx) => ctx.may_sleep(),
            ExecScope::Atomic(ctx) => ctx.may_sleep(),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl private::Sealed for WorkerContext {}

impl ExecContext for WorkerContext {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn may_sleep(&self) -> bool {
        true
    }

    fn scope(&self) -> ExecScope<'_> {
        ExecScope::Worker(self)
    }
}

impl private::Sealed for AtomicContext {}

impl ExecContext for AtomicContext {
    fn name(&self) -> &'static str {
        "atomic"
    }

    fn may_sleep(&self) -> bool {
        false
    }

    fn scope(&self) -> ExecScope<'_> {
        ExecScope::Atomic(self)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
