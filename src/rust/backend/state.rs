// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::context::{
        ExecContext,
        ExecScope,
    },
    runtime::{
        fail::Fail,
        poll,
    },
};
use ::std::{
    fmt,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        TryLockError,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Opaque value handed to [TaskBackend::invoke](crate::backend::TaskBackend::invoke) and passed back to the
/// completion callback.
pub type CompletionData = usize;

/// Callback run by the executed unit, with the context it runs in. Blocking is only possible through
/// [ExecScope::Worker].
pub type CompletionFn = Arc<dyn Fn(CompletionData, ExecScope<'_>) + Send + Sync>;

/// Observable phase of a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Dispatched,
}

/// Busy flag plus the guarded completion slot of one backend instance.
///
/// At most one dispatch is in flight at any time. `Idle -> Dispatched` happens only in [DispatchState::try_dispatch]
/// while holding the guard; `Dispatched -> Idle` happens only once the executed unit has run the callback (or when a
/// dedicated worker abandons the request on exit).
pub struct DispatchState {
    /// Busy flag.
    busy: AtomicBool,
    /// Completion data of the in-flight dispatch.
    slot: Mutex<Option<CompletionData>>,
}

/// The unit every backend variant executes: a dispatch state and the completion callback.
pub struct DispatchUnit {
    state: DispatchState,
    complete: CompletionFn,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl DispatchState {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        if self.is_busy() {
            DispatchPhase::Dispatched
        } else {
            DispatchPhase::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Moves from `Idle` to `Dispatched`, storing `data`. Never blocks: contention on the guard means some other
    /// caller is dispatching right now, so it is reported as `EBUSY` like an in-flight dispatch.
    pub fn try_dispatch(&self, data: CompletionData) -> Result<(), Fail> {
        if self.is_busy() {
            return Err(Self::busy());
        }

        let mut slot: MutexGuard<Option<CompletionData>> = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => return Err(Self::busy()),
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Self::busy());
        }
        *slot = Some(data);
        Ok(())
    }

    /// Takes the stored completion data of the in-flight dispatch.
    fn take(&self) -> Option<CompletionData> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Clears the busy flag.
    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Waits, yielding between polls, until no dispatch is in flight.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> Result<(), Fail> {
        poll::yield_until(|| !self.is_busy(), timeout, "dispatch to complete")
    }

    fn busy() -> Fail {
        Fail::new(libc::EBUSY, "dispatch already in flight")
    }
}

impl DispatchUnit {
    pub fn new(complete: CompletionFn) -> Self {
        Self {
            state: DispatchState::new(),
            complete,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Runs the completion callback of the in-flight dispatch, then clears the busy flag.
    pub fn execute<C: ExecContext>(&self, ctx: &C) {
        match self.state.take() {
            Some(data) => {
                let scope: ExecScope = ctx.scope();
                trace!("execute(): context={} (may_sleep={}), data={}", ctx.name(), scope.may_sleep(), data);
                (self.complete)(data, scope);
                self.state.release();
            },
            None => warn!("execute(): spurious execution in {} context", ctx.name()),
        }
    }

    /// Drops the in-flight dispatch without running the callback, then clears the busy flag.
    pub fn abandon(&self) {
        if let Some(data) = self.state.take() {
            debug!("abandon(): dropping dispatch (data={})", data);
        }
        self.state.release();
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Wraps `f` as a [CompletionFn].
pub fn completion<F>(f: F) -> CompletionFn
where
    F: Fn(CompletionData, ExecScope<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchState({:?})", self.phase())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
