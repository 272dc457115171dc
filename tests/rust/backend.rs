// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::std::{
    hint,
    sync::{
        Arc,
        Mutex,
    },
    time::{
        Duration,
        Instant,
    },
};
use ::wakelat::{
    backend::{
        context::{
            AtomicContext,
            ExecScope,
        },
        state::{
            self,
            CompletionData,
            CompletionFn,
        },
    },
    runtime::{
        logging,
        poll,
    },
    BackendKind,
    SubVariant,
    TaskBackend,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Every backend variant, with the sub-variant that selects it.
const VARIANTS: [(BackendKind, SubVariant); 4] = [
    (BackendKind::WorkQueue, SubVariant::SharedQueue),
    (BackendKind::WorkQueue, SubVariant::PrivateQueue),
    (BackendKind::Tasklet, SubVariant::Default),
    (BackendKind::Thread, SubVariant::Default),
];

/// Upper bound on any wait in these tests.
const TIMEOUT: Duration = Duration::from_secs(10);

//======================================================================================================================
// Helpers
//======================================================================================================================

/// Completion callback that records its data and then holds the dispatch until released. Worker contexts wait for the
/// release; deferred procedures spin for it, since they cannot block.
struct Gate {
    entered: Receiver<CompletionData>,
    release: Sender<()>,
    seen: Arc<Mutex<Vec<CompletionData>>>,
}

impl Gate {
    fn new() -> (CompletionFn, Self) {
        let (entered_tx, entered): (Sender<CompletionData>, Receiver<CompletionData>) = crossbeam_channel::unbounded();
        let (release, release_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::unbounded();
        let seen: Arc<Mutex<Vec<CompletionData>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: Arc<Mutex<Vec<CompletionData>>> = seen.clone();
        let complete: CompletionFn = state::completion(move |data: CompletionData, scope: ExecScope| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(data);
            }
            let _ = entered_tx.send(data);
            match scope {
                ExecScope::Worker(ctx) => {
                    let _ = ctx.recv(&release_rx, Some(TIMEOUT));
                },
                ExecScope::Atomic(ctx) => spin_recv(ctx, &release_rx),
            }
        });
        (
            complete,
            Self {
                entered,
                release,
                seen,
            },
        )
    }

    fn seen(&self) -> Vec<CompletionData> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }
}

/// Spins until a release arrives, the channel disconnects or [TIMEOUT] expires.
fn spin_recv(ctx: &AtomicContext, rx: &Receiver<()>) {
    let deadline: Instant = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        match ctx.try_recv(rx) {
            Ok(None) => hint::spin_loop(),
            Ok(Some(())) | Err(_) => return,
        }
    }
}

fn wait_idle(backend: &dyn TaskBackend) -> Result<()> {
    poll::yield_until(|| !backend.is_busy(), Some(TIMEOUT), "backend to become idle")?;
    Ok(())
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Dispatches run the callback with their data and leave the backend idle.
#[test]
fn dispatch_runs_callback() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        let (complete, gate): (CompletionFn, Gate) = Gate::new();
        backend.init(subvariant, complete)?;

        for data in [3, 5, 8] {
            gate.release.send(())?;
            backend.invoke(data)?;
            wakelat::ensure_eq!(gate.entered.recv_timeout(TIMEOUT)?, data);
            wait_idle(backend.as_ref())?;
        }
        backend.remove()?;
        wakelat::ensure_eq!(gate.seen(), vec![3, 5, 8]);
    }
    Ok(())
}

/// Invokes while a dispatch is in flight fail with EBUSY and leave the stored data alone.
#[test]
fn invoke_while_dispatched_is_busy() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        let (complete, gate): (CompletionFn, Gate) = Gate::new();
        backend.init(subvariant, complete)?;

        backend.invoke(1)?;
        wakelat::ensure_eq!(backend.is_busy(), true);
        for data in [2, 3, 4] {
            match backend.invoke(data) {
                Ok(()) => anyhow::bail!("{}: invoke({}) should be busy", kind, data),
                Err(e) => wakelat::ensure_eq!(e.errno, libc::EBUSY),
            }
        }
        wakelat::ensure_eq!(gate.entered.recv_timeout(TIMEOUT)?, 1);
        match backend.invoke(5) {
            Ok(()) => anyhow::bail!("{}: invoke while executing should be busy", kind),
            Err(e) => wakelat::ensure_eq!(e.is_busy(), true),
        }

        gate.release.send(())?;
        wait_idle(backend.as_ref())?;
        gate.release.send(())?;
        backend.invoke(6)?;
        wakelat::ensure_eq!(gate.entered.recv_timeout(TIMEOUT)?, 6);
        wait_idle(backend.as_ref())?;

        backend.remove()?;
        wakelat::ensure_eq!(gate.seen(), vec![1, 6]);
    }
    Ok(())
}

/// Removing a backend waits for its dispatch, and a bounded wait reports the stuck dispatch without releasing it.
#[test]
fn remove_waits_for_dispatch() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(Duration::from_millis(20)));
        let (complete, gate): (CompletionFn, Gate) = Gate::new();
        backend.init(subvariant, complete)?;

        backend.invoke(9)?;
        gate.entered.recv_timeout(TIMEOUT)?;
        match backend.remove() {
            Ok(()) => anyhow::bail!("{}: remove should time out while dispatched", kind),
            Err(e) => wakelat::ensure_eq!(e.errno, libc::ETIMEDOUT),
        }
        wakelat::ensure_eq!(backend.is_busy(), true);
        wakelat::ensure_eq!(backend.is_initialized(), true);

        gate.release.send(())?;
        wait_idle(backend.as_ref())?;
        backend.remove()?;
        wakelat::ensure_eq!(backend.is_busy(), false);
        wakelat::ensure_eq!(backend.is_initialized(), false);

        // Removing an idle backend returns at once.
        backend.remove()?;
    }
    Ok(())
}

/// A removed backend can be initialized again.
#[test]
fn reinit_after_remove() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        for round in 0..3 {
            let (complete, gate): (CompletionFn, Gate) = Gate::new();
            backend.init(subvariant, complete)?;
            gate.release.send(())?;
            backend.invoke(round)?;
            wait_idle(backend.as_ref())?;
            backend.remove()?;
            wakelat::ensure_eq!(gate.seen(), vec![round]);
        }
    }
    Ok(())
}

/// Backends refuse use before initialization and a second initialization.
#[test]
fn lifecycle_errors() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        wakelat::ensure_eq!(backend.kind(), kind);
        wakelat::ensure_eq!(backend.name(), kind.name());
        wakelat::ensure_eq!(backend.is_initialized(), false);
        match backend.invoke(0) {
            Ok(()) => anyhow::bail!("{}: invoke before init should fail", kind),
            Err(e) => wakelat::ensure_eq!(e.errno, libc::ENOTCONN),
        }

        let (complete, _gate): (CompletionFn, Gate) = Gate::new();
        backend.init(subvariant, complete.clone())?;
        wakelat::ensure_eq!(backend.is_initialized(), true);
        match backend.init(subvariant, complete) {
            Ok(()) => anyhow::bail!("{}: second init should fail", kind),
            Err(e) => wakelat::ensure_eq!(e.errno, libc::EALREADY),
        }
        backend.remove()?;
    }
    Ok(())
}

/// Dropping a backend with a dispatch in flight drains it.
#[test]
fn drop_drains_dispatch() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        let (complete, gate): (CompletionFn, Gate) = Gate::new();
        backend.init(subvariant, complete)?;
        backend.invoke(4)?;
        gate.release.send(())?;
        drop(backend);
        wakelat::ensure_eq!(gate.seen(), vec![4]);
    }
    Ok(())
}

/// Deferred procedures hand the callback an atomic context; every other backend hands out a worker context.
#[test]
fn callback_sees_backend_context() -> Result<()> {
    logging::initialize();
    for (kind, subvariant) in VARIANTS {
        let mut backend: Box<dyn TaskBackend> = kind.instantiate(Some(TIMEOUT));
        let (tx, rx): (Sender<bool>, Receiver<bool>) = crossbeam_channel::bounded(1);
        backend.init(
            subvariant,
            state::completion(move |_: CompletionData, scope: ExecScope| {
                let _ = tx.try_send(scope.may_sleep());
            }),
        )?;
        backend.invoke(0)?;
        wakelat::ensure_eq!(rx.recv_timeout(TIMEOUT)?, kind != BackendKind::Tasklet);
        wait_idle(backend.as_ref())?;
        backend.remove()?;
    }
    Ok(())
}
