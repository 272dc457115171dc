// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Dedicated worker thread backend.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::{
        context::WorkerContext,
        state::{
            CompletionData,
            CompletionFn,
            DispatchUnit,
        },
        task_name,
        BackendKind,
        SubVariant,
        TaskBackend,
        TaskName,
    },
    load::priority::ThreadPriority,
    runtime::fail::Fail,
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
    TrySendError,
};
use ::std::{
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
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Name of the worker thread.
const WORKER_NAME: &str = "wl-kthread";

//======================================================================================================================
// Structures
//======================================================================================================================

/// State shared between the backend and its worker thread.
struct Shared {
    unit: DispatchUnit,
    has_request: AtomicBool,
    need_exit: AtomicBool,
}

/// A running worker thread.
struct Worker {
    shared: Arc<Shared>,
    /// Wakes the worker. Holds at most one pending wake-up.
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

/// Dedicated thread backend.
pub struct ThreadBackend {
    name: TaskName,
    worker: Option<Worker>,
    timeout: Option<Duration>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Shared {
    /// Waits for "has request or should exit" and serves requests until asked to exit. An exit request wins over a
    /// pending dispatch, which is then dropped and its busy flag cleared.
    fn serve(&self, wake: Receiver<()>) {
        let ctx: WorkerContext = WorkerContext::new();
        loop {
            if self.need_exit.load(Ordering::Acquire) {
                self.unit.abandon();
                break;
            }
            if self.has_request.swap(false, Ordering::AcqRel) {
                self.unit.execute(&ctx);
                continue;
            }
            if ctx.recv(&wake, None).is_err() {
                // The backend is gone without asking us to exit.
                self.unit.abandon();
                break;
            }
        }
    }
}

impl Worker {
    fn spawn(complete: CompletionFn) -> Result<Self, Fail> {
        let shared: Arc<Shared> = Arc::new(Shared {
            unit: DispatchUnit::new(complete),
            has_request: AtomicBool::new(false),
            need_exit: AtomicBool::new(false),
        });
        let (wake, rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);

        let worker_shared: Arc<Shared> = shared.clone();
        let builder: thread::Builder = thread::Builder::new().name(WORKER_NAME.to_string());
        let handle: JoinHandle<()> = match builder.spawn(move || {
            match ThreadPriority::current() {
                Ok(priority) => info!("{}: {}", WORKER_NAME, priority),
                Err(e) => debug!("{}: cannot read scheduling priority ({:?})", WORKER_NAME, e),
            }
            worker_shared.serve(rx)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                let cause: String = format!("cannot spawn {} ({})", WORKER_NAME, e);
                error!("spawn(): {}", cause);
                return Err(Fail::new(libc::EAGAIN, &cause));
            },
        };

        Ok(Self { shared, wake, handle })
    }

    /// Wakes the worker. Never blocks: a full channel already holds a wake-up.
    fn signal(&self) -> Result<(), Fail> {
        match self.wake.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(Fail::new(libc::EPIPE, "worker thread exited")),
        }
    }

    /// Asks the worker to exit and waits for it.
    fn stop(self) -> Result<(), Fail> {
        self.shared.need_exit.store(true, Ordering::Release);
        let _ = self.signal();
        if self.handle.join().is_err() {
            let cause: String = format!("{} panicked", WORKER_NAME);
            error!("stop(): {}", cause);
            return Err(Fail::new(libc::EIO, &cause));
        }
        Ok(())
    }
}

impl ThreadBackend {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            name: task_name(BackendKind::Thread.name()),
            worker: None,
            timeout,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl TaskBackend for ThreadBackend {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Thread
    }

    fn init(&mut self, _subvariant: SubVariant, complete: CompletionFn) -> Result<(), Fail> {
        if self.worker.is_some() {
            let cause: String = format!("backend {} already initialized", self.name);
            error!("init(): {}", cause);
            return Err(Fail::new(libc::EALREADY, &cause));
        }
        self.worker = Some(Worker::spawn(complete)?);
        Ok(())
    }

    fn invoke(&self, data: CompletionData) -> Result<(), Fail> {
        let worker: &Worker = match self.worker.as_ref() {
            Some(worker) => worker,
            None => return Err(Fail::new(libc::ENOTCONN, "backend not initialized")),
        };

        worker.shared.unit.state().try_dispatch(data)?;
        worker.shared.has_request.store(true, Ordering::Release);
        if let Err(e) = worker.signal() {
            worker.shared.has_request.store(false, Ordering::Release);
            worker.shared.unit.abandon();
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Fail> {
        if let Some(worker) = self.worker.as_ref() {
            worker.shared.unit.state().wait_idle(self.timeout)?;
        }
        match self.worker.take() {
            Some(worker) => worker.stop(),
            None => Ok(()),
        }
    }

    fn is_initialized(&self) -> bool {
        self.worker.is_some()
    }

    fn is_busy(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker: &Worker| worker.shared.unit.state().is_busy())
    }
}

impl Drop for ThreadBackend {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.remove() {
                warn!("drop(): failed to remove {} ({:?})", self.name, e);
            }
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
