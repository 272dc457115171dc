// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Work queue backend. Dispatches are submitted either to the process-wide system work queue or to a work queue
//! owned by the backend instance.

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
    runtime::fail::Fail,
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        OnceLock,
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

/// Name of the process-wide work queue.
const SYSTEM_QUEUE_NAME: &str = "wl-events";

/// Name of work queues owned by a backend instance.
const PRIVATE_QUEUE_NAME: &str = "wl-workq";

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Process-wide work queue, created on first use and never destroyed.
static SYSTEM_QUEUE: OnceLock<WorkQueue> = OnceLock::new();

//======================================================================================================================
// Traits
//======================================================================================================================

/// A unit of work that can be queued on a [WorkQueue].
pub trait Work: Send + Sync {
    fn run(&self, ctx: &WorkerContext);
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// A pool of worker threads fed by an unbounded channel. Queueing never blocks.
pub struct WorkQueue {
    name: String,
    tx: Option<Sender<Arc<dyn Work>>>,
    workers: Vec<JoinHandle<()>>,
}

/// Where a work queue backend submits its dispatches.
enum Target {
    Shared(&'static WorkQueue),
    Private(WorkQueue),
}

/// Work queue backend.
pub struct WorkQueueBackend {
    name: TaskName,
    unit: Option<Arc<DispatchUnit>>,
    target: Option<Target>,
    timeout: Option<Duration>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl WorkQueue {
    /// Creates a work queue served by `nworkers` threads.
    pub fn new(name: &str, nworkers: usize) -> Result<Self, Fail> {
        let (tx, rx): (Sender<Arc<dyn Work>>, Receiver<Arc<dyn Work>>) = crossbeam_channel::unbounded();
        let mut queue: WorkQueue = WorkQueue {
            name: name.to_string(),
            tx: Some(tx),
            workers: Vec::with_capacity(nworkers),
        };

        for i in 0..nworkers.max(1) {
            let rx: Receiver<Arc<dyn Work>> = rx.clone();
            let builder: thread::Builder = thread::Builder::new().name(format!("{}/{}", name, i));
            match builder.spawn(move || Self::worker(rx)) {
                Ok(handle) => queue.workers.push(handle),
                Err(e) => {
                    let cause: String = format!("cannot spawn worker {} of {} ({})", i, name, e);
                    error!("new(): {}", cause);
                    // Dropping the queue joins the workers spawned so far.
                    return Err(Fail::new(libc::EAGAIN, &cause));
                },
            }
        }

        debug!("new(): created work queue {} ({} workers)", name, queue.workers.len());
        Ok(queue)
    }

    /// Creates a work queue with one worker per available CPU.
    pub fn per_cpu(name: &str) -> Result<Self, Fail> {
        let ncpus: usize = thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
        Self::new(name, ncpus)
    }

    /// Returns the process-wide work queue, creating it if needed. May block.
    pub fn system() -> Result<&'static WorkQueue, Fail> {
        if let Some(queue) = SYSTEM_QUEUE.get() {
            return Ok(queue);
        }
        let queue: WorkQueue = Self::per_cpu(SYSTEM_QUEUE_NAME)?;
        // If another thread won the race, our queue is dropped and its workers joined.
        let _ = SYSTEM_QUEUE.set(queue);
        match SYSTEM_QUEUE.get() {
            Some(queue) => Ok(queue),
            None => Err(Fail::new(libc::EAGAIN, "system work queue unavailable")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submits `work`. Never blocks.
    pub fn queue(&self, work: Arc<dyn Work>) -> Result<(), Fail> {
        match self.tx.as_ref() {
            Some(tx) => tx.send(work).map_err(|_| {
                let cause: String = format!("work queue {} has no workers", self.name);
                error!("queue(): {}", cause);
                Fail::new(libc::EPIPE, &cause)
            }),
            None => Err(Fail::new(libc::EPIPE, "work queue destroyed")),
        }
    }

    /// Lets the workers drain already queued work, then joins them.
    pub fn destroy(mut self) -> Result<(), Fail> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Fail> {
        // Workers exit once the channel is empty and disconnected.
        self.tx.take();
        let mut result: Result<(), Fail> = Ok(());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                let cause: String = format!("worker of {} panicked", self.name);
                error!("shutdown(): {}", cause);
                result = Err(Fail::new(libc::EIO, &cause));
            }
        }
        result
    }

    fn worker(rx: Receiver<Arc<dyn Work>>) {
        let ctx: WorkerContext = WorkerContext::new();
        while let Ok(work) = ctx.recv(&rx, None) {
            work.run(&ctx);
        }
    }
}

impl Target {
    fn queue(&self) -> &WorkQueue {
        match self {
            Target::Shared(queue) => *queue,
            Target::Private(queue) => queue,
        }
    }
}

impl WorkQueueBackend {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            name: task_name(BackendKind::WorkQueue.name()),
            unit: None,
            target: None,
            timeout,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Work for DispatchUnit {
    fn run(&self, ctx: &WorkerContext) {
        self.execute(ctx);
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("drop(): {:?}", e);
        }
    }
}

impl TaskBackend for WorkQueueBackend {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::WorkQueue
    }

    fn init(&mut self, subvariant: SubVariant, complete: CompletionFn) -> Result<(), Fail> {
        if self.unit.is_some() {
            let cause: String = format!("backend {} already initialized", self.name);
            error!("init(): {}", cause);
            return Err(Fail::new(libc::EALREADY, &cause));
        }

        let target: Target = match subvariant {
            SubVariant::PrivateQueue => Target::Private(WorkQueue::per_cpu(PRIVATE_QUEUE_NAME)?),
            SubVariant::Default | SubVariant::SharedQueue => Target::Shared(WorkQueue::system()?),
        };
        debug!("init(): {} submits to {}", self.name, target.queue().name());

        self.target = Some(target);
        self.unit = Some(Arc::new(DispatchUnit::new(complete)));
        Ok(())
    }

    fn invoke(&self, data: CompletionData) -> Result<(), Fail> {
        let (unit, target): (&Arc<DispatchUnit>, &Target) = match (self.unit.as_ref(), self.target.as_ref()) {
            (Some(unit), Some(target)) => (unit, target),
            _ => return Err(Fail::new(libc::ENOTCONN, "backend not initialized")),
        };

        unit.state().try_dispatch(data)?;
        if let Err(e) = target.queue().queue(unit.clone()) {
            unit.abandon();
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Fail> {
        if let Some(unit) = self.unit.as_ref() {
            unit.state().wait_idle(self.timeout)?;
        }
        self.unit = None;
        match self.target.take() {
            Some(Target::Private(queue)) => queue.destroy(),
            Some(Target::Shared(_)) | None => Ok(()),
        }
    }

    fn is_initialized(&self) -> bool {
        self.unit.is_some()
    }

    fn is_busy(&self) -> bool {
        self.unit.as_ref().map_or(false, |unit: &Arc<DispatchUnit>| unit.state().is_busy())
    }
}

impl Drop for WorkQueueBackend {
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
