// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Task backends: interchangeable ways of deferring a unit of work and getting called back once it executes.

pub mod context;
pub mod registry;
pub mod state;
pub mod tasklet;
pub mod thread;
pub mod workqueue;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::{
    state::{
        CompletionData,
        CompletionFn,
    },
    tasklet::TaskletBackend,
    thread::ThreadBackend,
    workqueue::WorkQueueBackend,
};
use crate::runtime::fail::Fail;
use ::arrayvec::ArrayString;
use ::std::{
    fmt,
    str::FromStr,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Maximum length of a backend instance name, in bytes.
pub const TASK_NAME_MAXLEN: usize = 64;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Fixed-capacity backend instance name.
pub type TaskName = ArrayString<TASK_NAME_MAXLEN>;

/// Backend variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    WorkQueue,
    Tasklet,
    Thread,
}

/// Backend sub-variants. Only the work queue backend distinguishes them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SubVariant {
    #[default]
    Default,
    SharedQueue,
    PrivateQueue,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Defers a unit of work and runs a completion callback when it executes.
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Allocates private resources and installs the completion callback. May block.
    fn init(&mut self, subvariant: SubVariant, complete: CompletionFn) -> Result<(), Fail>;

    /// Dispatches one unit of work carrying `data`. Never blocks. Fails with `EBUSY` while a dispatch is in flight.
    fn invoke(&self, data: CompletionData) -> Result<(), Fail>;

    /// Waits for the in-flight dispatch (if any) to complete, then releases private resources. May block.
    fn remove(&mut self) -> Result<(), Fail>;

    /// Has the backend been initialized and not yet fully removed? A [TaskBackend::remove] that timed out leaves
    /// the backend initialized.
    fn is_initialized(&self) -> bool;

    fn is_busy(&self) -> bool;
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a backend instance name, truncating at a character boundary if it does not fit.
pub fn task_name(name: &str) -> TaskName {
    let mut out: TaskName = TaskName::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::WorkQueue, BackendKind::Tasklet, BackendKind::Thread];

    pub const fn id(&self) -> u32 {
        match self {
            BackendKind::WorkQueue => 0,
            BackendKind::Tasklet => 1,
            BackendKind::Thread => 2,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            BackendKind::WorkQueue => "workqueue",
            BackendKind::Tasklet => "tasklet",
            BackendKind::Thread => "thread",
        }
    }

    /// Creates an uninitialized backend instance of this kind. `timeout` bounds the wait in
    /// [TaskBackend::remove].
    pub fn instantiate(&self, timeout: Option<Duration>) -> Box<dyn TaskBackend> {
        match self {
            BackendKind::WorkQueue => Box::new(WorkQueueBackend::new(timeout)),
            BackendKind::Tasklet => Box::new(TaskletBackend::new(timeout)),
            BackendKind::Thread => Box::new(ThreadBackend::new(timeout)),
        }
    }
}

impl SubVariant {
    pub const ALL: [SubVariant; 3] = [SubVariant::Default, SubVariant::SharedQueue, SubVariant::PrivateQueue];

    pub const fn id(&self) -> u32 {
        match self {
            SubVariant::Default => 0,
            SubVariant::SharedQueue => 1,
            SubVariant::PrivateQueue => 2,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SubVariant::Default => "default",
            SubVariant::SharedQueue => "shared",
            SubVariant::PrivateQueue => "private",
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl TryFrom<u32> for BackendKind {
    type Error = Fail;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match BackendKind::ALL.iter().find(|kind: &&BackendKind| kind.id() == id) {
            Some(kind) => Ok(*kind),
            None => {
                let cause: String = format!("invalid backend id (id={})", id);
                error!("try_from(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

impl FromStr for BackendKind {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match BackendKind::ALL.iter().find(|kind: &&BackendKind| kind.name().eq_ignore_ascii_case(s)) {
            Some(kind) => Ok(*kind),
            None => Err(Fail::new(libc::EINVAL, &format!("unknown backend \"{}\"", s))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for SubVariant {
    type Error = Fail;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match SubVariant::ALL.iter().find(|subvariant: &&SubVariant| subvariant.id() == id) {
            Some(subvariant) => Ok(*subvariant),
            None => {
                let cause: String = format!("invalid sub-variant id (id={})", id);
                error!("try_from(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

impl FromStr for SubVariant {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match SubVariant::ALL
            .iter()
            .find(|subvariant: &&SubVariant| subvariant.name().eq_ignore_ascii_case(s))
        {
            Some(subvariant) => Ok(*subvariant),
            None => Err(Fail::new(libc::EINVAL, &format!("unknown sub-variant \"{}\"", s))),
        }
    }
}

impl fmt::Display for SubVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        BackendKind,
        SubVariant,
        TaskName,
        TASK_NAME_MAXLEN,
    };
    use ::anyhow::Result;

    #[test]
    fn ids_round_trip() -> Result<()> {
        for kind in BackendKind::ALL {
            crate::ensure_eq!(BackendKind::try_from(kind.id())?, kind);
            crate::ensure_eq!(kind.name().parse::<BackendKind>()?, kind);
        }
        for subvariant in SubVariant::ALL {
            crate::ensure_eq!(SubVariant::try_from(subvariant.id())?, subvariant);
        }
        Ok(())
    }

    #[test]
    fn invalid_ids_are_rejected() -> Result<()> {
        match BackendKind::try_from(3) {
            Ok(kind) => anyhow::bail!("id 3 should be invalid, got {:?}", kind),
            Err(e) => crate::ensure_eq!(e.errno, libc::EINVAL),
        }
        match SubVariant::try_from(u32::MAX) {
            Ok(subvariant) => anyhow::bail!("id should be invalid, got {:?}", subvariant),
            Err(e) => crate::ensure_eq!(e.errno, libc::EINVAL),
        }
        Ok(())
    }

    #[test]
    fn long_names_are_truncated() -> Result<()> {
        let long: String = "x".repeat(TASK_NAME_MAXLEN + 10);
        let name: TaskName = super::task_name(&long);
        crate::ensure_eq!(name.len(), TASK_NAME_MAXLEN);
        Ok(())
    }
}
