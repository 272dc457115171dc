// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scheduling class of the calling thread.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fmt,
    str::FromStr,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduling policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchedPolicy {
    /// Conventional time sharing. Priority must be 0.
    #[default]
    Other,
    /// Real time, first in first out. Priority from 1 to 99.
    Fifo,
    /// Real time, round robin. Priority from 1 to 99.
    RoundRobin,
}

/// Scheduling policy and static priority of a thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ThreadPriority {
    pub policy: SchedPolicy,
    pub priority: i32,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl SchedPolicy {
    pub const fn name(&self) -> &'static str {
        match self {
            SchedPolicy::Other => "SCHED_OTHER",
            SchedPolicy::Fifo => "SCHED_FIFO",
            SchedPolicy::RoundRobin => "SCHED_RR",
        }
    }

    /// Valid static priorities of this policy.
    pub const fn priority_range(&self) -> (i32, i32) {
        match self {
            SchedPolicy::Other => (0, 0),
            SchedPolicy::Fifo | SchedPolicy::RoundRobin => (1, 99),
        }
    }
}

impl ThreadPriority {
    /// Priority of background load threads.
    pub const LOAD: ThreadPriority = ThreadPriority::new(SchedPolicy::Fifo, 40);

    /// Priority of the direct probe thread.
    pub const PROBE: ThreadPriority = ThreadPriority::new(SchedPolicy::Other, 0);

    pub const fn new(policy: SchedPolicy, priority: i32) -> Self {
        Self { policy, priority }
    }

    /// Checks that the priority is valid for the policy.
    pub fn validate(&self) -> Result<(), Fail> {
        let (min, max): (i32, i32) = self.policy.priority_range();
        if self.priority < min || self.priority > max {
            let cause: String = format!(
                "priority {} out of range for {} ({}..={})",
                self.priority,
                self.policy.name(),
                min,
                max
            );
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(())
    }

    /// Applies this priority to the calling thread.
    pub fn apply(&self) -> Result<(), Fail> {
        self.validate()?;
        imp::apply(self)
    }

    /// Applies this priority to the calling thread, logging a warning and carrying on at the current priority if
    /// that is not permitted.
    pub fn apply_or_warn(&self, who: &str) -> bool {
        match self.apply() {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: cannot set {} ({:?}), running at default priority", who, self, e);
                false
            },
        }
    }

    /// Reads the priority of the calling thread.
    pub fn current() -> Result<Self, Fail> {
        imp::current()
    }
}

//======================================================================================================================
// Platform Implementations
//======================================================================================================================

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod imp {
            use super::{
                SchedPolicy,
                ThreadPriority,
            };
            use crate::runtime::fail::Fail;
            use ::libc::c_int;
            use ::std::mem;

            fn to_raw(policy: SchedPolicy) -> c_int {
                match policy {
                    SchedPolicy::Other => libc::SCHED_OTHER,
                    SchedPolicy::Fifo => libc::SCHED_FIFO,
                    SchedPolicy::RoundRobin => libc::SCHED_RR,
                }
            }

            fn from_raw(policy: c_int) -> Option<SchedPolicy> {
                match policy {
                    libc::SCHED_OTHER => Some(SchedPolicy::Other),
                    libc::SCHED_FIFO => Some(SchedPolicy::Fifo),
                    libc::SCHED_RR => Some(SchedPolicy::RoundRobin),
                    _ => None,
                }
            }

            pub fn apply(priority: &ThreadPriority) -> Result<(), Fail> {
                // Safety: sched_param is plain old data.
                let mut param: libc::sched_param = unsafe { mem::zeroed() };
                param.sched_priority = priority.priority;
                // Safety: param is a valid sched_param and pthread_self() is the calling thread.
                let policy: c_int = to_raw(priority.policy);
                let ret: c_int = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
                if ret != 0 {
                    let cause: String = format!("pthread_setschedparam() failed for {}", priority);
                    return Err(Fail::new(ret, &cause));
                }
                Ok(())
            }

            pub fn current() -> Result<ThreadPriority, Fail> {
                let mut policy: c_int = 0;
                // Safety: sched_param is plain old data.
                let mut param: libc::sched_param = unsafe { mem::zeroed() };
                // Safety: both out-pointers are valid for writes.
                let ret: c_int = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
                if ret != 0 {
                    return Err(Fail::new(ret, "pthread_getschedparam() failed"));
                }
                match from_raw(policy) {
                    Some(policy) => Ok(ThreadPriority::new(policy, param.sched_priority)),
                    None => Err(Fail::new(libc::ENOTSUP, &format!("unknown scheduling policy {}", policy))),
                }
            }
        }
    } else {
        mod imp {
            use super::ThreadPriority;
            use crate::runtime::fail::Fail;

            pub fn apply(priority: &ThreadPriority) -> Result<(), Fail> {
                let cause: String = format!("cannot set {} on this platform", priority);
                Err(Fail::new(libc::ENOTSUP, &cause))
            }

            pub fn current() -> Result<ThreadPriority, Fail> {
                Err(Fail::new(libc::ENOTSUP, "scheduling priority not available on this platform"))
            }
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl FromStr for SchedPolicy {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s.to_ascii_lowercase();
        match name.trim_start_matches("sched_") {
            "other" | "normal" => Ok(SchedPolicy::Other),
            "fifo" => Ok(SchedPolicy::Fifo),
            "rr" => Ok(SchedPolicy::RoundRobin),
            _ => Err(Fail::new(libc::EINVAL, &format!("unknown scheduling policy \"{}\"", s))),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy: {} static_prio {}", self.policy, self.priority)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
