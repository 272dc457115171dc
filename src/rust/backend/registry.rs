// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::{
        BackendKind,
        TaskBackend,
    },
    runtime::fail::Fail,
};
use ::std::time::Duration;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-session table of backend instances, created lazily on first selection.
pub struct BackendRegistry {
    timeout: Option<Duration>,
    instances: [Option<Box<dyn TaskBackend>>; 3],
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BackendRegistry {
    /// `timeout` bounds the wait of [TaskBackend::remove] on every instance created by this registry.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            instances: [None, None, None],
        }
    }

    /// Returns the instance of `kind`, creating it on first use.
    pub fn get_or_create(&mut self, kind: BackendKind) -> &mut dyn TaskBackend {
        let timeout: Option<Duration> = self.timeout;
        let slot: &mut Option<Box<dyn TaskBackend>> = &mut self.instances[kind.id() as usize];
        if slot.is_none() {
            debug!("get_or_create(): creating {} backend", kind);
        }
        slot.get_or_insert_with(|| kind.instantiate(timeout)).as_mut()
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.instances[kind.id() as usize].is_some()
    }

    /// Drops the instance of `kind`, draining its in-flight dispatch first.
    pub fn release(&mut self, kind: BackendKind) -> Result<(), Fail> {
        match self.instances[kind.id() as usize].take() {
            Some(mut backend) => {
                debug!("release(): releasing {} backend", kind);
                backend.remove()
            },
            None => Ok(()),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
