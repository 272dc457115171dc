// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::{
        registry::BackendRegistry,
        BackendKind,
        SubVariant,
        TaskBackend,
    },
    control::{
        IoctlArg,
        Request,
        TestResult,
    },
    harness::{
        Harness,
        RunConfig,
        RunReport,
        TriggerMode,
        DEFAULT_ITERATIONS,
        DEFAULT_WAIT_TIMEOUT,
    },
    runtime::fail::Fail,
};
use ::std::time::Duration;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Default bound on the wait of a backend for its last dispatch when it is removed.
pub const DEFAULT_REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

//======================================================================================================================
// Structures
//======================================================================================================================

/// One open control channel. Owns the backend instances it has selected.
pub struct Session {
    registry: BackendRegistry,
    harness: Harness,
    config: RunConfig,
    last_report: Option<RunReport>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Session {
    pub fn new() -> Self {
        Self::with_timeouts(Some(DEFAULT_WAIT_TIMEOUT), Some(DEFAULT_REMOVE_TIMEOUT))
    }

    /// Creates a session whose runs wait at most `wait_timeout` for each dispatch and whose backends wait at most
    /// `remove_timeout` when removed. `None` waits forever.
    pub fn with_timeouts(wait_timeout: Option<Duration>, remove_timeout: Option<Duration>) -> Self {
        Self {
            registry: BackendRegistry::new(remove_timeout),
            harness: Harness::new(wait_timeout),
            config: RunConfig::new(BackendKind::WorkQueue, SubVariant::Default, DEFAULT_ITERATIONS),
            last_report: None,
        }
    }

    /// Configuration of the next run.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Report of the last completed run.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Has an instance of `kind` been created?
    pub fn has_instance(&self, kind: BackendKind) -> bool {
        self.registry.contains(kind)
    }

    /// Handles a request.
    pub fn submit(&mut self, request: Request<'_>) -> Result<(), Fail> {
        match request {
            Request::SelectBackend(id) => self.select_backend(id),
            Request::SelectSubVariant(id) => self.select_subvariant(id),
            Request::SetTrigger(id) => self.set_trigger(id),
            Request::SetIterations(n) => {
                info!("submit(): iterations = {}", n);
                self.config.iterations = n;
                Ok(())
            },
            Request::Run(result) => self.run(result),
        }
    }

    /// Handles a numeric request.
    pub fn ioctl(&mut self, opcode: u32, arg: IoctlArg<'_>) -> Result<(), Fail> {
        let request: Request = Request::decode(opcode, arg)?;
        self.submit(request)
    }

    fn select_backend(&mut self, id: u32) -> Result<(), Fail> {
        let kind: BackendKind = BackendKind::try_from(id)?;
        let previous: BackendKind = self.config.backend;
        info!("select_backend(): backend = {}", kind);
        self.config.backend = kind;
        self.config.subvariant = SubVariant::Default;
        if previous != kind {
            if let Err(e) = self.registry.release(previous) {
                warn!("select_backend(): failed to release {} ({:?})", previous, e);
            }
        }
        Ok(())
    }

    fn select_subvariant(&mut self, id: u32) -> Result<(), Fail> {
        let subvariant: SubVariant = SubVariant::try_from(id)?;
        info!("select_subvariant(): subvariant = {}", subvariant);
        self.config.subvariant = subvariant;
        Ok(())
    }

    fn set_trigger(&mut self, id: u32) -> Result<(), Fail> {
        let trigger: TriggerMode = TriggerMode::try_from(id)?;
        info!("set_trigger(): trigger = {}", trigger);
        self.config.trigger = trigger;
        Ok(())
    }

    fn run(&mut self, result: &mut TestResult) -> Result<(), Fail> {
        result.check_size()?;
        let config: RunConfig = self.config;
        let harness: Harness = self.harness;
        let backend: &mut dyn TaskBackend = self.registry.get_or_create(config.backend);
        let report: RunReport = harness.run(backend, &config)?;
        result.fill(&report);
        self.last_report = Some(report);
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for kind in BackendKind::ALL {
            if let Err(e) = self.registry.release(kind) {
                warn!("drop(): failed to release {} ({:?})", kind, e);
            }
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
