// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Configuration file.
//!
//! ```yaml
//! harness:
//!   iterations: 10000
//!   wait_timeout_ms: 10000
//!   remove_timeout_ms: 10000
//! load:
//!   threads: 50
//!   policy: SCHED_FIFO
//!   priority: 40
//! probe:
//!   iterations: 100
//!   policy: SCHED_OTHER
//!   priority: 0
//!   verbose: true
//! ```
//!
//! Every option may be overridden by an environment variable named after its section and key in upper case, for
//! instance `LOAD_THREADS`. Missing options take their default value. Timeouts of zero wait forever.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    control::DEFAULT_REMOVE_TIMEOUT,
    harness::{
        DEFAULT_ITERATIONS,
        DEFAULT_WAIT_TIMEOUT,
    },
    load::{
        priority::{
            SchedPolicy,
            ThreadPriority,
        },
        DEFAULT_LOAD_THREADS,
    },
    probe::DEFAULT_PROBE_ITERATIONS,
    runtime::fail::Fail,
};
use ::std::{
    fs,
    ops::Index,
    str::FromStr,
    time::Duration,
};
use ::yaml_rust::{
    yaml::Hash,
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

mod harness_config {
    pub const SECTION_NAME: &str = "harness";
    pub const ITERATIONS: &str = "iterations";
    pub const WAIT_TIMEOUT_MS: &str = "wait_timeout_ms";
    pub const REMOVE_TIMEOUT_MS: &str = "remove_timeout_ms";
}

mod load_config {
    pub const SECTION_NAME: &str = "load";
    pub const THREADS: &str = "threads";
    pub const POLICY: &str = "policy";
    pub const PRIORITY: &str = "priority";
}

mod probe_config {
    pub const SECTION_NAME: &str = "probe";
    pub const ITERATIONS: &str = "iterations";
    pub const POLICY: &str = "policy";
    pub const PRIORITY: &str = "priority";
    pub const VERBOSE: &str = "verbose";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Framework configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let config_s: String = match fs::read_to_string(config_path) {
            Ok(s) => s,
            Err(e) => {
                let cause: String = format!("cannot read {} ({})", config_path, e);
                error!("new(): {}", cause);
                return Err(Fail::new(e.raw_os_error().unwrap_or(libc::EIO), &cause));
            },
        };
        Self::from_yaml_str(&config_s)
    }

    /// Parses a configuration document.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("malformed configuration ({})", e);
                error!("from_yaml_str(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            // An empty document configures nothing.
            [] => return Ok(Self::default()),
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };
        match config_obj {
            Yaml::Hash(_) | Yaml::Null => Ok(Self(config_obj.clone())),
            _ => Err(Fail::new(libc::EINVAL, "configuration is not a mapping")),
        }
    }

    /// Harness: number of iterations of a run.
    pub fn iterations(&self) -> Result<u32, Fail> {
        self.get_int(harness_config::SECTION_NAME, harness_config::ITERATIONS, DEFAULT_ITERATIONS)
    }

    /// Harness: bound on the wait for each dispatch.
    pub fn wait_timeout(&self) -> Result<Option<Duration>, Fail> {
        self.get_timeout(harness_config::SECTION_NAME, harness_config::WAIT_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT)
    }

    /// Harness: bound on the wait of a backend for its last dispatch when it is removed.
    pub fn remove_timeout(&self) -> Result<Option<Duration>, Fail> {
        self.get_timeout(harness_config::SECTION_NAME, harness_config::REMOVE_TIMEOUT_MS, DEFAULT_REMOVE_TIMEOUT)
    }

    /// Load: number of background threads.
    pub fn load_threads(&self) -> Result<usize, Fail> {
        self.get_int(load_config::SECTION_NAME, load_config::THREADS, DEFAULT_LOAD_THREADS)
    }

    /// Load: scheduling class of background threads.
    pub fn load_priority(&self) -> Result<ThreadPriority, Fail> {
        self.get_priority(
            load_config::SECTION_NAME,
            load_config::POLICY,
            load_config::PRIORITY,
            ThreadPriority::LOAD,
        )
    }

    /// Probe: number of iterations.
    pub fn probe_iterations(&self) -> Result<u32, Fail> {
        self.get_int(probe_config::SECTION_NAME, probe_config::ITERATIONS, DEFAULT_PROBE_ITERATIONS)
    }

    /// Probe: scheduling class of the probe thread.
    pub fn probe_priority(&self) -> Result<ThreadPriority, Fail> {
        self.get_priority(
            probe_config::SECTION_NAME,
            probe_config::POLICY,
            probe_config::PRIORITY,
            ThreadPriority::PROBE,
        )
    }

    /// Probe: print progress while probing?
    pub fn probe_verbose(&self) -> Result<bool, Fail> {
        let section: &str = probe_config::SECTION_NAME;
        if let Some(verbose) = Self::get_typed_env_option(section, probe_config::VERBOSE)? {
            return Ok(verbose);
        }
        match self.get_option(section, probe_config::VERBOSE)? {
            Some(value) => Self::typed(value, probe_config::VERBOSE, Yaml::as_bool),
            None => Ok(true),
        }
    }

    fn get_priority(
        &self,
        section: &str,
        policy_key: &str,
        priority_key: &str,
        default: ThreadPriority,
    ) -> Result<ThreadPriority, Fail> {
        let policy: SchedPolicy = match Self::get_typed_env_option(section, policy_key)? {
            Some(policy) => policy,
            None => match self.get_option(section, policy_key)? {
                Some(value) => Self::typed(value, policy_key, Yaml::as_str)?.parse()?,
                None => default.policy,
            },
        };
        let level: i32 = self.get_int(section, priority_key, default.priority)?;
        let priority: ThreadPriority = ThreadPriority::new(policy, level);
        priority.validate()?;
        Ok(priority)
    }

    /// Reads a timeout in milliseconds, where zero means no timeout.
    fn get_timeout(&self, section: &str, key: &str, default: Duration) -> Result<Option<Duration>, Fail> {
        let default_ms: u64 = default.as_millis().min(u64::MAX as u128) as u64;
        match self.get_int::<u64>(section, key, default_ms)? {
            0 => Ok(None),
            ms => Ok(Some(Duration::from_millis(ms))),
        }
    }

    /// Reads an integer option from the environment first and then the configuration file, verifying that the
    /// destination type may hold the value.
    fn get_int<T>(&self, section: &str, key: &str, default: T) -> Result<T, Fail>
    where
        T: TryFrom<i64> + FromStr,
    {
        if let Some(value) = Self::get_typed_env_option(section, key)? {
            return Ok(value);
        }
        let value: &Yaml = match self.get_option(section, key)? {
            Some(value) => value,
            None => return Ok(default),
        };
        let val: i64 = Self::typed(value, key, Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}.{}\" is out of range", section, key);
                error!("get_int(): {}", message);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }

    /// Index the configuration to find `section.key`. A missing section or key is `None`.
    fn get_option(&self, section: &str, key: &str) -> Result<Option<&Yaml>, Fail> {
        let section_obj: &Yaml = self.0.index(section);
        match section_obj {
            Yaml::BadValue | Yaml::Null => return Ok(None),
            Yaml::Hash(_) => (),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", section);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            },
        }
        match section_obj.index(key) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn typed<'a, T>(value: &'a Yaml, key: &str, receiver: fn(&'a Yaml) -> Option<T>) -> Result<T, Fail> {
        match receiver(value) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter \"{}\" has unexpected type", key);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Reads `SECTION_KEY` from the environment.
    fn get_typed_env_option<T: FromStr>(section: &str, key: &str) -> Result<Option<T>, Fail> {
        let name: String = format!("{}_{}", section, key).to_uppercase();
        if let Ok(var) = ::std::env::var(&name) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("environment variable {} has unexpected type", name);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Config {
    fn default() -> Self {
        Self(Yaml::Hash(Hash::new()))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
