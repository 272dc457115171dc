// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Control channel: requests that configure and trigger measurement runs.

mod result;
mod session;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    result::TestResult,
    session::{
        Session,
        DEFAULT_REMOVE_TIMEOUT,
    },
};
pub use crate::harness::TriggerMode;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Numeric request codes.
pub mod opcode {
    pub const RUN: u32 = 1;
    pub const SELECT_BACKEND: u32 = 2;
    pub const SELECT_SUBVARIANT: u32 = 3;
    pub const SET_TRIGGER: u32 = 4;
    pub const SET_ITERATIONS: u32 = 5;
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// A control channel request.
#[derive(Debug)]
pub enum Request<'a> {
    /// Selects a backend by id and resets the sub-variant.
    SelectBackend(u32),
    /// Selects a sub-variant by id.
    SelectSubVariant(u32),
    /// Selects a trigger mode by id.
    SetTrigger(u32),
    /// Sets the iteration count of the next run.
    SetIterations(u32),
    /// Runs a measurement and writes its aggregate into the buffer.
    Run(&'a mut TestResult),
}

/// Argument of a numeric request.
#[derive(Debug)]
pub enum IoctlArg<'a> {
    Value(u32),
    Result(&'a mut TestResult),
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<'a> Request<'a> {
    /// Decodes a numeric request. Unknown opcodes fail with `ENOTTY`, and an argument of the wrong shape with
    /// `EINVAL`.
    pub fn decode(code: u32, arg: IoctlArg<'a>) -> Result<Self, Fail> {
        match (code, arg) {
            (opcode::RUN, IoctlArg::Result(result)) => Ok(Request::Run(result)),
            (opcode::SELECT_BACKEND, IoctlArg::Value(id)) => Ok(Request::SelectBackend(id)),
            (opcode::SELECT_SUBVARIANT, IoctlArg::Value(id)) => Ok(Request::SelectSubVariant(id)),
            (opcode::SET_TRIGGER, IoctlArg::Value(id)) => Ok(Request::SetTrigger(id)),
            (opcode::SET_ITERATIONS, IoctlArg::Value(n)) => Ok(Request::SetIterations(n)),
            (opcode::RUN..=opcode::SET_ITERATIONS, arg) => {
                let cause: String = format!("bad argument for opcode {} ({:?})", code, arg);
                error!("decode(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
            (_, _) => {
                let cause: String = format!("unknown opcode {}", code);
                error!("decode(): {}", cause);
                Err(Fail::new(libc::ENOTTY, &cause))
            },
        }
    }
}
