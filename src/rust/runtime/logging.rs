// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::{
    Logger,
    LoggerHandle,
};
use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features. The log specification is read from the `RUST_LOG` environment variable and
/// defaults to warnings only.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        match Logger::try_with_env_or_str("warn").and_then(|logger: Logger| logger.start()) {
            // The handle flushes writers on drop, so it lives for the rest of the process.
            Ok(handle) => {
                let _: &'static mut LoggerHandle = Box::leak(Box::new(handle));
            },
            Err(e) => eprintln!("initialize(): failed to start logger ({})", e),
        }
    });
}
