//! Driving async work from synchronous callers.
//!
//! Outside a runtime a private current-thread runtime is spun up for the
//! call. Inside a multi-threaded tokio runtime the worker is handed over with
//! `block_in_place`. A current-thread runtime cannot be blocked without
//! deadlocking, so that case is an error.

use std::future::Future;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use crate::error::{Error, Result};

/// Run a future to completion on the calling thread.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            _ => Err(Error::Runtime(
                "blocking call made from a current-thread runtime; use the async entry point"
                    .into(),
            )),
        },
        Err(_) => {
            tracing::trace!("No runtime on this thread, starting a private one");
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::Runtime(format!("failed to start runtime: {e}")))?;
            Ok(runtime.block_on(future))
        }
    }
}
