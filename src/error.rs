//! Error types raised by endpoint business logic.
//!
//! Errors never leave a handler: the instrumented-call runner turns every
//! `HandlerError` into a fixed status code with an empty body.

use crate::process::ProcessInfoError;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("process information: {0}")]
    ProcessInfo(#[from] ProcessInfoError),

    /// The business-logic task panicked or was cancelled.
    #[error("handler task failed: {0}")]
    Task(String),
}
