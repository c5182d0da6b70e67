//! Debug session errors.

use bridge_js_runtime::ScriptError;

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    /// A required input was missing or empty
    #[error("Value cannot be empty (parameter '{0}')")]
    InvalidArgument(&'static str),

    /// The operation is not allowed in the session's current state
    #[error("WrongDebuggerState: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Script execution was terminated")]
    Terminated,

    #[error("Timed out waiting for a protocol response")]
    Timeout,
}

pub type DebugResult<T> = Result<T, DebugError>;
