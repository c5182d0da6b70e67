//! Error types for the script runtime.

use bridge_types::HostException;

/// Errors surfaced by a [`crate::ScriptContext`].
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Script code threw; `message` is `"<Name>: <message>"` for `Error` objects
    #[error("{message}")]
    Exception { message: String },

    /// A host exception thrown through script, returned unchanged
    #[error("{0}")]
    Host(HostException),

    #[error("Script execution was terminated")]
    Terminated,

    #[error("The script context has been disposed")]
    Disposed,

    #[error("Invalid handle")]
    InvalidHandle,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Engine error: {0}")]
    Engine(#[from] rquickjs::Error),
}

impl ScriptError {
    pub fn is_terminated(&self) -> bool {
        matches!(self, ScriptError::Terminated)
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
