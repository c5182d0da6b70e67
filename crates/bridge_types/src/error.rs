//! Error types for host-side operations.

use crate::value::HostException;

/// Errors raised by host objects, delegates and coercions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// An exception thrown by host code
    #[error("{0}")]
    Exception(HostException),

    /// Invocation wrapper around the exception actually thrown by the target
    #[error("Exception has been thrown by the target of an invocation.")]
    Invocation(HostException),

    /// The arguments handed to a host member were rejected
    #[error("{0}")]
    Argument(String),

    #[error("Object of type '{from}' cannot be converted to type '{to}'.")]
    Coercion { from: String, to: String },

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// A script function outlived its context, or its handle was released
    #[error("The script function handle is no longer valid")]
    InvalidHandle,

    /// Script code raised while being called from the host
    #[error("{0}")]
    Script(String),
}

impl HostError {
    /// Shorthand for throwing a plain host exception.
    pub fn exception(message: impl Into<String>) -> Self {
        HostError::Exception(HostException::new(message))
    }

    /// The exception that actually caused this error, unwrapping invocation wrappers.
    pub fn root_exception(&self) -> Option<HostException> {
        match self {
            HostError::Exception(e) => Some(e.clone()),
            HostError::Invocation(e) => Some(e.inner().cloned().unwrap_or_else(|| e.clone())),
            _ => None,
        }
    }
}

impl From<HostException> for HostError {
    fn from(e: HostException) -> Self {
        HostError::Exception(e)
    }
}

pub type HostResult<T> = Result<T, HostError>;
