//! Bridge
//!
//! Script debugging on top of the bridge JavaScript runtime, plus the
//! configuration shared by the `bridge` binary.

pub mod config;
pub mod debug;

pub use config::{BridgeConfig, DebuggerConfig, LoadError};
pub use debug::{DebugContext, DebugError, DebugResult, DebuggerState};
