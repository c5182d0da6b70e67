//! Bridge JavaScript Runtime
//!
//! Embeds QuickJS (through rquickjs) and exposes host values to script.
//!
//! # Architecture
//!
//! - [`ScriptContext`] owns one engine runtime and context
//! - Host values cross into script through the value converter; host objects
//!   and delegates become proxies over a per-context handle arena
//! - Calls on wrapped objects go through the method dispatcher, which picks
//!   an overload and coerces the arguments
//! - Script functions handed to the host become [`ScriptFunction`]s that hold
//!   their context weakly
//! - The [`inspector`] module is the engine-side debugger backend

mod config;
mod context;
mod convert;
mod error;
mod function;
mod globals;
mod invoke;
mod tasks;
mod wrapper;

pub mod inspector;

pub use config::RuntimeConfig;
pub use context::{
    ParameterOptions, ScriptContext, TerminationHandle, WeakScriptContext, DEFAULT_RESOURCE_NAME,
};
pub use error::{ScriptError, ScriptResult};
pub use function::ScriptFunction;
pub use inspector::{Channel, Inspector, InspectorClient, InspectorSession, TrustLevel, CONTEXT_GROUP_ID};
pub use tasks::{ForegroundTaskRunner, Task};
