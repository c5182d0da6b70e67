//! Debugging Subsystem
//!
//! Runs scripts under the engine's inspector and relays debug protocol
//! traffic between an external frontend and the running script.

mod channel;
mod client;
mod context;
mod error;
mod exchange;

pub use channel::{MessageChannel, NotificationSink};
pub use client::InspectorClient;
pub use context::{DebugContext, DebuggerState, NotificationHandler};
pub use error::{DebugError, DebugResult};
pub use exchange::PendingProtocolExchange;
