//! Inspector Backend
//!
//! QuickJS has no debugger protocol of its own, so this module provides a
//! small engine-side backend shaped like a V8 inspector. An embedder creates
//! an [`Inspector`] with an [`InspectorClient`], registers its context under
//! a context group and connects a [`Channel`] to obtain an
//! [`InspectorSession`]. Protocol text goes in through
//! [`InspectorSession::dispatch_protocol_message`]; replies and notifications
//! come back out through the channel.
//!
//! # Pausing
//!
//! A pause blocks the thread running script inside
//! [`InspectorClient::run_message_loop_on_pause`]. The client is expected to
//! pump the context's [`crate::ForegroundTaskRunner`] until
//! [`InspectorClient::quit_message_loop_on_pause`] is called or execution is
//! terminated.

mod session;

pub use session::InspectorSession;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{ScriptContext, WeakScriptContext};
use crate::error::{ScriptError, ScriptResult};

/// The only context group used by the bridge.
pub const CONTEXT_GROUP_ID: i32 = 1;

/// Capability level requested when connecting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    Untrusted,
    FullyTrusted,
}

/// Receives protocol output from a session.
pub trait Channel: Send + Sync {
    /// Reply to the request carrying `call_id`.
    fn send_response(&self, call_id: i64, message: String);

    /// A protocol event, or an error that could not be tied to a request id.
    fn send_notification(&self, message: String);

    fn flush_protocol_notifications(&self) {}
}

/// Embedder hooks the inspector calls into.
pub trait InspectorClient: Send + Sync {
    /// Block the script thread while paused.
    fn run_message_loop_on_pause(&self, context_group_id: i32);

    /// Release a thread blocked in [`Self::run_message_loop_on_pause`].
    fn quit_message_loop_on_pause(&self);

    /// The context currently active in `context_group_id`.
    fn ensure_default_context_in_group(&self, context_group_id: i32) -> Option<ScriptContext>;
}

/// Entry point for debugger sessions over registered script contexts.
pub struct Inspector {
    client: Arc<dyn InspectorClient>,
    contexts: Mutex<HashMap<i32, WeakScriptContext>>,
}

impl Inspector {
    pub fn create(client: Arc<dyn InspectorClient>) -> Self {
        Self {
            client,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Register `context` as the context of `context_group_id`.
    pub fn context_created(&self, context: &ScriptContext, context_group_id: i32) {
        tracing::debug!(target: "bridge.runtime", context = context.id(), group = context_group_id, "context registered with inspector");
        self.contexts.lock().insert(context_group_id, context.downgrade());
    }

    pub fn context_destroyed(&self, context_group_id: i32) {
        self.contexts.lock().remove(&context_group_id);
    }

    /// Open a session on the context registered for `context_group_id`.
    ///
    /// The session observes that context's execution from now on; connecting
    /// again replaces the previous session's hooks.
    pub fn connect(
        &self,
        context_group_id: i32,
        channel: Arc<dyn Channel>,
        trust_level: TrustLevel,
    ) -> ScriptResult<InspectorSession> {
        let context = self
            .contexts
            .lock()
            .get(&context_group_id)
            .and_then(WeakScriptContext::upgrade)
            .ok_or_else(|| {
                ScriptError::InvalidArgument(format!("no context registered for group {context_group_id}"))
            })?;

        Ok(InspectorSession::connect(
            &context,
            context_group_id,
            channel,
            Arc::clone(&self.client),
            trust_level,
        ))
    }
}
