//! Debug Context
//!
//! Runs scripts under an inspector session and lets another thread talk to
//! the debugger while they run. One instance serves one session at a time
//! and can be reused once [`DebugContext::debug`] has returned.
//!
//! # States
//!
//! - `Stopped`: idle. Protocol messages are dispatched on the caller's thread.
//! - `Started`: a script is running. Protocol messages are posted to the
//!   script thread and served at its next interrupt poll or from the pause
//!   loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use bridge_js_runtime::inspector::{Inspector, CONTEXT_GROUP_ID};
use bridge_js_runtime::{ScriptContext, ScriptError, DEFAULT_RESOURCE_NAME};
use bridge_types::HostValue;

use super::channel::MessageChannel;
use super::client::InspectorClient;
use super::error::{DebugError, DebugResult};
use super::exchange::PendingProtocolExchange;
use crate::config::DebuggerConfig;

/// Callback receiving every protocol notification of a session.
pub type NotificationHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Stopped,
    Started,
}

struct Session {
    state: DebuggerState,
    /// A `debug` call has not returned yet. Stays set after a termination
    /// until the script has unwound.
    running: bool,
}

/// Notification routing shared with the message channel.
struct Router {
    start_token: String,
    start_seen: AtomicBool,
    handler: Mutex<Option<NotificationHandler>>,
}

impl Router {
    fn route(&self, message: &str) {
        if message.contains(&self.start_token) && !self.start_seen.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "bridge.debug", "debugger paused at start");
        }

        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                tracing::warn!(target: "bridge.debug", "notification handler panicked; notification dropped");
            }
        }
    }
}

pub struct DebugContext {
    context: ScriptContext,
    inspector: Inspector,
    client: Arc<InspectorClient>,
    /// Owns the session; the client only holds it weakly
    _channel: Arc<MessageChannel>,
    exchange: Arc<PendingProtocolExchange>,
    router: Arc<Router>,
    session: Mutex<Session>,
    send_lock: Mutex<()>,
    pause_on_start: AtomicBool,
    protocol_timeout: Option<Duration>,
    next_message_id: AtomicU32,
}

impl DebugContext {
    pub fn new(context: &ScriptContext) -> DebugResult<Self> {
        Self::with_config(context, DebuggerConfig::default())
    }

    /// Create the inspector client, register `context` with it and open the
    /// message channel. The debugger domain is enabled right away.
    pub fn with_config(context: &ScriptContext, config: DebuggerConfig) -> DebugResult<Self> {
        let client = Arc::new(InspectorClient::new(context));
        let inspector = Inspector::create(client.clone());
        inspector.context_created(context, CONTEXT_GROUP_ID);

        let router = Arc::new(Router {
            start_token: format!("DebuggerStart:{}", uuid::Uuid::new_v4().braced()),
            start_seen: AtomicBool::new(false),
            handler: Mutex::new(None),
        });
        let exchange = Arc::new(PendingProtocolExchange::new());
        let sink = {
            let router = Arc::clone(&router);
            Box::new(move |message: &str| router.route(message))
        };
        let channel = Arc::new(MessageChannel::open(&inspector, Arc::clone(&exchange), sink)?);
        client.attach_channel(&channel);

        let debug = Self {
            context: context.clone(),
            inspector,
            client,
            _channel: channel,
            exchange,
            router,
            session: Mutex::new(Session {
                state: DebuggerState::Stopped,
                running: false,
            }),
            send_lock: Mutex::new(()),
            pause_on_start: AtomicBool::new(config.pause_on_start),
            protocol_timeout: config.protocol_timeout(),
            next_message_id: AtomicU32::new(1),
        };

        debug.send_internal("Debugger.enable")?;
        tracing::debug!(target: "bridge.debug", context = context.id(), "debug context ready");
        Ok(debug)
    }

    pub fn state(&self) -> DebuggerState {
        self.session.lock().state
    }

    /// Token carried by the `Debugger.paused` notification of a pause-on-start.
    pub fn start_token(&self) -> &str {
        &self.router.start_token
    }

    pub fn pause_on_start(&self) -> bool {
        self.pause_on_start.load(Ordering::SeqCst)
    }

    pub fn set_pause_on_start(&self, enabled: bool) -> DebugResult<()> {
        let session = self.session.lock();
        if session.state != DebuggerState::Stopped {
            return Err(DebugError::InvalidState("cannot change pause-on-start while debugging"));
        }
        self.pause_on_start.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn next_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run `script` under the debugger, blocking until it finishes or is
    /// terminated. Every notification of the session is passed to `handler`;
    /// a panicking handler loses that notification and nothing else.
    pub fn debug<F>(&self, script: &str, resource_name: Option<&str>, handler: F) -> DebugResult<HostValue>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        {
            let mut session = self.session.lock();
            if session.state != DebuggerState::Stopped || session.running {
                return Err(DebugError::InvalidState("a debug session is already running"));
            }
            *self.router.handler.lock() = Some(Arc::new(handler));
            self.client.reset();
            if self.pause_on_start() {
                self.client.schedule_pause_on_next_statement(&self.router.start_token);
            }
            session.state = DebuggerState::Started;
            session.running = true;
        }

        let resource_name = resource_name.unwrap_or(DEFAULT_RESOURCE_NAME);
        tracing::info!(target: "bridge.debug", resource = resource_name, "debug session started");
        let result = self.context.run_with_name(script, resource_name);

        {
            let mut session = self.session.lock();
            session.state = DebuggerState::Stopped;
            session.running = false;
        }
        self.client.cancel_pause_on_next_statement();
        // Requests posted while the script was finishing are served here
        self.context.task_runner().run_pending();

        tracing::info!(target: "bridge.debug", resource = resource_name, ok = result.is_ok(), "debug session stopped");
        match result {
            Ok(value) => Ok(value),
            Err(ScriptError::Terminated) => Err(DebugError::Terminated),
            Err(e) => Err(e.into()),
        }
    }

    /// Forcefully abort the running script. The session is `Stopped` when
    /// this returns; the blocked [`DebugContext::debug`] call returns
    /// [`DebugError::Terminated`] once the script has unwound.
    pub fn terminate_execution(&self) -> DebugResult<()> {
        let mut session = self.session.lock();
        if session.state != DebuggerState::Started {
            return Err(DebugError::InvalidState("no debug session is running"));
        }

        tracing::info!(target: "bridge.debug", "terminating debugged script");
        self.client.terminate_execution();
        self.exchange.abandon();
        session.state = DebuggerState::Stopped;
        Ok(())
    }

    /// Send a protocol request and block until its response arrives.
    pub fn send_protocol_message(&self, message: &str) -> DebugResult<String> {
        if message.trim().is_empty() {
            return Err(DebugError::InvalidArgument("message"));
        }

        let _serial = self.send_lock.lock();
        self.exchange.arm(call_id(message));

        // Posted under the session lock; `debug` drains the queue after
        // switching back to `Stopped`
        let session = self.session.lock();
        if session.state == DebuggerState::Started {
            self.client.dispatch_message_from_frontend(message.to_string());
            drop(session);
        } else {
            drop(session);
            self.client.dispatch_message(message);
        }

        self.exchange.wait(self.protocol_timeout)
    }

    fn send_internal(&self, method: &str) -> DebugResult<String> {
        let message = serde_json::json!({ "id": self.next_message_id(), "method": method }).to_string();
        self.send_protocol_message(&message)
    }
}

impl Drop for DebugContext {
    fn drop(&mut self) {
        self.client.disconnect_frontend();
        self.inspector.context_destroyed(CONTEXT_GROUP_ID);
    }
}

fn call_id(message: &str) -> Option<i64> {
    serde_json::from_str::<serde_json::Value>(message)
        .ok()?
        .get("id")?
        .as_i64()
}
