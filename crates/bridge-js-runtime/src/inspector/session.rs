//! One connected debugger session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{Channel, InspectorClient, TrustLevel};
use crate::context::{ExecutionObserver, ExecutionState, ScriptContext, DEFAULT_RESOURCE_NAME};

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const SERVER_ERROR: i64 = -32000;

struct ProtocolError {
    code: i64,
    message: String,
}

impl ProtocolError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of a handled command, plus whether a pause should end once the
/// reply is out.
struct Reply {
    result: Value,
    resume: bool,
}

impl From<Value> for Reply {
    fn from(result: Value) -> Self {
        Self { result, resume: false }
    }
}

struct PendingPause {
    reason: String,
    detail: String,
}

struct SessionInner {
    context_group_id: i32,
    trust_level: TrustLevel,
    execution: Weak<ExecutionState>,
    channel: Arc<dyn Channel>,
    client: Arc<dyn InspectorClient>,
    connected: AtomicBool,
    debugger_enabled: AtomicBool,
    runtime_enabled: AtomicBool,
    paused: AtomicBool,
    pause_requested: AtomicBool,
    scheduled_pause: Mutex<Option<PendingPause>>,
    resource_name: Mutex<String>,
}

/// A debugger session over one script context.
///
/// Dispatch may happen from any thread. Pauses happen on the thread running
/// script and last until the client's pause loop returns.
pub struct InspectorSession {
    inner: Arc<SessionInner>,
    observer: Arc<dyn ExecutionObserver>,
}

impl InspectorSession {
    pub(super) fn connect(
        context: &ScriptContext,
        context_group_id: i32,
        channel: Arc<dyn Channel>,
        client: Arc<dyn InspectorClient>,
        trust_level: TrustLevel,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            context_group_id,
            trust_level,
            execution: Arc::downgrade(context.execution()),
            channel,
            client,
            connected: AtomicBool::new(true),
            debugger_enabled: AtomicBool::new(false),
            runtime_enabled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            scheduled_pause: Mutex::new(None),
            resource_name: Mutex::new(DEFAULT_RESOURCE_NAME.to_string()),
        });
        let observer: Arc<dyn ExecutionObserver> = inner.clone();
        context.execution().set_observer(Arc::clone(&observer));

        tracing::debug!(target: "bridge.runtime", context = context.id(), group = context_group_id, "inspector session connected");
        Self { inner, observer }
    }

    pub fn context_group_id(&self) -> i32 {
        self.inner.context_group_id
    }

    pub fn trust_level(&self) -> TrustLevel {
        self.inner.trust_level
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Handle one protocol request. Output goes to the channel.
    pub fn dispatch_protocol_message(&self, message: &str) {
        self.inner.dispatch(message);
    }

    /// Pause before the next script's first statement. `reason` is reported
    /// as `params.reason` of the `Debugger.paused` event.
    pub fn schedule_pause_on_next_statement(&self, reason: &str, detail: &str) {
        *self.inner.scheduled_pause.lock() = Some(PendingPause {
            reason: reason.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn cancel_pause_on_next_statement(&self) {
        self.inner.scheduled_pause.lock().take();
    }

    /// End the current pause, if any.
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Disconnect from the context. Safe to call more than once.
    pub fn stop(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(execution) = self.inner.execution.upgrade() {
            execution.clear_observer(&self.observer);
        }
        self.inner.scheduled_pause.lock().take();
        self.inner.resume();
        tracing::debug!(target: "bridge.runtime", group = self.inner.context_group_id, "inspector session stopped");
    }
}

impl Drop for InspectorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SessionInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn dispatch(&self, message: &str) {
        if !self.is_connected() {
            return;
        }

        let request: Value = match serde_json::from_str(message) {
            Ok(request) => request,
            Err(_) => {
                self.notify(json!({ "error": { "code": PARSE_ERROR, "message": "Message must be a valid JSON" } }));
                return;
            }
        };
        let Some(id) = request.get("id").and_then(Value::as_i64) else {
            self.notify(json!({ "error": { "code": INVALID_REQUEST, "message": "Message must have integer 'id' property" } }));
            return;
        };
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            self.respond_error(id, ProtocolError::new(INVALID_REQUEST, "Message must have string 'method' property"));
            return;
        };

        tracing::trace!(target: "bridge.runtime", id, method, "protocol request");
        match self.handle(method) {
            Ok(reply) => {
                self.channel
                    .send_response(id, json!({ "id": id, "result": reply.result }).to_string());
                if reply.resume {
                    self.resume();
                }
            }
            Err(error) => self.respond_error(id, error),
        }
        self.channel.flush_protocol_notifications();
    }

    fn handle(&self, method: &str) -> Result<Reply, ProtocolError> {
        match method {
            "Debugger.enable" => {
                self.debugger_enabled.store(true, Ordering::SeqCst);
                Ok(json!({ "debuggerId": uuid::Uuid::new_v4().simple().to_string() }).into())
            }
            "Debugger.disable" => {
                self.debugger_enabled.store(false, Ordering::SeqCst);
                self.pause_requested.store(false, Ordering::SeqCst);
                Ok(Reply {
                    result: json!({}),
                    resume: true,
                })
            }
            "Debugger.pause" => {
                self.ensure_debugger_enabled()?;
                self.pause_requested.store(true, Ordering::SeqCst);
                if let Some(execution) = self.execution.upgrade() {
                    execution.request_interrupt();
                }
                Ok(json!({}).into())
            }
            "Debugger.resume" => {
                self.ensure_debugger_enabled()?;
                if !self.paused.load(Ordering::SeqCst) {
                    return Err(ProtocolError::new(SERVER_ERROR, "Can only perform operation while paused."));
                }
                Ok(Reply {
                    result: json!({}),
                    resume: true,
                })
            }
            "Runtime.enable" => {
                if !self.runtime_enabled.swap(true, Ordering::SeqCst) {
                    self.announce_context();
                }
                Ok(json!({}).into())
            }
            "Runtime.disable" => {
                self.runtime_enabled.store(false, Ordering::SeqCst);
                Ok(json!({}).into())
            }
            "Runtime.runIfWaitingForDebugger" => Ok(json!({}).into()),
            other => Err(ProtocolError::new(METHOD_NOT_FOUND, format!("'{other}' wasn't found"))),
        }
    }

    fn ensure_debugger_enabled(&self) -> Result<(), ProtocolError> {
        if self.debugger_enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProtocolError::new(SERVER_ERROR, "Debugger agent is not enabled"))
        }
    }

    fn announce_context(&self) {
        let Some(context) = self.client.ensure_default_context_in_group(self.context_group_id) else {
            return;
        };
        self.notify(json!({
            "method": "Runtime.executionContextCreated",
            "params": {
                "context": {
                    "id": context.id(),
                    "origin": "",
                    "name": "bridge",
                    "uniqueId": uuid::Uuid::new_v4().to_string(),
                    "auxData": { "isDefault": true },
                }
            }
        }));
    }

    fn respond_error(&self, id: i64, error: ProtocolError) {
        self.channel.send_response(
            id,
            json!({ "id": id, "error": { "code": error.code, "message": error.message } }).to_string(),
        );
    }

    fn notify(&self, message: Value) {
        self.channel.send_notification(message.to_string());
    }

    fn resume(&self) {
        if self.paused.load(Ordering::SeqCst) {
            self.client.quit_message_loop_on_pause();
        }
    }

    /// Block the script thread in the client's pause loop.
    fn pause(&self, pending: PendingPause) {
        if self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        let resource_name = self.resource_name.lock().clone();
        tracing::debug!(target: "bridge.runtime", reason = %pending.reason, resource = %resource_name, "paused");

        self.notify(json!({
            "method": "Debugger.paused",
            "params": {
                "reason": pending.reason,
                "data": { "detail": pending.detail, "resourceName": resource_name },
                "callFrames": [],
                "hitBreakpoints": [],
            }
        }));
        self.channel.flush_protocol_notifications();

        self.client.run_message_loop_on_pause(self.context_group_id);

        self.paused.store(false, Ordering::SeqCst);
        if self.is_connected() {
            self.notify(json!({ "method": "Debugger.resumed", "params": {} }));
            self.channel.flush_protocol_notifications();
        }
    }
}

impl ExecutionObserver for SessionInner {
    fn script_starting(&self, resource_name: &str) {
        *self.resource_name.lock() = resource_name.to_string();

        let Some(pending) = self.scheduled_pause.lock().take() else {
            return;
        };
        if self.debugger_enabled.load(Ordering::SeqCst) {
            self.pause(pending);
        }
    }

    fn interrupted(&self) {
        if self.pause_requested.swap(false, Ordering::SeqCst) && self.debugger_enabled.load(Ordering::SeqCst) {
            self.pause(PendingPause {
                reason: "other".to_string(),
                detail: String::new(),
            });
        }
    }
}
