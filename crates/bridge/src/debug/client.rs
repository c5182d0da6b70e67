//! Inspector Client
//!
//! Ties the engine's pause and interrupt facilities to the debug protocol.
//! While paused, the script thread sits in [`run_message_loop_on_pause`]
//! pumping the context's foreground task queue; requests from the frontend
//! arrive there as posted tasks.
//!
//! [`run_message_loop_on_pause`]: inspector::InspectorClient::run_message_loop_on_pause

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use bridge_js_runtime::inspector;
use bridge_js_runtime::{ForegroundTaskRunner, ScriptContext, TerminationHandle, WeakScriptContext};

use super::channel::MessageChannel;

/// Upper bound on how long the pause loop waits for a task before it
/// re-checks its flags.
const PAUSE_PUMP_INTERVAL: Duration = Duration::from_millis(100);

pub struct InspectorClient {
    context: WeakScriptContext,
    tasks: ForegroundTaskRunner,
    termination: TerminationHandle,
    channel: OnceLock<Weak<MessageChannel>>,
    terminated: AtomicBool,
    quit_loop: AtomicBool,
    running_nested_loop: AtomicBool,
}

impl InspectorClient {
    pub fn new(context: &ScriptContext) -> Self {
        Self {
            context: context.downgrade(),
            tasks: context.task_runner(),
            termination: context.termination_handle(),
            channel: OnceLock::new(),
            terminated: AtomicBool::new(false),
            quit_loop: AtomicBool::new(false),
            running_nested_loop: AtomicBool::new(false),
        }
    }

    pub fn attach_channel(&self, channel: &Arc<MessageChannel>) {
        let _ = self.channel.set(Arc::downgrade(channel));
    }

    fn channel(&self) -> Option<Arc<MessageChannel>> {
        self.channel.get().and_then(Weak::upgrade)
    }

    /// Dispatch on the calling thread. Only safe while no script is running.
    pub fn dispatch_message(&self, message: &str) {
        if let Some(channel) = self.channel() {
            channel.dispatch_protocol_message(message);
        }
    }

    /// Hand a request to the thread running script.
    pub fn dispatch_message_from_frontend(&self, message: String) {
        let channel = self.channel.get().cloned();
        self.tasks.post_task(move || {
            if let Some(channel) = channel.and_then(|weak| weak.upgrade()) {
                channel.dispatch_protocol_message(&message);
            }
        });
        self.termination.request_interrupt();
    }

    pub fn schedule_pause_on_next_statement(&self, reason: &str) {
        if let Some(channel) = self.channel() {
            channel.schedule_pause_on_next_statement(reason);
        }
    }

    pub fn cancel_pause_on_next_statement(&self) {
        if let Some(channel) = self.channel() {
            channel.cancel_pause_on_next_statement();
        }
    }

    /// Abort the running script, including one blocked in the pause loop.
    pub fn terminate_execution(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.termination.terminate_execution();
        inspector::InspectorClient::quit_message_loop_on_pause(self);

        let channel = self.channel.get().cloned();
        self.tasks.post_task(move || {
            if let Some(channel) = channel.and_then(|weak| weak.upgrade()) {
                channel.resume();
            }
        });
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Forget a termination from a previous run, including one that landed
    /// after that run had already returned.
    pub fn reset(&self) {
        self.terminated.store(false, Ordering::SeqCst);
        self.quit_loop.store(false, Ordering::SeqCst);
        self.termination.cancel_terminate_execution();
    }

    pub fn disconnect_frontend(&self) {
        inspector::InspectorClient::quit_message_loop_on_pause(self);
        if let Some(channel) = self.channel() {
            channel.disconnect();
        }
    }
}

impl inspector::InspectorClient for InspectorClient {
    fn run_message_loop_on_pause(&self, context_group_id: i32) {
        if self.running_nested_loop.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(target: "bridge.debug", group = context_group_id, "entering pause loop");

        while !self.quit_loop.load(Ordering::SeqCst)
            && !self.terminated.load(Ordering::SeqCst)
            && !self.termination.is_execution_terminating()
        {
            self.tasks.pump(Some(PAUSE_PUMP_INTERVAL));
        }

        self.quit_loop.store(false, Ordering::SeqCst);
        self.terminated.store(false, Ordering::SeqCst);
        self.running_nested_loop.store(false, Ordering::SeqCst);
        tracing::debug!(target: "bridge.debug", group = context_group_id, "left pause loop");
    }

    fn quit_message_loop_on_pause(&self) {
        self.quit_loop.store(true, Ordering::SeqCst);
    }

    fn ensure_default_context_in_group(&self, _context_group_id: i32) -> Option<ScriptContext> {
        self.context.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use bridge_js_runtime::inspector::InspectorClient as _;

    #[test]
    fn test_pause_loop_runs_posted_tasks_until_quit() {
        let context = ScriptContext::new().unwrap();
        let client = Arc::new(InspectorClient::new(&context));
        let hits = Arc::new(AtomicBool::new(false));

        {
            let client = Arc::clone(&client);
            let hits = Arc::clone(&hits);
            context.task_runner().post_task(move || {
                hits.store(true, Ordering::SeqCst);
                client.quit_message_loop_on_pause();
            });
        }

        client.run_message_loop_on_pause(1);
        assert!(hits.load(Ordering::SeqCst));
        assert!(!client.running_nested_loop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_nested_pause_loop_returns_immediately() {
        let context = ScriptContext::new().unwrap();
        let client = Arc::new(InspectorClient::new(&context));

        {
            let client_in_task = Arc::clone(&client);
            context.task_runner().post_task(move || {
                // Already pumping, so this must not block
                client_in_task.run_message_loop_on_pause(1);
                client_in_task.quit_message_loop_on_pause();
            });
        }

        client.run_message_loop_on_pause(1);
    }

    #[test]
    fn test_terminate_releases_pause_loop_from_other_thread() {
        let context = ScriptContext::new().unwrap();
        let client = Arc::new(InspectorClient::new(&context));

        let paused = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.run_message_loop_on_pause(1))
        };

        thread::sleep(Duration::from_millis(20));
        client.terminate_execution();
        paused.join().unwrap();

        // The loop clears the flag on its way out
        assert!(!client.is_terminated());
        context.termination_handle().cancel_terminate_execution();
    }

    #[test]
    fn test_reset_clears_stale_termination() {
        let context = ScriptContext::new().unwrap();
        let client = InspectorClient::new(&context);

        client.terminate_execution();
        assert!(client.is_terminated());
        assert!(context.is_execution_terminating());

        client.reset();
        assert!(!client.is_terminated());
        assert!(!context.is_execution_terminating());
        assert!(!client.quit_loop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_default_context_follows_context_lifetime() {
        let context = ScriptContext::new().unwrap();
        let client = InspectorClient::new(&context);

        assert_eq!(client.ensure_default_context_in_group(1).unwrap().id(), context.id());
        context.dispose();
        assert!(client.ensure_default_context_in_group(1).is_none());
    }
}
