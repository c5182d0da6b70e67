//! Script Context
//!
//! One [`ScriptContext`] owns one QuickJS runtime and one context. It is the
//! host-facing surface for running script, and it owns everything the bridge
//! hands out into script space: the wrapped-object arena and the rooted
//! script functions held by [`crate::ScriptFunction`]. Both are released in
//! bulk when the context is disposed or dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rquickjs::context::EvalOptions;
use rquickjs::{qjs, Coerced, Context, Ctx, Exception, Function, Object, Persistent, Runtime, Value};

use bridge_types::HostValue;

use crate::config::RuntimeConfig;
use crate::convert::{self, ConversionCache, MemberPolicy};
use crate::error::{ScriptError, ScriptResult};
use crate::globals::register_console;
use crate::tasks::ForegroundTaskRunner;
use crate::wrapper::{self, HandleArena, SavedTemplate};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Default resource name for scripts run without one.
pub const DEFAULT_RESOURCE_NAME: &str = "anonymous";

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Options
// ─────────────────────────────────────────────────────────────────────────────

/// Options for [`ScriptContext::set_parameter_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ParameterOptions(u8);

impl ParameterOptions {
    pub const NONE: Self = Self(0);

    /// Reading or writing an undeclared member of a wrapped object throws
    /// `Unknown member: <name>` instead of yielding `undefined`.
    pub const REJECT_UNKNOWN_PROPERTIES: Self = Self(1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn member_policy(self) -> MemberPolicy {
        if self.contains(Self::REJECT_UNKNOWN_PROPERTIES) {
            MemberPolicy::Strict
        } else {
            MemberPolicy::Permissive
        }
    }
}

impl std::ops::BitOr for ParameterOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution State
// ─────────────────────────────────────────────────────────────────────────────

/// Hooks into script execution, installed by an inspector session.
pub(crate) trait ExecutionObserver: Send + Sync {
    /// Called on the engine thread before a script's first statement runs.
    fn script_starting(&self, resource_name: &str);

    /// Called on the engine thread when a requested interrupt is serviced.
    fn interrupted(&self);
}

/// State shared between the engine thread, the interrupt handler and
/// [`TerminationHandle`]s on other threads.
pub(crate) struct ExecutionState {
    terminating: AtomicBool,
    interrupt_requested: AtomicBool,
    depth: AtomicUsize,
    tasks: ForegroundTaskRunner,
    observer: RwLock<Option<Arc<dyn ExecutionObserver>>>,
}

impl ExecutionState {
    fn new() -> Self {
        Self {
            terminating: AtomicBool::new(false),
            interrupt_requested: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
            tasks: ForegroundTaskRunner::new(),
            observer: RwLock::new(None),
        }
    }

    /// Body of the runtime's interrupt handler; `true` aborts the running script.
    fn poll_interrupt(&self) -> bool {
        if self.terminating.load(Ordering::SeqCst) {
            return true;
        }
        if self.interrupt_requested.swap(false, Ordering::SeqCst) {
            self.tasks.run_pending();
            if let Some(observer) = self.observer() {
                observer.interrupted();
            }
        }
        self.terminating.load(Ordering::SeqCst)
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    pub(crate) fn tasks(&self) -> &ForegroundTaskRunner {
        &self.tasks
    }

    pub(crate) fn request_interrupt(&self) {
        self.interrupt_requested.store(true, Ordering::SeqCst);
    }

    fn observer(&self) -> Option<Arc<dyn ExecutionObserver>> {
        self.observer.read().clone()
    }

    pub(crate) fn set_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Remove `observer` if it is still the installed one.
    pub(crate) fn clear_observer(&self, observer: &Arc<dyn ExecutionObserver>) {
        let mut installed = self.observer.write();
        if installed.as_ref().is_some_and(|current| Arc::ptr_eq(current, observer)) {
            *installed = None;
        }
    }

    fn begin_run(self: &Arc<Self>) -> RunGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        RunGuard {
            state: Arc::clone(self),
        }
    }
}

/// Tracks nested runs; leaving the outermost one clears a pending termination.
struct RunGuard {
    state: Arc<ExecutionState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.state.depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.terminating.store(false, Ordering::SeqCst);
        }
    }
}

/// Cross-thread control over a context's execution.
#[derive(Clone)]
pub struct TerminationHandle {
    state: Arc<ExecutionState>,
}

impl TerminationHandle {
    /// Abort the running script at its next interrupt poll.
    pub fn terminate_execution(&self) {
        self.state.terminating.store(true, Ordering::SeqCst);
        self.state.interrupt_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_terminate_execution(&self) {
        self.state.terminating.store(false, Ordering::SeqCst);
    }

    pub fn is_execution_terminating(&self) -> bool {
        self.state.is_terminating()
    }

    /// Ask the engine to drain posted tasks at its next interrupt poll.
    pub fn request_interrupt(&self) {
        self.state.request_interrupt();
    }

    pub fn task_runner(&self) -> &ForegroundTaskRunner {
        &self.state.tasks
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context Internals
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    /// Contexts whose runtime lock this thread currently holds.
    static ACTIVE_CONTEXTS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

struct ActiveGuard;

impl ActiveGuard {
    fn push(id: u64) -> Self {
        ACTIVE_CONTEXTS.with(|active| active.borrow_mut().push(id));
        ActiveGuard
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE_CONTEXTS.with(|active| active.borrow_mut().pop());
    }
}

struct RawContext(NonNull<qjs::JSContext>);

// SAFETY: the pointer is only dereferenced through `Ctx::from_raw` on a thread
// that already holds this context's runtime lock.
unsafe impl Send for RawContext {}
unsafe impl Sync for RawContext {}

/// Engine values kept alive across lock scopes.
#[derive(Default)]
pub(crate) struct Roots {
    template: Option<SavedTemplate>,
    functions: HashMap<u64, Persistent<Function<'static>>>,
    released: Vec<Persistent<Function<'static>>>,
    next_token: u64,
}

// SAFETY: persistent values are only cloned, restored or dropped while the
// owning runtime's lock is held; moving them between threads is fine.
unsafe impl Send for Roots {}

impl Roots {
    pub(crate) fn template(&self) -> Option<&SavedTemplate> {
        self.template.as_ref()
    }

    pub(crate) fn set_template(&mut self, template: SavedTemplate) {
        self.template.get_or_insert(template);
    }

    fn root_function(&mut self, function: Persistent<Function<'static>>) -> u64 {
        self.next_token += 1;
        self.functions.insert(self.next_token, function);
        self.next_token
    }

    fn function(&self, token: u64) -> Option<Persistent<Function<'static>>> {
        self.functions.get(&token).cloned()
    }

    fn contains(&self, token: u64) -> bool {
        self.functions.contains_key(&token)
    }

    /// Unroot a function; its value is dropped at the next engine entry.
    fn release(&mut self, token: u64) {
        if let Some(function) = self.functions.remove(&token) {
            self.released.push(function);
        }
    }
}

pub(crate) struct ContextInner {
    pub(crate) id: u64,
    runtime: Runtime,
    context: Context,
    raw: RawContext,
    pub(crate) execution: Arc<ExecutionState>,
    pub(crate) handles: Mutex<HandleArena>,
    pub(crate) roots: Mutex<Roots>,
    disposed: AtomicBool,
}

impl ContextInner {
    fn new(config: &RuntimeConfig) -> ScriptResult<Arc<Self>> {
        let runtime = Runtime::new()?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = config.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let execution = Arc::new(ExecutionState::new());
        let state = Arc::clone(&execution);
        runtime.set_interrupt_handler(Some(Box::new(move || state.poll_interrupt())));

        let context = Context::full(&runtime)?;
        let raw = RawContext(context.as_raw());

        let inner = Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            runtime,
            context,
            raw,
            execution,
            handles: Mutex::new(HandleArena::default()),
            roots: Mutex::new(Roots::default()),
            disposed: AtomicBool::new(false),
        });

        inner.enter(|ctx| wrapper::install_template(&Scope::new(ctx, Arc::clone(&inner))))?;
        if config.console {
            inner.enter(|ctx| register_console(&ctx, inner.id))?;
        }

        tracing::debug!(target: "bridge.runtime", context = inner.id, "script context created");
        Ok(inner)
    }

    /// Run `f` with this context's `Ctx`, taking the runtime lock unless this
    /// thread already holds it.
    pub(crate) fn enter<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        let active = ACTIVE_CONTEXTS.with(|active| active.borrow().contains(&self.id));
        if active {
            // SAFETY: this thread is inside `Context::with` for this context,
            // so the runtime lock is held for the duration of `f`.
            let ctx = unsafe { Ctx::from_raw(self.raw.0) };
            return f(ctx);
        }

        self.context.with(|ctx| {
            let _active = ActiveGuard::push(self.id);
            let released = std::mem::take(&mut self.roots.lock().released);
            drop(released);
            f(ctx)
        })
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> ScriptResult<()> {
        if self.is_disposed() {
            return Err(ScriptError::Disposed);
        }
        Ok(())
    }

    pub(crate) fn release_function(&self, token: u64) {
        self.roots.lock().release(token);
    }

    pub(crate) fn is_function_rooted(&self, token: u64) -> bool {
        self.roots.lock().contains(token)
    }

    /// Drop every rooted engine value. Must run under the runtime lock.
    fn release_roots(&self) {
        let roots = std::mem::take(&mut *self.roots.lock());
        drop(roots);
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let roots = std::mem::take(self.roots.get_mut());
        self.context.with(|_ctx| drop(roots));
        tracing::debug!(target: "bridge.runtime", context = self.id, "script context dropped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// The context an engine callback or conversion runs against, passed
/// explicitly to every converter and dispatcher operation.
#[derive(Clone)]
pub(crate) struct Scope<'js> {
    pub(crate) ctx: Ctx<'js>,
    pub(crate) inner: Arc<ContextInner>,
}

impl<'js> Scope<'js> {
    pub(crate) fn new(ctx: Ctx<'js>, inner: Arc<ContextInner>) -> Self {
        Self { ctx, inner }
    }

    /// Resolve a callback's weak context reference, throwing into script if
    /// the context is gone or disposed.
    pub(crate) fn upgrade(weak: &Weak<ContextInner>, ctx: Ctx<'js>) -> rquickjs::Result<Self> {
        match weak.upgrade() {
            Some(inner) if !inner.is_disposed() => Ok(Self { ctx, inner }),
            _ => Err(Exception::throw_internal(&ctx, "The script context has been disposed")),
        }
    }

    pub(crate) fn weak(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.inner.execution.is_terminating()
    }

    pub(crate) fn root_function(&self, function: Function<'js>) -> u64 {
        let saved = Persistent::save(&self.ctx, function);
        self.inner.roots.lock().root_function(saved)
    }

    pub(crate) fn rooted_function(&self, token: u64) -> rquickjs::Result<Option<Function<'js>>> {
        let saved = self.inner.roots.lock().function(token);
        saved.map(|f| f.restore(&self.ctx)).transpose()
    }

    pub(crate) fn global_object(&self, name: &str) -> rquickjs::Result<Object<'js>> {
        self.ctx.globals().get(name)
    }

    /// Resolve an engine exception into the error it carries.
    pub(crate) fn settle(&self, error: ScriptError) -> ScriptError {
        match error {
            ScriptError::Engine(rquickjs::Error::Exception) => self.caught_error(),
            other => other,
        }
    }

    /// Take the pending exception and classify it.
    pub(crate) fn caught_error(&self) -> ScriptError {
        let thrown = self.ctx.catch();
        if self.is_terminating() {
            return ScriptError::Terminated;
        }
        if let Some(exception) = wrapper::inner_exception(self, &thrown) {
            return ScriptError::Host(exception);
        }
        ScriptError::Exception {
            message: describe_thrown(&thrown),
        }
    }
}

/// `"<Name>: <message>"` for `Error` objects, the string form otherwise.
pub(crate) fn describe_thrown(thrown: &Value<'_>) -> String {
    if thrown.is_error() {
        if let Some(object) = thrown.as_object() {
            let name = object.get::<_, Option<String>>("name").ok().flatten();
            let message = object.get::<_, Option<String>>("message").ok().flatten();
            return match (name, message) {
                (Some(name), Some(message)) if !message.is_empty() => format!("{name}: {message}"),
                (Some(name), _) => name,
                (None, Some(message)) => message,
                (None, None) => "Error".to_string(),
            };
        }
    }
    thrown
        .get::<Coerced<String>>()
        .map(|s| s.0)
        .unwrap_or_else(|_| "Unknown script error".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Script Context
// ─────────────────────────────────────────────────────────────────────────────

/// A script execution context.
///
/// Clones share the same engine context. The context is released when the
/// last clone drops, or earlier through [`ScriptContext::dispose`].
#[derive(Clone)]
pub struct ScriptContext {
    inner: Arc<ContextInner>,
}

impl ScriptContext {
    pub fn new() -> ScriptResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> ScriptResult<Self> {
        Ok(Self {
            inner: ContextInner::new(&config)?,
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Evaluate a global script and convert its completion value.
    pub fn run(&self, script: &str) -> ScriptResult<HostValue> {
        self.run_with_name(script, DEFAULT_RESOURCE_NAME)
    }

    pub fn run_with_name(&self, script: &str, resource_name: &str) -> ScriptResult<HostValue> {
        let inner = &self.inner;
        inner.check_alive()?;

        let _run = inner.execution.begin_run();
        if let Some(observer) = inner.execution.observer() {
            observer.script_starting(resource_name);
        }
        if inner.execution.is_terminating() {
            return Err(ScriptError::Terminated);
        }

        tracing::trace!(target: "bridge.runtime", context = inner.id, resource = resource_name, "running script");
        let result = inner.enter(|ctx| {
            let scope = Scope::new(ctx.clone(), Arc::clone(inner));
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = false;
            options.backtrace_barrier = true;

            let value = ctx
                .eval_with_options::<Value, _>(script, options)
                .map_err(|e| scope.settle(e.into()))?;
            while ctx.execute_pending_job() {}
            convert::to_host(&scope, &value, &mut ConversionCache::new()).map_err(|e| scope.settle(e))
        });

        if let Err(e) = &result {
            tracing::debug!(target: "bridge.runtime", context = inner.id, resource = resource_name, "script failed: {}", e);
        }
        result
    }

    /// Convert `value` into script space and store it as a global.
    pub fn set_parameter(&self, name: &str, value: impl Into<HostValue>) -> ScriptResult<()> {
        self.set_parameter_with_options(name, value, ParameterOptions::NONE)
    }

    pub fn set_parameter_with_options(
        &self,
        name: &str,
        value: impl Into<HostValue>,
        options: ParameterOptions,
    ) -> ScriptResult<()> {
        if name.is_empty() {
            return Err(ScriptError::InvalidArgument("parameter name is empty".into()));
        }
        self.inner.check_alive()?;
        let value = value.into();

        self.inner.enter(|ctx| {
            let scope = Scope::new(ctx.clone(), Arc::clone(&self.inner));
            let script_value = convert::to_script(&scope, &value, options.member_policy())
                .map_err(|e| scope.settle(e))?;
            ctx.globals().set(name, script_value)?;
            Ok(())
        })
    }

    /// Read a global and convert it to a host value.
    pub fn get_parameter(&self, name: &str) -> ScriptResult<HostValue> {
        self.inner.check_alive()?;
        self.inner.enter(|ctx| {
            let scope = Scope::new(ctx.clone(), Arc::clone(&self.inner));
            let value: Value = ctx.globals().get(name)?;
            convert::to_host(&scope, &value, &mut ConversionCache::new()).map_err(|e| scope.settle(e))
        })
    }

    /// Forcefully abort the running script; safe to call from any thread.
    pub fn terminate_execution(&self) {
        self.termination_handle().terminate_execution();
    }

    pub fn is_execution_terminating(&self) -> bool {
        self.inner.execution.is_terminating()
    }

    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            state: Arc::clone(&self.inner.execution),
        }
    }

    pub fn task_runner(&self) -> ForegroundTaskRunner {
        self.inner.execution.tasks().clone()
    }

    pub fn downgrade(&self) -> WeakScriptContext {
        WeakScriptContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Release every wrapper and rooted function created by this context.
    /// Later calls on the context fail with [`ScriptError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let released = self.inner.handles.lock().clear();
        self.inner.enter(|_ctx| self.inner.release_roots());
        tracing::debug!(target: "bridge.runtime", context = self.inner.id, released, "script context disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Number of live wrapped host objects and delegates.
    pub fn wrapped_count(&self) -> usize {
        self.inner.handles.lock().len()
    }

    pub fn collect_garbage(&self) {
        self.inner.runtime.run_gc();
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }

    pub(crate) fn execution(&self) -> &Arc<ExecutionState> {
        &self.inner.execution
    }
}

/// Weak reference to a [`ScriptContext`].
#[derive(Clone)]
pub struct WeakScriptContext {
    inner: Weak<ContextInner>,
}

impl WeakScriptContext {
    pub fn upgrade(&self) -> Option<ScriptContext> {
        self.inner
            .upgrade()
            .filter(|inner| !inner.is_disposed())
            .map(|inner| ScriptContext { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_run_primitives() {
        let context = ScriptContext::new().unwrap();

        assert_eq!(context.run("1 + 1").unwrap(), HostValue::Int(2));
        assert_eq!(context.run("0.5 * 3").unwrap(), HostValue::Double(1.5));
        assert_eq!(context.run("'a' + 'b'").unwrap(), HostValue::from("ab"));
        assert_eq!(context.run("true && false").unwrap(), HostValue::Bool(false));
        assert_eq!(context.run("undefined").unwrap(), HostValue::Null);
    }

    #[test]
    fn test_globals_persist_between_runs() {
        let context = ScriptContext::new().unwrap();
        context.run("var counter = 40;").unwrap();
        context.run("counter += 2;").unwrap();
        assert_eq!(context.get_parameter("counter").unwrap(), HostValue::Int(42));
    }

    #[test]
    fn test_error_message_has_name_prefix() {
        let context = ScriptContext::new().unwrap();
        let err = context.run("throw new TypeError('bad thing')").unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad thing");

        let err = context.run("null.foo").unwrap_err();
        assert!(err.to_string().starts_with("TypeError:"));
    }

    #[test]
    fn test_thrown_string_is_stringified() {
        let context = ScriptContext::new().unwrap();
        match context.run("throw 'plain'").unwrap_err() {
            ScriptError::Exception { message } => assert_eq!(message, "plain"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error() {
        let context = ScriptContext::new().unwrap();
        let err = context.run("var = ;").unwrap_err();
        assert!(err.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn test_set_parameter_rejects_empty_name() {
        let context = ScriptContext::new().unwrap();
        assert!(matches!(
            context.set_parameter("", 1),
            Err(ScriptError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_terminate_infinite_loop_from_other_thread() {
        let context = ScriptContext::new().unwrap();
        let handle = context.termination_handle();

        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.terminate_execution();
        });

        let err = context.run("while (true) {}").unwrap_err();
        assert!(err.is_terminated());
        killer.join().unwrap();

        // Termination clears once the outermost run unwinds
        assert!(!context.is_execution_terminating());
        assert_eq!(context.run("3").unwrap(), HostValue::Int(3));
    }

    #[test]
    fn test_termination_cannot_be_caught() {
        let context = ScriptContext::new().unwrap();
        let handle = context.termination_handle();

        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.terminate_execution();
        });

        let err = context
            .run("var caught = false; try { while (true) {} } catch (e) { caught = true; } caught")
            .unwrap_err();
        assert!(err.is_terminated());
        killer.join().unwrap();
    }

    #[test]
    fn test_posted_tasks_run_during_script() {
        let context = ScriptContext::new().unwrap();
        let handle = context.termination_handle();
        let ran = Arc::new(AtomicBool::new(false));

        let poster = {
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                handle.task_runner().post_task(move || ran.store(true, Ordering::SeqCst));
                handle.request_interrupt();
                thread::sleep(Duration::from_millis(50));
                handle.terminate_execution();
            })
        };

        let _ = context.run("while (true) {}");
        poster.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dispose() {
        let context = ScriptContext::new().unwrap();
        let weak = context.downgrade();
        assert!(weak.is_alive());

        context.dispose();
        assert!(context.is_disposed());
        assert!(!weak.is_alive());
        assert!(matches!(context.run("1"), Err(ScriptError::Disposed)));
    }

    #[test]
    fn test_weak_context_dies_with_last_clone() {
        let context = ScriptContext::new().unwrap();
        let weak = context.downgrade();
        let clone = context.clone();
        drop(context);
        assert!(weak.is_alive());
        drop(clone);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_memory_limit() {
        let config = RuntimeConfig::new().with_memory_limit(4 << 20);
        let context = ScriptContext::with_config(config).unwrap();
        let err = context
            .run("var a = []; while (true) { a.push(new Array(10000).fill(1)); }")
            .unwrap_err();
        assert!(!err.is_terminated());
    }

    #[test]
    fn test_parameter_options() {
        let options = ParameterOptions::NONE | ParameterOptions::REJECT_UNKNOWN_PROPERTIES;
        assert!(options.contains(ParameterOptions::REJECT_UNKNOWN_PROPERTIES));
        assert_eq!(options.member_policy(), MemberPolicy::Strict);
        assert_eq!(ParameterOptions::NONE.member_policy(), MemberPolicy::Permissive);
    }
}
