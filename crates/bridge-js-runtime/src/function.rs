//! Host-side handle to a script function.

use std::any::Any;
use std::sync::{Arc, Weak};

use rquickjs::function::Args;
use rquickjs::Value;

use bridge_types::{HostError, HostResult, HostValue, ScriptCallable};

use crate::context::{ContextInner, Scope};
use crate::convert::{self, host_error, ConversionCache, MemberPolicy};

/// A script function held by the host.
///
/// Holds only a weak reference to its context. Every call first checks that
/// the context is alive and not disposed and that the function is still
/// rooted, and fails with [`HostError::InvalidHandle`] otherwise.
pub struct ScriptFunction {
    context: Weak<ContextInner>,
    token: u64,
}

impl ScriptFunction {
    pub(crate) fn root<'js>(scope: &Scope<'js>, function: rquickjs::Function<'js>) -> Self {
        Self {
            context: scope.weak(),
            token: scope.root_function(function),
        }
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    pub(crate) fn belongs_to(&self, scope: &Scope<'_>) -> bool {
        std::ptr::eq(self.context.as_ptr(), Arc::as_ptr(&scope.inner))
    }

    fn live_context(&self) -> Option<Arc<ContextInner>> {
        self.context.upgrade().filter(|inner| !inner.is_disposed())
    }
}

impl ScriptCallable for ScriptFunction {
    fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        let inner = self.live_context().ok_or(HostError::InvalidHandle)?;

        inner.enter(|ctx| {
            let scope = Scope::new(ctx.clone(), Arc::clone(&inner));
            let function = scope
                .rooted_function(self.token)
                .map_err(|e| host_error(&scope, e.into()))?
                .ok_or(HostError::InvalidHandle)?;

            let mut call_args = Args::new(ctx.clone(), args.len());
            for arg in &args {
                let value = convert::to_script(&scope, arg, MemberPolicy::Permissive)
                    .map_err(|e| host_error(&scope, e))?;
                call_args
                    .push_arg(value)
                    .map_err(|e| host_error(&scope, e.into()))?;
            }

            let result: Value = function
                .call_arg(call_args)
                .map_err(|e| host_error(&scope, e.into()))?;
            convert::to_host(&scope, &result, &mut ConversionCache::new()).map_err(|e| host_error(&scope, e))
        })
    }

    fn is_valid(&self) -> bool {
        self.live_context()
            .is_some_and(|inner| inner.is_function_rooted(self.token))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for ScriptFunction {
    fn drop(&mut self) {
        if let Some(inner) = self.context.upgrade() {
            inner.release_function(self.token);
        }
    }
}
