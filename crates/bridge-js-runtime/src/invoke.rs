//! Method Dispatcher
//!
//! Resolves a script call on a wrapped host object to one overload, binds the
//! converted arguments and invokes it. Delegates follow the same conversion
//! and error rules against their single parameter list.

use rquickjs::Value;

use bridge_types::{coerce, HostError, HostResult, HostValue, MethodInfo, ParamInfo};

use crate::context::Scope;
use crate::convert::{self, throw_host_error, throw_script_error, ConversionCache, MemberPolicy};
use crate::wrapper::{self, Wrapped};

const DELEGATE_MEMBER: &str = "Invoke";

fn argument_mismatch(scope: &Scope<'_>, member: &str) -> rquickjs::Error {
    let message = format!("Argument mismatch for method \"{member}\".");
    match rquickjs::String::from_str(scope.ctx.clone(), &message) {
        Ok(message) => scope.ctx.throw(message.into_value()),
        Err(e) => e,
    }
}

/// Convert the first `count` script arguments. `None` marks an argument that
/// was absent or `undefined`.
fn convert_args<'js>(
    scope: &Scope<'js>,
    args: &[Value<'js>],
    count: usize,
) -> rquickjs::Result<Vec<Option<HostValue>>> {
    let mut cache = ConversionCache::new();
    let mut converted = Vec::with_capacity(count);
    for index in 0..count {
        let value = match args.get(index) {
            Some(arg) if !arg.is_undefined() => Some(
                convert::to_host(scope, arg, &mut cache).map_err(|e| throw_script_error(scope, e))?,
            ),
            _ => None,
        };
        converted.push(value);
    }
    Ok(converted)
}

/// Bind converted arguments to one parameter list. Returns the number of
/// exact type matches and the bound values, or `None` if any argument cannot
/// be coerced.
fn bind(params: &[ParamInfo], args: &[Option<HostValue>], supplied: usize) -> Option<(usize, Vec<HostValue>)> {
    let mut exact = 0;
    let mut bound = Vec::with_capacity(params.len());

    for (index, param) in params.iter().enumerate() {
        let arg = if index < supplied {
            args.get(index).cloned().flatten()
        } else {
            None
        };

        let value = match (arg, &param.default) {
            (None, Some(default)) => {
                bound.push(default.clone());
                continue;
            }
            (None, None) if index >= supplied => {
                bound.push(HostValue::Null);
                continue;
            }
            (arg, _) => arg.unwrap_or(HostValue::Null),
        };

        if value.host_type() == param.ty {
            exact += 1;
            bound.push(value);
            continue;
        }
        match coerce(value, &param.ty) {
            Ok(value) => bound.push(value),
            Err(_) => return None,
        }
    }
    Some((exact, bound))
}

/// Pick the overload with the most exact matches among those that take at
/// least `supplied` parameters. On a tie, an overload taking exactly
/// `supplied` parameters replaces the earlier pick.
pub(crate) fn select_overload(
    overloads: &[MethodInfo],
    args: &[Option<HostValue>],
    supplied: usize,
) -> Option<(usize, Vec<HostValue>)> {
    let mut best: Option<(usize, usize, Vec<HostValue>)> = None;

    for (index, overload) in overloads.iter().enumerate() {
        if overload.params.len() < supplied {
            continue;
        }
        let Some((exact, bound)) = bind(&overload.params, args, supplied) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((_, best_exact, _)) => {
                exact > *best_exact || (exact == *best_exact && overload.params.len() == supplied)
            }
        };
        if better {
            best = Some((index, exact, bound));
        }
    }

    best.map(|(index, _, bound)| (index, bound))
}

/// Map the outcome of a host call back into script.
fn finish<'js>(
    scope: &Scope<'js>,
    member: &str,
    result: HostResult<HostValue>,
    policy: MemberPolicy,
) -> rquickjs::Result<Value<'js>> {
    match result {
        Ok(value) => convert::to_script(scope, &value, policy).map_err(|e| throw_script_error(scope, e)),
        Err(HostError::Invocation(_) | HostError::Exception(_)) if scope.is_terminating() => {
            Ok(Value::new_undefined(scope.ctx.clone()))
        }
        Err(HostError::Argument(_)) => Err(argument_mismatch(scope, member)),
        Err(e) => Err(throw_host_error(scope, e)),
    }
}

/// Call method `name` on the host object behind arena entry `id`.
pub(crate) fn invoke_method<'js>(
    scope: &Scope<'js>,
    id: u32,
    name: &str,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let entry = wrapper::entry(scope, id)?;
    let Wrapped::Object(target) = &entry.wrapped else {
        return Err(argument_mismatch(scope, name));
    };

    let overloads = target.methods(name);
    if overloads.is_empty() {
        return Err(argument_mismatch(scope, name));
    }

    let supplied = args.len();
    let max_params = overloads.iter().map(|m| m.params.len()).max().unwrap_or(0);
    let converted = convert_args(scope, &args, max_params)?;

    let Some((overload, bound)) = select_overload(&overloads, &converted, supplied) else {
        return Err(argument_mismatch(scope, name));
    };

    tracing::trace!(target: "bridge.runtime", method = name, overload, "invoking host method");
    let result = target.invoke(name, overload, bound);
    finish(scope, name, result, entry.policy)
}

/// Call the host delegate behind arena entry `id`.
pub(crate) fn invoke_delegate<'js>(
    scope: &Scope<'js>,
    id: u32,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let entry = wrapper::entry(scope, id)?;
    let Wrapped::Callable(callable) = &entry.wrapped else {
        return Err(argument_mismatch(scope, DELEGATE_MEMBER));
    };

    let bound = if callable.is_variadic() {
        convert_args(scope, &args, args.len())?
            .into_iter()
            .map(|arg| arg.unwrap_or(HostValue::Null))
            .collect()
    } else {
        let params = callable.params();
        let converted = convert_args(scope, &args, params.len())?;
        match bind(params, &converted, args.len().min(params.len())) {
            Some((_, bound)) => bound,
            None => return Err(argument_mismatch(scope, DELEGATE_MEMBER)),
        }
    };

    let result = callable.call(bound);
    finish(scope, DELEGATE_MEMBER, result, entry.policy)
}
