//! Value Converter
//!
//! `to_host` and `to_script` move values across the script boundary. Both
//! take the owning [`Scope`] explicitly; neither consults ambient engine
//! state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use rquickjs::function::{Constructor, This};
use rquickjs::{Array, Function, Object, Type, Value};

use bridge_types::{
    HostArray, HostDict, HostError, HostException, HostRegex, HostValue, RegexFlags,
};

use crate::context::Scope;
use crate::error::{ScriptError, ScriptResult};
use crate::function::ScriptFunction;
use crate::wrapper::{self, Wrapped};

/// What a wrapped object does when script touches an undeclared member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) enum MemberPolicy {
    /// Reads yield `undefined`, writes become expandos
    #[default]
    Permissive,
    /// Reads and writes throw `Unknown member: <name>`
    Strict,
}

/// Script objects already converted during one `to_host` call tree.
pub(crate) struct ConversionCache<'js> {
    objects: HashMap<Object<'js>, HostValue>,
}

impl<'js> ConversionCache<'js> {
    pub(crate) fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    fn get(&self, object: &Object<'js>) -> Option<HostValue> {
        self.objects.get(object).cloned()
    }

    fn insert(&mut self, object: Object<'js>, value: HostValue) {
        self.objects.insert(object, value);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Script → Host
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a script value to a host value.
pub(crate) fn to_host<'js>(
    scope: &Scope<'js>,
    value: &Value<'js>,
    cache: &mut ConversionCache<'js>,
) -> ScriptResult<HostValue> {
    let host = match value.type_of() {
        Type::Uninitialized | Type::Undefined | Type::Null => HostValue::Null,
        Type::Bool => HostValue::Bool(value.as_bool().unwrap_or_default()),
        Type::Int => HostValue::Int(value.as_int().unwrap_or_default()),
        Type::Float => HostValue::Double(value.as_float().unwrap_or_default()),
        Type::String => HostValue::String(value.get::<String>()?),
        Type::Array => match value.as_array() {
            Some(array) => array_to_host(scope, array, cache)?,
            None => HostValue::Null,
        },
        Type::Function | Type::Constructor => match value.as_function() {
            Some(function) => function_to_host(scope, function)?,
            None => HostValue::Null,
        },
        Type::BigInt => match value.as_big_int() {
            Some(big) => HostValue::Long(big.clone().to_i64()?),
            None => HostValue::Null,
        },
        Type::Object | Type::Exception | Type::Promise => match value.as_object() {
            Some(object) => object_to_host(scope, object, cache)?,
            None => HostValue::Null,
        },
        _ => HostValue::Null,
    };
    Ok(host)
}

fn array_to_host<'js>(
    scope: &Scope<'js>,
    array: &Array<'js>,
    cache: &mut ConversionCache<'js>,
) -> ScriptResult<HostValue> {
    if let Some(seen) = cache.get(array.as_object()) {
        return Ok(seen);
    }

    let items = HostArray::new();
    cache.insert(array.as_object().clone(), HostValue::Array(items.clone()));
    for index in 0..array.len() {
        let element: Value = array.get(index)?;
        items.push(to_host(scope, &element, cache)?);
    }
    Ok(HostValue::Array(items))
}

fn function_to_host<'js>(scope: &Scope<'js>, function: &Function<'js>) -> ScriptResult<HostValue> {
    if let Some(entry) = wrapper::unwrap(scope, function.as_value())? {
        if let Wrapped::Callable(callable) = entry.wrapped {
            return Ok(HostValue::Callable(callable));
        }
    }
    let function = ScriptFunction::root(scope, function.clone());
    Ok(HostValue::Function(Arc::new(function)))
}

fn object_to_host<'js>(
    scope: &Scope<'js>,
    object: &Object<'js>,
    cache: &mut ConversionCache<'js>,
) -> ScriptResult<HostValue> {
    let date: Object = scope.global_object("Date")?;
    if object.is_instance_of(&date) {
        return date_to_host(object);
    }
    let regexp: Object = scope.global_object("RegExp")?;
    if object.is_instance_of(&regexp) {
        return regexp_to_host(object);
    }

    if let Some(entry) = wrapper::unwrap(scope, object.as_value())? {
        return Ok(match entry.wrapped {
            Wrapped::Object(host) => HostValue::Object(host),
            Wrapped::Callable(callable) => HostValue::Callable(callable),
            Wrapped::Exception(exception) => HostValue::Exception(exception),
        });
    }

    if object.as_value().is_error() {
        if let Some(exception) = wrapper::inner_exception(scope, object.as_value()) {
            return Ok(HostValue::Exception(exception));
        }
        let name = object
            .get::<_, Option<String>>("name")?
            .unwrap_or_else(|| "Error".to_string());
        let message = object.get::<_, Option<String>>("message")?.unwrap_or_default();
        return Ok(HostValue::Exception(HostException::with_type(name, message)));
    }

    if let Some(seen) = cache.get(object) {
        return Ok(seen);
    }
    let dict = HostDict::new();
    cache.insert(object.clone(), HostValue::Dictionary(dict.clone()));
    for prop in object.props::<String, Value>() {
        let (key, value) = prop?;
        let converted = to_host(scope, &value, cache)?;
        dict.insert(key, converted);
    }
    Ok(HostValue::Dictionary(dict))
}

fn date_to_host(date: &Object<'_>) -> ScriptResult<HostValue> {
    let get_time: Function = date.get("getTime")?;
    let millis: f64 = get_time.call((This(date.clone()),))?;
    if !millis.is_finite() {
        return Ok(HostValue::Null);
    }
    let converted = Utc
        .timestamp_millis_opt(millis as i64)
        .single()
        .map(|utc| HostValue::DateTime(utc.with_timezone(&Local)));
    Ok(converted.unwrap_or(HostValue::Null))
}

/// Only `i` and `m` survive; other script flags have no host equivalent.
fn regexp_to_host(regexp: &Object<'_>) -> ScriptResult<HostValue> {
    let source: String = regexp.get("source")?;
    let flags: String = regexp.get("flags")?;
    let flags = RegexFlags {
        ignore_case: flags.contains('i'),
        multiline: flags.contains('m'),
        ecma_script: true,
    };
    Ok(HostValue::Regex(HostRegex::new(source, flags)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Host → Script
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a host value to a script value. Wrappers created on the way use
/// `policy` for unknown members.
pub(crate) fn to_script<'js>(
    scope: &Scope<'js>,
    value: &HostValue,
    policy: MemberPolicy,
) -> ScriptResult<Value<'js>> {
    to_script_inner(scope, value, policy, &mut HashMap::new())
}

fn to_script_inner<'js>(
    scope: &Scope<'js>,
    value: &HostValue,
    policy: MemberPolicy,
    seen: &mut HashMap<usize, Value<'js>>,
) -> ScriptResult<Value<'js>> {
    let ctx = scope.ctx.clone();
    let converted = match value {
        HostValue::Null => Value::new_null(ctx),
        HostValue::Bool(b) => Value::new_bool(ctx, *b),
        HostValue::Byte(n) => Value::new_int(ctx, i32::from(*n)),
        HostValue::Short(n) => Value::new_int(ctx, i32::from(*n)),
        HostValue::Int(n) => Value::new_int(ctx, *n),
        HostValue::UInt(n) => match i32::try_from(*n) {
            Ok(n) => Value::new_int(ctx, n),
            Err(_) => Value::new_number(ctx, f64::from(*n)),
        },
        HostValue::Long(n) => match i32::try_from(*n) {
            Ok(n) => Value::new_int(ctx, n),
            Err(_) => Value::new_number(ctx, *n as f64),
        },
        HostValue::Float(n) => Value::new_float(ctx, f64::from(*n)),
        HostValue::Double(n) => Value::new_float(ctx, *n),
        HostValue::Decimal(d) => Value::new_float(ctx, d.to_f64()),
        HostValue::Enum(e) => rquickjs::String::from_str(ctx, e.name())?.into_value(),
        HostValue::Char(c) => rquickjs::String::from_str(ctx, &c.to_string())?.into_value(),
        HostValue::DateTime(dt) => {
            let date: Constructor = ctx.globals().get("Date")?;
            date.construct((dt.timestamp_millis() as f64,))?
        }
        HostValue::String(s) => rquickjs::String::from_str(ctx, s)?.into_value(),
        HostValue::Array(items) => {
            if let Some(existing) = seen.get(&items.id()) {
                return Ok(existing.clone());
            }
            let array = Array::new(ctx)?;
            seen.insert(items.id(), array.as_value().clone());
            for (index, item) in items.to_vec().iter().enumerate() {
                array.set(index, to_script_inner(scope, item, policy, seen)?)?;
            }
            array.into_value()
        }
        HostValue::Regex(regex) => {
            if !regex.flags().ecma_script {
                return Err(ScriptError::UnsupportedFeature(
                    "regular expressions must use ECMAScript-compatible syntax".into(),
                ));
            }
            let regexp: Constructor = ctx.globals().get("RegExp")?;
            regexp.construct((regex.pattern(), regex.script_flags()))?
        }
        HostValue::Callable(callable) => wrapper::wrap_callable(scope, callable.clone(), policy)?,
        HostValue::Exception(exception) => wrapper::wrap_exception(scope, exception)?,
        HostValue::Dictionary(dict) => {
            if let Some(existing) = seen.get(&dict.id()) {
                return Ok(existing.clone());
            }
            let object = Object::new(ctx)?;
            seen.insert(dict.id(), object.as_value().clone());
            for (key, item) in dict.entries() {
                object.set(key, to_script_inner(scope, &item, policy, seen)?)?;
            }
            object.into_value()
        }
        HostValue::Object(object) => wrapper::wrap_object(scope, object.clone(), policy)?,
        HostValue::Function(function) => {
            let own = function
                .as_any()
                .downcast_ref::<ScriptFunction>()
                .filter(|f| f.belongs_to(scope))
                .map(|f| f.token());
            match own {
                Some(token) => match scope.rooted_function(token)? {
                    Some(function) => function.into_value(),
                    None => return Err(ScriptError::InvalidHandle),
                },
                None => {
                    let callable = bridge_types::HostCallable::from_script(function.clone());
                    wrapper::wrap_callable(scope, callable, policy)?
                }
            }
        }
    };
    Ok(converted)
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors → Script Exceptions
// ─────────────────────────────────────────────────────────────────────────────

fn throw_string(scope: &Scope<'_>, message: &str) -> rquickjs::Error {
    match rquickjs::String::from_str(scope.ctx.clone(), message) {
        Ok(message) => scope.ctx.throw(message.into_value()),
        Err(e) => e,
    }
}

/// Throw a host exception into script as an `Error` carrying it.
pub(crate) fn throw_exception(scope: &Scope<'_>, exception: &HostException) -> rquickjs::Error {
    match wrapper::wrap_exception(scope, exception) {
        Ok(error) => scope.ctx.throw(error),
        Err(e) => e,
    }
}

/// Turn a failed host operation into a pending script exception.
pub(crate) fn throw_host_error(scope: &Scope<'_>, error: HostError) -> rquickjs::Error {
    match &error {
        HostError::Exception(_) | HostError::Invocation(_) => match error.root_exception() {
            Some(exception) => throw_exception(scope, &exception),
            None => rquickjs::Exception::throw_message(&scope.ctx, &error.to_string()),
        },
        HostError::Argument(message) => throw_string(scope, message),
        _ => rquickjs::Exception::throw_message(&scope.ctx, &error.to_string()),
    }
}

/// Turn a failed conversion into a pending script exception. Engine errors
/// already carry one.
pub(crate) fn throw_script_error(scope: &Scope<'_>, error: ScriptError) -> rquickjs::Error {
    match error {
        ScriptError::Engine(e) => e,
        ScriptError::Host(exception) => throw_exception(scope, &exception),
        other => rquickjs::Exception::throw_message(&scope.ctx, &other.to_string()),
    }
}

/// Host-side view of a failed script call.
pub(crate) fn host_error(scope: &Scope<'_>, error: ScriptError) -> HostError {
    match scope.settle(error) {
        ScriptError::Host(exception) => HostError::Exception(exception),
        ScriptError::InvalidHandle => HostError::InvalidHandle,
        other => HostError::Script(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    use bridge_types::{Decimal, EnumType, HostCallable, HostType, ParamInfo};

    use crate::ScriptContext;

    fn round_trip(context: &ScriptContext, value: HostValue) -> HostValue {
        context.set_parameter("v", value).unwrap();
        context.run("v").unwrap()
    }

    #[test]
    fn test_primitive_round_trips() {
        let context = ScriptContext::new().unwrap();

        for n in [0, -1, 42, i32::MAX, i32::MIN] {
            assert_eq!(round_trip(&context, HostValue::Int(n)), HostValue::Int(n));
        }
        for x in [0.5, -2.25, f64::MAX, f64::MIN, 4294967296.0] {
            assert_eq!(round_trip(&context, HostValue::Double(x)), HostValue::Double(x));
        }
        assert_eq!(round_trip(&context, HostValue::Bool(true)), HostValue::Bool(true));
        assert_eq!(round_trip(&context, HostValue::from("héllo")), HostValue::from("héllo"));
        assert_eq!(round_trip(&context, HostValue::Null), HostValue::Null);
    }

    #[test]
    fn test_integral_doubles_come_back_as_int() {
        let context = ScriptContext::new().unwrap();

        // The engine stores any number that fits an int32 as one
        for (x, n) in [(0.0, 0), (-3.0, -3), (2.0, 2), (2147483647.0, i32::MAX), (-2147483648.0, i32::MIN)] {
            let back = round_trip(&context, HostValue::Double(x));
            assert_eq!(back, HostValue::Int(n));
            assert_eq!(back.as_f64(), Some(x));
        }
    }

    #[test]
    fn test_narrow_integers_widen() {
        let context = ScriptContext::new().unwrap();

        assert_eq!(round_trip(&context, HostValue::Byte(200)), HostValue::Int(200));
        assert_eq!(round_trip(&context, HostValue::Short(-5)), HostValue::Int(-5));
        assert_eq!(round_trip(&context, HostValue::Long(7)), HostValue::Int(7));
        assert_eq!(
            round_trip(&context, HostValue::Long(1 << 40)),
            HostValue::Double((1i64 << 40) as f64)
        );
        assert_eq!(
            round_trip(&context, HostValue::UInt(u32::MAX)),
            HostValue::Double(f64::from(u32::MAX))
        );
        assert_eq!(
            round_trip(&context, HostValue::Decimal(Decimal::new(125, 2))),
            HostValue::Double(1.25)
        );
    }

    #[test]
    fn test_enum_and_char_become_strings() {
        let context = ScriptContext::new().unwrap();
        let color = EnumType::new("Color", ["Red", "Green"]);

        let green = color.value_of("Green").unwrap();
        assert_eq!(round_trip(&context, HostValue::Enum(green)), HostValue::from("Green"));
        assert_eq!(round_trip(&context, HostValue::Char('x')), HostValue::from("x"));
    }

    #[test]
    fn test_datetime_round_trip() {
        let context = ScriptContext::new().unwrap();
        let when: DateTime<Local> = Utc
            .timestamp_millis_opt(1_700_000_000_123)
            .unwrap()
            .with_timezone(&Local);

        context.set_parameter("when", HostValue::DateTime(when)).unwrap();
        assert_eq!(context.run("when instanceof Date").unwrap(), HostValue::Bool(true));
        assert_eq!(context.run("when.getTime()").unwrap(), HostValue::Double(1_700_000_000_123.0));
        assert_eq!(context.run("when").unwrap(), HostValue::DateTime(when));

        let later = context.run("new Date(when.getTime() + 1000)").unwrap();
        assert_eq!(later, HostValue::DateTime(when + Duration::seconds(1)));
    }

    #[test]
    fn test_regex_round_trip() {
        let context = ScriptContext::new().unwrap();
        let regex = HostRegex::ecma_script("^a+b$").ignore_case();

        context.set_parameter("re", HostValue::Regex(regex.clone())).unwrap();
        assert_eq!(context.run("re.test('AAB')").unwrap(), HostValue::Bool(true));
        assert_eq!(context.run("re").unwrap(), HostValue::Regex(regex));
    }

    #[test]
    fn test_regex_drops_unsupported_flags() {
        let context = ScriptContext::new().unwrap();
        let converted = context.run("/x/gimsu").unwrap();
        let regex = converted.as_regex().unwrap();
        assert_eq!(regex.pattern(), "x");
        assert_eq!(regex.script_flags(), "im");
    }

    #[test]
    fn test_non_ecma_regex_is_rejected() {
        let context = ScriptContext::new().unwrap();
        let regex = HostRegex::new("(?P<word>\\w+)", RegexFlags::default());
        assert!(matches!(
            context.set_parameter("re", HostValue::Regex(regex)),
            Err(ScriptError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_arrays_and_dictionaries() {
        let context = ScriptContext::new().unwrap();

        let converted = context.run("({ list: [1, 'two', null], nested: { ok: true } })").unwrap();
        let list = converted.get("list").unwrap();
        assert_eq!(list.get_index(0), Some(HostValue::Int(1)));
        assert_eq!(list.get_index(1), Some(HostValue::from("two")));
        assert_eq!(list.get_index(2), Some(HostValue::Null));
        assert_eq!(converted.get("nested").unwrap().get("ok"), Some(HostValue::Bool(true)));

        let dict = HostDict::new();
        dict.insert("answer", 42);
        dict.insert("items", vec![HostValue::Int(1), HostValue::Int(2)]);
        context.set_parameter("d", HostValue::Dictionary(dict)).unwrap();
        assert_eq!(context.run("d.answer + d.items.length").unwrap(), HostValue::Int(44));
    }

    #[test]
    fn test_script_cycle_keeps_identity() {
        let context = ScriptContext::new().unwrap();

        let converted = context.run("var o = { name: 'root' }; o.self = o; o").unwrap();
        let dict = converted.as_dict().unwrap();
        let inner = dict.get("self").unwrap();
        assert!(inner.as_dict().unwrap().ptr_eq(dict));

        let converted = context.run("var a = [1]; a.push(a); a").unwrap();
        let array = converted.as_array().unwrap();
        assert!(array.get(1).unwrap().as_array().unwrap().ptr_eq(array));
    }

    #[test]
    fn test_host_cycle_converts_to_script_cycle() {
        let context = ScriptContext::new().unwrap();
        let dict = HostDict::new();
        dict.insert("self", HostValue::Dictionary(dict.clone()));

        context.set_parameter("d", HostValue::Dictionary(dict.clone())).unwrap();
        assert_eq!(context.run("d.self === d").unwrap(), HostValue::Bool(true));

        // Break the host-side cycle so the test does not leak
        dict.remove("self");
    }

    #[test]
    fn test_bigint_and_unsupported_values() {
        let context = ScriptContext::new().unwrap();
        assert_eq!(context.run("12345678901234n").unwrap(), HostValue::Long(12345678901234));
        assert_eq!(context.run("Symbol('s')").unwrap(), HostValue::Null);
    }

    #[test]
    fn test_script_error_without_host_origin() {
        let context = ScriptContext::new().unwrap();
        let converted = context.run("new RangeError('too far')").unwrap();
        let exception = converted.as_exception().unwrap();
        assert_eq!(exception.type_name(), "RangeError");
        assert_eq!(exception.message(), "too far");
    }

    #[test]
    fn test_callable_keeps_identity() {
        let context = ScriptContext::new().unwrap();
        let double = HostCallable::new(vec![ParamInfo::new("x", HostType::Int)], |args| {
            Ok(HostValue::Int(args[0].as_i64().unwrap_or_default() as i32 * 2))
        });

        context.set_parameter("double", HostValue::Callable(double.clone())).unwrap();
        assert_eq!(context.run("double(21)").unwrap(), HostValue::Int(42));
        assert_eq!(context.run("double").unwrap(), HostValue::Callable(double));
    }

    #[test]
    fn test_script_function_comes_back_as_itself() {
        let context = ScriptContext::new().unwrap();
        let function = context.run("(function add(a, b) { return a + b; })").unwrap();

        context.set_parameter("f", function).unwrap();
        assert_eq!(context.run("f.name").unwrap(), HostValue::from("add"));
        assert_eq!(context.run("f(2, 3)").unwrap(), HostValue::Int(5));
    }
}
