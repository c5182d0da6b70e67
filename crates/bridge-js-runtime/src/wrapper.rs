//! Object Wrapper
//!
//! Host objects cross into script as `Proxy` objects created from one shared
//! handler per context. Proxies and their targets map to arena ids through a
//! weak map only the host can reach; the arena owns the host side and is
//! released in bulk when the context goes away.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use rquickjs::function::{Constructor, Rest, This};
use rquickjs::object::Property;
use rquickjs::{Array, Ctx, Function, Object, Persistent, Symbol, Value};

use bridge_types::{coerce, HostCallable, HostException, HostObjectRef, HostValue};

use crate::context::{ContextInner, Scope};
use crate::convert::{self, throw_host_error, throw_script_error, ConversionCache, MemberPolicy};
use crate::invoke;

// ─────────────────────────────────────────────────────────────────────────────
// Handle Arena
// ─────────────────────────────────────────────────────────────────────────────

/// The host side of a handle.
#[derive(Clone)]
pub(crate) enum Wrapped {
    Object(HostObjectRef),
    Callable(HostCallable),
    Exception(HostException),
}

#[derive(Clone)]
pub(crate) struct HandleEntry {
    pub(crate) wrapped: Wrapped,
    pub(crate) policy: MemberPolicy,
}

impl Wrapped {
    /// Address of the shared host value. Exceptions are not shared between
    /// throws and have none.
    fn identity(&self) -> Option<usize> {
        match self {
            Wrapped::Object(object) => Some(Arc::as_ptr(object) as *const () as usize),
            Wrapped::Callable(callable) => Some(callable.id()),
            Wrapped::Exception(_) => None,
        }
    }
}

/// Per-context table of everything handed out into script space. A host
/// object or delegate gets one entry per member policy however often it
/// crosses.
#[derive(Default)]
pub(crate) struct HandleArena {
    entries: HashMap<u32, HandleEntry>,
    by_identity: HashMap<(usize, MemberPolicy), u32>,
    next_id: u32,
}

impl HandleArena {
    pub(crate) fn insert(&mut self, wrapped: Wrapped, policy: MemberPolicy) -> u32 {
        let identity = wrapped.identity();
        if let Some(id) = identity.and_then(|identity| self.by_identity.get(&(identity, policy))) {
            return *id;
        }

        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(self.next_id, HandleEntry { wrapped, policy });
        if let Some(identity) = identity {
            self.by_identity.insert((identity, policy), self.next_id);
        }
        self.next_id
    }

    pub(crate) fn get(&self, id: u32) -> Option<HandleEntry> {
        self.entries.get(&id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Release every entry; returns how many were live.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.by_identity.clear();
        count
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Template
// ─────────────────────────────────────────────────────────────────────────────

/// The per-context proxy handler and `Proxy` constructor, plus the weak map
/// from proxies, proxy targets, delegate functions and exception holders to
/// their arena ids. Only the host can reach the map, so script can neither
/// read a handle nor forge one. All are rooted across lock scopes.
#[derive(Clone)]
pub(crate) struct SavedTemplate {
    handler: Persistent<Object<'static>>,
    proxy: Persistent<Constructor<'static>>,
    handles: Persistent<Object<'static>>,
    handles_get: Persistent<Function<'static>>,
    handles_set: Persistent<Function<'static>>,
}

pub(crate) struct Template<'js> {
    handler: Object<'js>,
    proxy: Constructor<'js>,
    handles: Object<'js>,
    handles_get: Function<'js>,
    handles_set: Function<'js>,
}

impl SavedTemplate {
    fn restore<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Template<'js>> {
        Ok(Template {
            handler: self.handler.restore(ctx)?,
            proxy: self.proxy.restore(ctx)?,
            handles: self.handles.restore(ctx)?,
            handles_get: self.handles_get.restore(ctx)?,
            handles_set: self.handles_set.restore(ctx)?,
        })
    }
}

impl<'js> Template<'js> {
    fn save(&self, ctx: &Ctx<'js>) -> SavedTemplate {
        SavedTemplate {
            handler: Persistent::save(ctx, self.handler.clone()),
            proxy: Persistent::save(ctx, self.proxy.clone()),
            handles: Persistent::save(ctx, self.handles.clone()),
            handles_get: Persistent::save(ctx, self.handles_get.clone()),
            handles_set: Persistent::save(ctx, self.handles_set.clone()),
        }
    }
}

/// Build the template while the global object is still pristine, so later
/// script cannot swap out `Proxy` or `WeakMap` underneath it.
pub(crate) fn install_template(scope: &Scope<'_>) -> rquickjs::Result<()> {
    template(scope).map(drop)
}

fn existing_template<'js>(scope: &Scope<'js>) -> rquickjs::Result<Option<Template<'js>>> {
    let saved = scope.inner.roots.lock().template().cloned();
    saved.map(|saved| saved.restore(&scope.ctx)).transpose()
}

fn template<'js>(scope: &Scope<'js>) -> rquickjs::Result<Template<'js>> {
    if let Some(template) = existing_template(scope)? {
        return Ok(template);
    }
    let template = build_template(scope)?;
    scope.inner.roots.lock().set_template(template.save(&scope.ctx));
    Ok(template)
}

fn build_template<'js>(scope: &Scope<'js>) -> rquickjs::Result<Template<'js>> {
    let ctx = scope.ctx.clone();
    let proxy: Constructor = ctx.globals().get("Proxy")?;
    let handles: Object = ctx.eval("new WeakMap()")?;
    let handles_get: Function = ctx.eval("WeakMap.prototype.get")?;
    let handles_set: Function = ctx.eval("WeakMap.prototype.set")?;
    let handler = Object::new(ctx.clone())?;

    let weak = scope.weak();
    handler.set(
        "get",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
            get_trap(&weak, ctx, target, key)
        })?,
    )?;

    let weak = scope.weak();
    handler.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>, value: Value<'js>| {
                set_trap(&weak, ctx, target, key, value)
            },
        )?,
    )?;

    let weak = scope.weak();
    handler.set(
        "has",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
            has_trap(&weak, ctx, target, key)
        })?,
    )?;

    let weak = scope.weak();
    handler.set(
        "ownKeys",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>| {
            own_keys_trap(&weak, ctx, target)
        })?,
    )?;

    let weak = scope.weak();
    handler.set(
        "getOwnPropertyDescriptor",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
            descriptor_trap(&weak, ctx, target, key)
        })?,
    )?;

    let weak = scope.weak();
    handler.set(
        "deleteProperty",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
            delete_trap(&weak, ctx, target, key)
        })?,
    )?;

    Ok(Template {
        handler,
        proxy,
        handles,
        handles_get,
        handles_set,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Wrapping & Unwrapping
// ─────────────────────────────────────────────────────────────────────────────

fn register(scope: &Scope<'_>, wrapped: Wrapped, policy: MemberPolicy) -> u32 {
    scope.inner.handles.lock().insert(wrapped, policy)
}

fn tag<'js>(template: &Template<'js>, key: &Value<'js>, id: u32) -> rquickjs::Result<()> {
    template
        .handles_set
        .call::<_, Value>((This(template.handles.clone()), key.clone(), id))?;
    Ok(())
}

/// Wrap a host object in a fresh proxy.
pub(crate) fn wrap_object<'js>(
    scope: &Scope<'js>,
    object: HostObjectRef,
    policy: MemberPolicy,
) -> rquickjs::Result<Value<'js>> {
    let template = template(scope)?;
    let id = register(scope, Wrapped::Object(object), policy);
    let target = Object::new(scope.ctx.clone())?;
    tag(&template, target.as_value(), id)?;
    let proxy: Value = template.proxy.construct((target, template.handler.clone()))?;
    tag(&template, &proxy, id)?;
    Ok(proxy)
}

/// Expose a host delegate as a script function.
pub(crate) fn wrap_callable<'js>(
    scope: &Scope<'js>,
    callable: HostCallable,
    policy: MemberPolicy,
) -> rquickjs::Result<Value<'js>> {
    let template = template(scope)?;
    let id = register(scope, Wrapped::Callable(callable), policy);
    let weak = scope.weak();
    let function = Function::new(scope.ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
        let scope = Scope::upgrade(&weak, ctx)?;
        invoke::invoke_delegate(&scope, id, args.0)
    })?;
    tag(&template, function.as_value(), id)?;
    Ok(function.into_value())
}

/// Build a script `Error` for a host exception, keeping the exception
/// reachable through a hidden `InnerException` property.
pub(crate) fn wrap_exception<'js>(
    scope: &Scope<'js>,
    exception: &HostException,
) -> rquickjs::Result<Value<'js>> {
    let template = template(scope)?;
    let id = register(scope, Wrapped::Exception(exception.clone()), MemberPolicy::Permissive);

    let error_ctor: Constructor = scope.ctx.globals().get("Error")?;
    let error: Object = error_ctor.construct((exception.message(),))?;
    error.prop(
        "name",
        Property::from(exception.type_name().to_string()).writable().configurable(),
    )?;

    let holder = Object::new(scope.ctx.clone())?;
    tag(&template, holder.as_value(), id)?;
    error.prop("InnerException", Property::from(holder).configurable())?;
    Ok(error.into_value())
}

fn handle_of<'js>(template: &Template<'js>, key: &Value<'js>) -> Option<u32> {
    template
        .handles_get
        .call::<_, Option<u32>>((This(template.handles.clone()), key.clone()))
        .ok()
        .flatten()
}

/// The arena entry behind a proxy, delegate function or exception holder.
pub(crate) fn unwrap<'js>(scope: &Scope<'js>, object: &Value<'js>) -> rquickjs::Result<Option<HandleEntry>> {
    let Some(template) = existing_template(scope)? else {
        return Ok(None);
    };
    Ok(handle_of(&template, object).and_then(|id| scope.inner.handles.lock().get(id)))
}

/// The host exception carried by a thrown value, if it came from the host.
pub(crate) fn inner_exception<'js>(scope: &Scope<'js>, thrown: &Value<'js>) -> Option<HostException> {
    let holder = thrown
        .as_object()?
        .get::<_, Option<Object>>("InnerException")
        .ok()
        .flatten()?;
    match unwrap(scope, holder.as_value()).ok().flatten()?.wrapped {
        Wrapped::Exception(exception) => Some(exception),
        _ => None,
    }
}

pub(crate) fn entry<'js>(scope: &Scope<'js>, id: u32) -> rquickjs::Result<HandleEntry> {
    scope
        .inner
        .handles
        .lock()
        .get(id)
        .ok_or_else(|| rquickjs::Exception::throw_internal(&scope.ctx, "Invalid handle"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxy Traps
// ─────────────────────────────────────────────────────────────────────────────

/// `"0"`, `"17"`; not `"01"`, `"-1"` or `"4294967295"`.
fn canonical_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}

struct Target<'js> {
    scope: Scope<'js>,
    id: u32,
    object: HostObjectRef,
    policy: MemberPolicy,
}

fn resolve<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: &Object<'js>,
) -> rquickjs::Result<Option<Target<'js>>> {
    let scope = Scope::upgrade(weak, ctx)?;
    let template = template(&scope)?;
    let Some(id) = handle_of(&template, target.as_value()) else {
        return Ok(None);
    };
    let entry = entry(&scope, id)?;
    match entry.wrapped {
        Wrapped::Object(object) => Ok(Some(Target {
            scope,
            id,
            object,
            policy: entry.policy,
        })),
        _ => Ok(None),
    }
}

fn unknown_member(scope: &Scope<'_>, name: &str) -> rquickjs::Error {
    match rquickjs::String::from_str(scope.ctx.clone(), &format!("Unknown member: {name}")) {
        Ok(message) => scope.ctx.throw(message.into_value()),
        Err(e) => e,
    }
}

fn to_script<'js>(scope: &Scope<'js>, value: &HostValue, policy: MemberPolicy) -> rquickjs::Result<Value<'js>> {
    convert::to_script(scope, value, policy).map_err(|e| throw_script_error(scope, e))
}

fn to_host<'js>(scope: &Scope<'js>, value: &Value<'js>) -> rquickjs::Result<HostValue> {
    convert::to_host(scope, value, &mut ConversionCache::new()).map_err(|e| throw_script_error(scope, e))
}

fn get_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let Some(host) = resolve(weak, ctx.clone(), &target)? else {
        return target.get(key);
    };

    if let Some(symbol) = key.as_symbol() {
        if *symbol == Symbol::iterator(ctx.clone()) && host.object.iterate().is_some() {
            return iterator_function(&host);
        }
        return target.get(key);
    }

    let name: String = key.get()?;
    if let Some(index) = canonical_index(&name) {
        if host.object.indexer_type().is_none() {
            return target.get(key);
        }
        let value = host
            .object
            .index_get(index)
            .map_err(|e| throw_host_error(&host.scope, e))?;
        return to_script(&host.scope, &value, host.policy);
    }

    get_named(&host, &target, &name)
}

fn get_named<'js>(host: &Target<'js>, target: &Object<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
    let scope = &host.scope;

    if !host.object.methods(name).is_empty() {
        return method_function(host, name);
    }

    match host.object.get_property(name) {
        Ok(Some(value)) => return to_script(scope, &value, host.policy),
        Ok(None) => {}
        Err(e) => return Err(throw_host_error(scope, e)),
    }

    if name == "toString" {
        return display_function(host);
    }
    if name == "toJSON" && host.object.to_json().is_some() {
        return json_function(host);
    }
    if let Some(value) = host.object.get_key(name) {
        return to_script(scope, &value, host.policy);
    }

    // Engine conversion probes stay answerable under the strict policy
    let conversion_hook = matches!(name, "toJSON" | "valueOf");
    if host.policy == MemberPolicy::Strict && !conversion_hook {
        return Err(unknown_member(scope, name));
    }
    target.get(name)
}

fn method_function<'js>(host: &Target<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
    let weak = host.scope.weak();
    let id = host.id;
    let member = name.to_string();
    let function = Function::new(host.scope.ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
        let scope = Scope::upgrade(&weak, ctx)?;
        invoke::invoke_method(&scope, id, &member, args.0)
    })?;
    function.set_name(name)?;
    Ok(function.into_value())
}

fn display_function<'js>(host: &Target<'js>) -> rquickjs::Result<Value<'js>> {
    let weak = host.scope.weak();
    let id = host.id;
    let function = Function::new(host.scope.ctx.clone(), move |ctx: Ctx<'js>| -> rquickjs::Result<String> {
        let scope = Scope::upgrade(&weak, ctx)?;
        match entry(&scope, id)?.wrapped {
            Wrapped::Object(object) => Ok(object.display()),
            _ => Ok(String::new()),
        }
    })?;
    Ok(function.into_value())
}

fn json_function<'js>(host: &Target<'js>) -> rquickjs::Result<Value<'js>> {
    let weak = host.scope.weak();
    let id = host.id;
    let function = Function::new(host.scope.ctx.clone(), move |ctx: Ctx<'js>| {
        let scope = Scope::upgrade(&weak, ctx.clone())?;
        let entry = entry(&scope, id)?;
        let Wrapped::Object(object) = &entry.wrapped else {
            return Ok(Value::new_undefined(ctx));
        };
        match object.to_json() {
            Some(value) => to_script(&scope, &value, entry.policy),
            None => Ok(Value::new_undefined(ctx)),
        }
    })?;
    Ok(function.into_value())
}

/// `[Symbol.iterator]` over a snapshot of the host object's items.
fn iterator_function<'js>(host: &Target<'js>) -> rquickjs::Result<Value<'js>> {
    let weak = host.scope.weak();
    let id = host.id;
    let function = Function::new(host.scope.ctx.clone(), move |ctx: Ctx<'js>| {
        let scope = Scope::upgrade(&weak, ctx.clone())?;
        let entry = entry(&scope, id)?;
        let items = match &entry.wrapped {
            Wrapped::Object(object) => object.iterate().unwrap_or_default(),
            _ => Vec::new(),
        };

        let array = Array::new(ctx.clone())?;
        for (index, item) in items.iter().enumerate() {
            array.set(index, to_script(&scope, item, entry.policy)?)?;
        }
        let iterator: Function = array.as_object().get(Symbol::iterator(ctx))?;
        iterator.call::<_, Value>((This(array),))
    })?;
    Ok(function.into_value())
}

fn set_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
    key: Value<'js>,
    value: Value<'js>,
) -> rquickjs::Result<bool> {
    let Some(host) = resolve(weak, ctx, &target)? else {
        target.set(key, value)?;
        return Ok(true);
    };
    if key.is_symbol() {
        target.set(key, value)?;
        return Ok(true);
    }

    let scope = &host.scope;
    let name: String = key.get()?;
    if let (Some(index), Some(ty)) = (canonical_index(&name), host.object.indexer_type()) {
        let converted = to_host(scope, &value)?;
        let coerced = coerce(converted, &ty).map_err(|e| throw_host_error(scope, e))?;
        host.object
            .index_set(index, coerced)
            .map_err(|e| throw_host_error(scope, e))?;
        return Ok(true);
    }

    let declared = host.object.properties().into_iter().find(|p| p.name == name);
    if let Some(property) = declared {
        if !property.writable {
            return Ok(false);
        }
        let converted = to_host(scope, &value)?;
        let coerced = coerce(converted, &property.ty).map_err(|e| throw_host_error(scope, e))?;
        return host
            .object
            .set_property(&name, coerced)
            .map_err(|e| throw_host_error(scope, e));
    }

    if host.object.keys().is_some() {
        if value.is_undefined() {
            host.object.remove_key(&name);
            return Ok(true);
        }
        let converted = to_host(scope, &value)?;
        return Ok(host.object.set_key(&name, converted));
    }

    if host.policy == MemberPolicy::Strict {
        return Err(unknown_member(scope, &name));
    }
    target.set(name, value)?;
    Ok(true)
}

fn has_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
    key: Value<'js>,
) -> rquickjs::Result<bool> {
    let Some(host) = resolve(weak, ctx, &target)? else {
        return target.contains_key(key);
    };
    if key.is_symbol() {
        return target.contains_key(key);
    }

    let name: String = key.get()?;
    if let Some(index) = canonical_index(&name) {
        if host.object.indexer_type().is_some() {
            return Ok(host.object.index_get(index).is_ok());
        }
    }

    let found = host.object.properties().iter().any(|p| p.name == name)
        || !host.object.methods(&name).is_empty()
        || host.object.keys().is_some_and(|keys| keys.contains(&name));
    Ok(found || target.contains_key(name)?)
}

/// Keys reported for enumeration: declared enumerable properties (or the
/// dictionary keys), then expandos.
fn listed_keys<'js>(host: &Target<'js>, target: &Object<'js>) -> rquickjs::Result<Vec<String>> {
    let mut keys = match host.object.keys() {
        Some(keys) => keys,
        None => host
            .object
            .properties()
            .into_iter()
            .filter(|p| p.enumerable)
            .map(|p| p.name)
            .collect(),
    };
    for key in target.keys::<String>() {
        let key = key?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

fn own_keys_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
) -> rquickjs::Result<Array<'js>> {
    let keys = match resolve(weak, ctx.clone(), &target)? {
        Some(host) => listed_keys(&host, &target)?,
        None => target.keys::<String>().collect::<rquickjs::Result<_>>()?,
    };
    let array = Array::new(ctx)?;
    for (index, key) in keys.into_iter().enumerate() {
        array.set(index, key)?;
    }
    Ok(array)
}

fn descriptor<'js>(ctx: &Ctx<'js>, value: Value<'js>, enumerable: bool) -> rquickjs::Result<Value<'js>> {
    let descriptor = Object::new(ctx.clone())?;
    descriptor.set("value", value)?;
    descriptor.set("writable", true)?;
    descriptor.set("enumerable", enumerable)?;
    descriptor.set("configurable", true)?;
    Ok(descriptor.into_value())
}

fn descriptor_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let Some(host) = resolve(weak, ctx.clone(), &target)? else {
        return Ok(Value::new_undefined(ctx));
    };
    if key.is_symbol() {
        return Ok(Value::new_undefined(ctx));
    }

    let name: String = key.get()?;
    if listed_keys(&host, &target)?.contains(&name) {
        let value = get_named(&host, &target, &name)?;
        return descriptor(&ctx, value, true);
    }
    let hidden = host
        .object
        .properties()
        .into_iter()
        .any(|p| p.name == name && !p.enumerable);
    if hidden {
        let value = get_named(&host, &target, &name)?;
        return descriptor(&ctx, value, false);
    }
    Ok(Value::new_undefined(ctx))
}

fn delete_trap<'js>(
    weak: &Weak<ContextInner>,
    ctx: Ctx<'js>,
    target: Object<'js>,
    key: Value<'js>,
) -> rquickjs::Result<bool> {
    let Some(host) = resolve(weak, ctx, &target)? else {
        target.remove(key)?;
        return Ok(true);
    };
    if key.is_symbol() {
        return Ok(false);
    }

    let name: String = key.get()?;
    if host.object.keys().is_some() {
        return Ok(host.object.remove_key(&name));
    }
    if target.contains_key(name.as_str())? {
        target.remove(name.as_str())?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bridge_types::{HostClass, HostType, ParamInfo};
    use parking_lot::RwLock;

    use crate::{ParameterOptions, ScriptContext, ScriptError};

    struct Person {
        name: RwLock<String>,
        age: RwLock<i32>,
        secret: String,
    }

    fn person_class() -> Arc<HostClass<Person>> {
        HostClass::<Person>::builder("Person")
            .writable_property(
                "name",
                HostType::String,
                |p| Ok(p.name.read().clone().into()),
                |p, v| {
                    *p.name.write() = v.as_str().unwrap_or_default().to_string();
                    Ok(())
                },
            )
            .writable_property(
                "age",
                HostType::Int,
                |p| Ok(HostValue::Int(*p.age.read())),
                |p, v| {
                    *p.age.write() = v.as_i64().unwrap_or_default() as i32;
                    Ok(())
                },
            )
            .property("secret", HostType::String, |p| Ok(p.secret.clone().into()))
            .hide("secret")
            .method(
                "greet",
                vec![ParamInfo::new("greeting", HostType::String)],
                HostType::String,
                |p, args| {
                    let greeting = args[0].as_str().unwrap_or_default().to_string();
                    Ok(format!("{greeting}, {}", p.name.read()).into())
                },
            )
            .display(|p| format!("Person({})", p.name.read()))
            .build()
    }

    fn person(name: &str, age: i32) -> HostValue {
        let instance = person_class().instantiate(Person {
            name: RwLock::new(name.to_string()),
            age: RwLock::new(age),
            secret: "hidden".to_string(),
        });
        HostValue::Object(instance)
    }

    #[test]
    fn test_canonical_index() {
        assert_eq!(canonical_index("0"), Some(0));
        assert_eq!(canonical_index("42"), Some(42));
        assert_eq!(canonical_index("01"), None);
        assert_eq!(canonical_index("-1"), None);
        assert_eq!(canonical_index("1.5"), None);
        assert_eq!(canonical_index(""), None);
        assert_eq!(canonical_index("4294967295"), None);
        assert_eq!(canonical_index("name"), None);
    }

    #[test]
    fn test_arena_bulk_release() {
        let mut arena = HandleArena::default();
        let a = arena.insert(Wrapped::Exception(HostException::new("a")), MemberPolicy::Permissive);
        let b = arena.insert(Wrapped::Exception(HostException::new("b")), MemberPolicy::Strict);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(b).unwrap().policy, MemberPolicy::Strict);

        assert_eq!(arena.clear(), 2);
        assert!(arena.get(a).is_none());
    }

    #[test]
    fn test_property_get_and_set() {
        let context = ScriptContext::new().unwrap();
        let alice = person("Alice", 30);
        context.set_parameter("p", alice.clone()).unwrap();

        assert_eq!(context.run("p.name").unwrap(), HostValue::from("Alice"));
        assert_eq!(context.run("p.age + 1").unwrap(), HostValue::Int(31));

        context.run("p.name = 'Bob'; p.age = '41';").unwrap();
        let person = alice.downcast_object::<bridge_types::Instance<Person>>().unwrap();
        assert_eq!(*person.value().name.read(), "Bob");
        assert_eq!(*person.value().age.read(), 41);
    }

    #[test]
    fn test_method_and_to_string() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();

        assert_eq!(context.run("p.greet('Hi')").unwrap(), HostValue::from("Hi, Alice"));
        assert_eq!(context.run("p.toString()").unwrap(), HostValue::from("Person(Alice)"));
        assert_eq!(context.run("`${p}`").unwrap(), HostValue::from("Person(Alice)"));
    }

    #[test]
    fn test_permissive_unknown_member() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();

        assert_eq!(context.run("typeof p.missing").unwrap(), HostValue::from("undefined"));

        // Expandos are kept on the proxy target
        context.run("p.extra = 5;").unwrap();
        assert_eq!(context.run("p.extra").unwrap(), HostValue::Int(5));
    }

    #[test]
    fn test_strict_unknown_member() {
        let context = ScriptContext::new().unwrap();
        context
            .set_parameter_with_options("p", person("Alice", 30), ParameterOptions::REJECT_UNKNOWN_PROPERTIES)
            .unwrap();

        assert_eq!(context.run("p.name").unwrap(), HostValue::from("Alice"));
        match context.run("p.missing").unwrap_err() {
            ScriptError::Exception { message } => assert_eq!(message, "Unknown member: missing"),
            other => panic!("unexpected error: {other:?}"),
        }
        match context.run("p.missing = 1").unwrap_err() {
            ScriptError::Exception { message } => assert_eq!(message, "Unknown member: missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_enumeration_skips_hidden_properties() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();

        assert_eq!(context.run("Object.keys(p).join(',')").unwrap(), HostValue::from("name,age"));
        assert_eq!(context.run("p.secret").unwrap(), HostValue::from("hidden"));
        assert_eq!(
            context.run("JSON.stringify(p)").unwrap(),
            HostValue::from(r#"{"name":"Alice","age":30}"#)
        );
    }

    #[test]
    fn test_wrapper_unwraps_to_same_object() {
        let context = ScriptContext::new().unwrap();
        let alice = person("Alice", 30);
        context.set_parameter("p", alice.clone()).unwrap();

        let back = context.run("p").unwrap();
        assert_eq!(back, alice);
    }

    #[test]
    fn test_indexer_and_iteration() {
        struct Bag(RwLock<Vec<i32>>);

        let class = HostClass::<Bag>::builder("Bag")
            .writable_indexer(
                HostType::Int,
                |b, i| {
                    b.0.read()
                        .get(i as usize)
                        .map(|v| HostValue::Int(*v))
                        .ok_or_else(|| bridge_types::HostError::exception("index out of range"))
                },
                |b, i, v| {
                    if let (Some(slot), Some(v)) = (b.0.write().get_mut(i as usize), v.as_i64()) {
                        *slot = v as i32;
                    }
                    Ok(())
                },
            )
            .iterate(|b| b.0.read().iter().map(|v| HostValue::Int(*v)).collect())
            .build();
        let bag = HostValue::Object(class.instantiate(Bag(RwLock::new(vec![1, 2, 3]))));

        let context = ScriptContext::new().unwrap();
        context.set_parameter("bag", bag).unwrap();

        assert_eq!(context.run("bag[1]").unwrap(), HostValue::Int(2));
        context.run("bag[2] = '9'").unwrap();
        assert_eq!(context.run("bag[2]").unwrap(), HostValue::Int(9));
        assert_eq!(context.run("[...bag].join('-')").unwrap(), HostValue::from("1-2-9"));
        assert_eq!(context.run("1 in bag").unwrap(), HostValue::Bool(true));
    }

    #[test]
    fn test_dictionary_like_access() {
        struct Settings(RwLock<HashMap<String, HostValue>>);

        let class = HostClass::<Settings>::builder("Settings")
            .keyed(
                |s| s.0.read().keys().cloned().collect(),
                |s, key| s.0.read().get(key).cloned(),
                |s, key, value| {
                    s.0.write().insert(key.to_string(), value);
                },
                |s, key| {
                    s.0.write().remove(key);
                },
            )
            .build();
        let settings = class.instantiate(Settings(RwLock::new(HashMap::new())));

        let context = ScriptContext::new().unwrap();
        context.set_parameter("s", HostValue::Object(settings.clone())).unwrap();

        context.run("s.mode = 'fast'; s.level = 3;").unwrap();
        assert_eq!(context.run("s.mode").unwrap(), HostValue::from("fast"));
        assert_eq!(settings.value().0.read().len(), 2);

        context.run("s.level = undefined; delete s.mode;").unwrap();
        assert!(settings.value().0.read().is_empty());
    }

    #[test]
    fn test_host_exception_round_trip() {
        let context = ScriptContext::new().unwrap();
        let exception = HostException::with_type("IoError", "disk full");
        context.set_parameter("e", HostValue::Exception(exception.clone())).unwrap();

        assert_eq!(context.run("e.message").unwrap(), HostValue::from("disk full"));
        assert_eq!(context.run("e instanceof Error").unwrap(), HostValue::Bool(true));
        assert_eq!(context.run("Object.keys(e).length").unwrap(), HostValue::Int(0));

        match context.run("throw e").unwrap_err() {
            ScriptError::Host(thrown) => assert!(thrown.ptr_eq(&exception)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_arena_reuses_entry_per_object_and_policy() {
        let mut arena = HandleArena::default();
        let HostValue::Object(alice) = person("Alice", 30) else {
            unreachable!()
        };

        let first = arena.insert(Wrapped::Object(alice.clone()), MemberPolicy::Permissive);
        let again = arena.insert(Wrapped::Object(alice.clone()), MemberPolicy::Permissive);
        let strict = arena.insert(Wrapped::Object(alice), MemberPolicy::Strict);
        assert_eq!(first, again);
        assert_ne!(first, strict);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_repeated_crossings_do_not_grow_arena() {
        let context = ScriptContext::new().unwrap();
        let alice = person("Alice", 30);
        let friend = {
            let alice = alice.clone();
            HostCallable::variadic(move |_| Ok(alice.clone()))
        };
        context.set_parameter("friend", HostValue::Callable(friend)).unwrap();
        context.set_parameter("p", alice.clone()).unwrap();
        assert_eq!(context.wrapped_count(), 2);

        context
            .run("for (let i = 0; i < 1000; i++) { friend().name; }")
            .unwrap();
        context.set_parameter("p", alice).unwrap();
        assert_eq!(context.wrapped_count(), 2);
    }

    #[test]
    fn test_handles_are_not_visible_to_script() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();
        let greet = HostCallable::variadic(|_| Ok(HostValue::Null));
        context.set_parameter("f", HostValue::Callable(greet)).unwrap();

        assert_eq!(context.run("Object.getOwnPropertySymbols(p).length").unwrap(), HostValue::Int(0));
        assert_eq!(context.run("Object.getOwnPropertySymbols(f).length").unwrap(), HostValue::Int(0));
        assert_eq!(context.run("Reflect.ownKeys(p).join(',')").unwrap(), HostValue::from("name,age"));
    }

    #[test]
    fn test_copied_properties_do_not_forge_a_wrapper() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();
        let greet = HostCallable::variadic(|_| Ok(HostValue::Null));
        context.set_parameter("f", HostValue::Callable(greet)).unwrap();

        let copied = context
            .run(
                "var fake = {};
                 for (const s of Object.getOwnPropertySymbols(f)) fake[s] = f[s];
                 for (const k of Reflect.ownKeys(p)) fake[k] = p[k];
                 fake",
            )
            .unwrap();
        assert!(matches!(copied, HostValue::Dictionary(_)));
        assert!(matches!(context.run("({})").unwrap(), HostValue::Dictionary(_)));
    }

    #[test]
    fn test_disposed_context_releases_handles() {
        let context = ScriptContext::new().unwrap();
        context.set_parameter("p", person("Alice", 30)).unwrap();
        assert_eq!(context.wrapped_count(), 1);

        context.dispose();
        assert_eq!(context.wrapped_count(), 0);
    }
}
