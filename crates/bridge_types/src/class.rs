//! Closure-backed host classes
//!
//! [`HostClass`] describes a Rust type to the script runtime without macros:
//! properties, overloaded methods, an indexer and keyed access are registered
//! as closures, and [`Instance`] pairs a description with a value to produce
//! a [`HostObject`].
//!
//! ```ignore
//! let class = HostClass::<Counter>::builder("Counter")
//!     .property("Count", HostType::Int, |c| Ok(c.count.load(Ordering::SeqCst).into()))
//!     .method("Add", vec![ParamInfo::new("n", HostType::Int)], HostType::Null, |c, args| {
//!         c.count.fetch_add(args[0].as_i64().unwrap_or(0) as i32, Ordering::SeqCst);
//!         Ok(HostValue::Null)
//!     })
//!     .build();
//! let value = HostValue::Object(class.instantiate(Counter::default()));
//! ```

use std::any::Any;
use std::sync::Arc;

use crate::error::{HostError, HostResult};
use crate::reflect::{HostObject, MethodInfo, ParamInfo, PropertyInfo};
use crate::types::HostType;
use crate::value::HostValue;

type Getter<T> = Box<dyn Fn(&T) -> HostResult<HostValue> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&T, HostValue) -> HostResult<()> + Send + Sync>;
type MethodFn<T> = Box<dyn Fn(&T, Vec<HostValue>) -> HostResult<HostValue> + Send + Sync>;
type IndexGetter<T> = Box<dyn Fn(&T, u32) -> HostResult<HostValue> + Send + Sync>;
type IndexSetter<T> = Box<dyn Fn(&T, u32, HostValue) -> HostResult<()> + Send + Sync>;

struct ClassProperty<T> {
    info: PropertyInfo,
    get: Getter<T>,
    set: Option<Setter<T>>,
}

struct ClassMethod<T> {
    name: String,
    info: MethodInfo,
    call: MethodFn<T>,
}

struct ClassIndexer<T> {
    value_type: HostType,
    get: IndexGetter<T>,
    set: Option<IndexSetter<T>>,
}

struct ClassKeyed<T> {
    keys: Box<dyn Fn(&T) -> Vec<String> + Send + Sync>,
    get: Box<dyn Fn(&T, &str) -> Option<HostValue> + Send + Sync>,
    set: Box<dyn Fn(&T, &str, HostValue) + Send + Sync>,
    remove: Box<dyn Fn(&T, &str) + Send + Sync>,
}

/// Reflection description of `T`.
pub struct HostClass<T> {
    name: String,
    properties: Vec<ClassProperty<T>>,
    methods: Vec<ClassMethod<T>>,
    indexer: Option<ClassIndexer<T>>,
    keyed: Option<ClassKeyed<T>>,
    to_json: Option<Getter<T>>,
    iterate: Option<Box<dyn Fn(&T) -> Vec<HostValue> + Send + Sync>>,
    display: Option<Box<dyn Fn(&T) -> String + Send + Sync>>,
}

impl<T: Send + Sync + 'static> HostClass<T> {
    pub fn builder(name: impl Into<String>) -> ClassBuilder<T> {
        ClassBuilder {
            class: HostClass {
                name: name.into(),
                properties: Vec::new(),
                methods: Vec::new(),
                indexer: None,
                keyed: None,
                to_json: None,
                iterate: None,
                display: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pair a value with this description.
    pub fn instantiate(self: &Arc<Self>, value: T) -> Arc<Instance<T>> {
        Arc::new(Instance {
            class: Arc::clone(self),
            value,
        })
    }

    fn property(&self, name: &str) -> Option<&ClassProperty<T>> {
        self.properties.iter().find(|p| p.info.name == name)
    }
}

/// Builder for [`HostClass`].
pub struct ClassBuilder<T> {
    class: HostClass<T>,
}

impl<T: Send + Sync + 'static> ClassBuilder<T> {
    /// Read-only property.
    pub fn property<G>(mut self, name: impl Into<String>, ty: HostType, get: G) -> Self
    where
        G: Fn(&T) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.class.properties.push(ClassProperty {
            info: PropertyInfo {
                name: name.into(),
                ty,
                writable: false,
                enumerable: true,
            },
            get: Box::new(get),
            set: None,
        });
        self
    }

    /// Read-write property; the setter receives a value already coerced to `ty`.
    pub fn writable_property<G, S>(mut self, name: impl Into<String>, ty: HostType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> HostResult<HostValue> + Send + Sync + 'static,
        S: Fn(&T, HostValue) -> HostResult<()> + Send + Sync + 'static,
    {
        self.class.properties.push(ClassProperty {
            info: PropertyInfo {
                name: name.into(),
                ty,
                writable: true,
                enumerable: true,
            },
            get: Box::new(get),
            set: Some(Box::new(set)),
        });
        self
    }

    /// Exclude a declared property from enumeration.
    pub fn hide(mut self, name: &str) -> Self {
        if let Some(p) = self.class.properties.iter_mut().find(|p| p.info.name == name) {
            p.info.enumerable = false;
        }
        self
    }

    /// Add a method overload. Registering the same name again adds another overload.
    pub fn method<F>(mut self, name: impl Into<String>, params: Vec<ParamInfo>, returns: HostType, call: F) -> Self
    where
        F: Fn(&T, Vec<HostValue>) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.class.methods.push(ClassMethod {
            name: name.into(),
            info: MethodInfo { params, returns },
            call: Box::new(call),
        });
        self
    }

    /// Read-only integer indexer.
    pub fn indexer<G>(mut self, value_type: HostType, get: G) -> Self
    where
        G: Fn(&T, u32) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.class.indexer = Some(ClassIndexer {
            value_type,
            get: Box::new(get),
            set: None,
        });
        self
    }

    /// Read-write integer indexer; the setter receives a value coerced to `value_type`.
    pub fn writable_indexer<G, S>(mut self, value_type: HostType, get: G, set: S) -> Self
    where
        G: Fn(&T, u32) -> HostResult<HostValue> + Send + Sync + 'static,
        S: Fn(&T, u32, HostValue) -> HostResult<()> + Send + Sync + 'static,
    {
        self.class.indexer = Some(ClassIndexer {
            value_type,
            get: Box::new(get),
            set: Some(Box::new(set)),
        });
        self
    }

    /// Make instances dictionary-like.
    pub fn keyed<K, G, S, R>(mut self, keys: K, get: G, set: S, remove: R) -> Self
    where
        K: Fn(&T) -> Vec<String> + Send + Sync + 'static,
        G: Fn(&T, &str) -> Option<HostValue> + Send + Sync + 'static,
        S: Fn(&T, &str, HostValue) + Send + Sync + 'static,
        R: Fn(&T, &str) + Send + Sync + 'static,
    {
        self.class.keyed = Some(ClassKeyed {
            keys: Box::new(keys),
            get: Box::new(get),
            set: Box::new(set),
            remove: Box::new(remove),
        });
        self
    }

    pub fn to_json<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.class.to_json = Some(Box::new(f));
        self
    }

    pub fn iterate<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Vec<HostValue> + Send + Sync + 'static,
    {
        self.class.iterate = Some(Box::new(f));
        self
    }

    pub fn display<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.class.display = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Arc<HostClass<T>> {
        Arc::new(self.class)
    }
}

/// A value of `T` exposed through its [`HostClass`].
pub struct Instance<T> {
    class: Arc<HostClass<T>>,
    value: T,
}

impl<T> Instance<T> {
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: Send + Sync + 'static> HostObject for Instance<T> {
    fn type_name(&self) -> &str {
        &self.class.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        self.class.properties.iter().map(|p| p.info.clone()).collect()
    }

    fn get_property(&self, name: &str) -> HostResult<Option<HostValue>> {
        match self.class.property(name) {
            Some(p) => (p.get)(&self.value).map(Some),
            None => Ok(None),
        }
    }

    fn set_property(&self, name: &str, value: HostValue) -> HostResult<bool> {
        match self.class.property(name).and_then(|p| p.set.as_ref()) {
            Some(set) => set(&self.value, value).map(|_| true),
            None => Ok(false),
        }
    }

    fn methods(&self, name: &str) -> Vec<MethodInfo> {
        self.class
            .methods
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.info.clone())
            .collect()
    }

    fn invoke(&self, name: &str, overload: usize, args: Vec<HostValue>) -> HostResult<HostValue> {
        match self.class.methods.iter().filter(|m| m.name == name).nth(overload) {
            Some(m) => (m.call)(&self.value, args),
            None => Err(HostError::MemberNotFound(name.to_string())),
        }
    }

    fn indexer_type(&self) -> Option<HostType> {
        self.class.indexer.as_ref().map(|i| i.value_type.clone())
    }

    fn index_get(&self, index: u32) -> HostResult<HostValue> {
        match &self.class.indexer {
            Some(i) => (i.get)(&self.value, index),
            None => Err(HostError::MemberNotFound("indexer".into())),
        }
    }

    fn index_set(&self, index: u32, value: HostValue) -> HostResult<()> {
        match self.class.indexer.as_ref().and_then(|i| i.set.as_ref()) {
            Some(set) => set(&self.value, index, value),
            None => Err(HostError::MemberNotFound("indexer".into())),
        }
    }

    fn keys(&self) -> Option<Vec<String>> {
        self.class.keyed.as_ref().map(|k| (k.keys)(&self.value))
    }

    fn get_key(&self, key: &str) -> Option<HostValue> {
        self.class.keyed.as_ref().and_then(|k| (k.get)(&self.value, key))
    }

    fn set_key(&self, key: &str, value: HostValue) -> bool {
        match &self.class.keyed {
            Some(k) => {
                (k.set)(&self.value, key, value);
                true
            }
            None => false,
        }
    }

    fn remove_key(&self, key: &str) -> bool {
        match &self.class.keyed {
            Some(k) => {
                (k.remove)(&self.value, key);
                true
            }
            None => false,
        }
    }

    fn to_json(&self) -> Option<HostValue> {
        self.class
            .to_json
            .as_ref()
            .and_then(|f| f(&self.value).ok())
    }

    fn iterate(&self) -> Option<Vec<HostValue>> {
        self.class.iterate.as_ref().map(|f| f(&self.value))
    }

    fn display(&self) -> String {
        match &self.class.display {
            Some(f) => f(&self.value),
            None => self.class.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Person {
        name: Mutex<String>,
        secret: Mutex<String>,
    }

    fn person_class() -> Arc<HostClass<Person>> {
        HostClass::<Person>::builder("Person")
            .writable_property(
                "Name",
                HostType::String,
                |p| Ok(p.name.lock().clone().into()),
                |p, v| {
                    *p.name.lock() = v.as_str().unwrap_or_default().to_string();
                    Ok(())
                },
            )
            .property("Secret", HostType::String, |p| Ok(p.secret.lock().clone().into()))
            .hide("Secret")
            .method("Greet", vec![], HostType::String, |p, _| {
                Ok(format!("Hello, {}", p.name.lock()).into())
            })
            .method(
                "Greet",
                vec![ParamInfo::new("greeting", HostType::String)],
                HostType::String,
                |p, args| {
                    let greeting = args[0].as_str().unwrap_or_default().to_string();
                    Ok(format!("{greeting}, {}", p.name.lock()).into())
                },
            )
            .display(|p| format!("Person({})", p.name.lock()))
            .build()
    }

    #[test]
    fn test_properties_and_visibility() {
        let person = person_class().instantiate(Person::default());
        let props = person.properties();
        assert_eq!(props.len(), 2);
        assert!(props[0].writable && props[0].enumerable);
        assert!(!props[1].writable && !props[1].enumerable);

        assert!(person.set_property("Name", "Ada".into()).unwrap());
        assert!(!person.set_property("Secret", "x".into()).unwrap());
        assert_eq!(person.get_property("Name").unwrap(), Some(HostValue::from("Ada")));
        assert_eq!(person.get_property("Missing").unwrap(), None);
        assert_eq!(person.display(), "Person(Ada)");
    }

    #[test]
    fn test_method_overloads() {
        let person = person_class().instantiate(Person::default());
        person.set_property("Name", "Bob".into()).unwrap();

        let overloads = person.methods("Greet");
        assert_eq!(overloads.len(), 2);
        assert_eq!(overloads[1].params.len(), 1);

        assert_eq!(person.invoke("Greet", 0, vec![]).unwrap(), HostValue::from("Hello, Bob"));
        assert_eq!(person.invoke("Greet", 1, vec!["Hi".into()]).unwrap(), HostValue::from("Hi, Bob"));
        assert!(matches!(
            person.invoke("Greet", 2, vec![]),
            Err(HostError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_keyed_access() {
        #[derive(Default)]
        struct Bag(Mutex<HashMap<String, HostValue>>);

        let class = HostClass::<Bag>::builder("Bag")
            .keyed(
                |b| b.0.lock().keys().cloned().collect(),
                |b, k| b.0.lock().get(k).cloned(),
                |b, k, v| {
                    b.0.lock().insert(k.to_string(), v);
                },
                |b, k| {
                    b.0.lock().remove(k);
                },
            )
            .build();
        let bag = class.instantiate(Bag::default());

        assert!(bag.set_key("foo", 42.into()));
        assert_eq!(bag.get_key("foo"), Some(HostValue::Int(42)));
        assert_eq!(bag.keys().unwrap(), vec!["foo".to_string()]);
        assert!(bag.remove_key("foo"));
        assert!(bag.keys().unwrap().is_empty());
    }

    #[test]
    fn test_downcast_through_host_value() {
        let person = person_class().instantiate(Person::default());
        let value = HostValue::Object(person.clone());
        let back = value.downcast_object::<Instance<Person>>().unwrap();
        back.value().name.lock().push_str("Eve");
        assert_eq!(person.value().name.lock().as_str(), "Eve");
    }
}
