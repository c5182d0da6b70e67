//! Reflection over host objects
//!
//! The script runtime never knows concrete Rust types. It sees host objects
//! through [`HostObject`]: declared properties, overloaded methods, an
//! optional integer indexer and optional dictionary-like keyed access.

use std::any::Any;

use crate::error::{HostError, HostResult};
use crate::types::HostType;
use crate::value::HostValue;

/// A declared public instance property.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: HostType,
    pub writable: bool,
    /// Hidden properties are readable but skipped by enumeration
    pub enumerable: bool,
}

/// A declared method parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub ty: HostType,
    /// Default bound when the argument is absent; `Some` makes the parameter optional
    pub default: Option<HostValue>,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, ty: HostType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: HostType, default: impl Into<HostValue>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default.into()),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// One overload of a method.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub params: Vec<ParamInfo>,
    pub returns: HostType,
}

/// A host object as seen through reflection.
///
/// Every member has a default that reports "not present", so implementors
/// only provide what their type actually exposes. Objects are shared between
/// threads, so mutation goes through interior mutability.
pub trait HostObject: Any + Send + Sync {
    /// Runtime type name
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Declared public instance properties, in declaration order
    fn properties(&self) -> Vec<PropertyInfo> {
        Vec::new()
    }

    /// Read a property; `Ok(None)` when no such property is declared.
    fn get_property(&self, _name: &str) -> HostResult<Option<HostValue>> {
        Ok(None)
    }

    /// Write a property; `Ok(false)` when no settable property of that name exists.
    /// The value has already been coerced to the declared type.
    fn set_property(&self, _name: &str, _value: HostValue) -> HostResult<bool> {
        Ok(false)
    }

    /// Overloads of the named method, in declaration order.
    fn methods(&self, _name: &str) -> Vec<MethodInfo> {
        Vec::new()
    }

    /// Invoke one overload (index into [`HostObject::methods`]) with bound arguments.
    fn invoke(&self, name: &str, _overload: usize, _args: Vec<HostValue>) -> HostResult<HostValue> {
        Err(HostError::MemberNotFound(name.to_string()))
    }

    /// Element type of the integer indexer, if the object has one.
    fn indexer_type(&self) -> Option<HostType> {
        None
    }

    fn index_get(&self, _index: u32) -> HostResult<HostValue> {
        Err(HostError::MemberNotFound("indexer".into()))
    }

    fn index_set(&self, _index: u32, _value: HostValue) -> HostResult<()> {
        Err(HostError::MemberNotFound("indexer".into()))
    }

    /// Keys of a dictionary-like object; `None` when the object is not dictionary-like.
    fn keys(&self) -> Option<Vec<String>> {
        None
    }

    fn get_key(&self, _key: &str) -> Option<HostValue> {
        None
    }

    /// Store a key; returns false when the object is not dictionary-like.
    fn set_key(&self, _key: &str, _value: HostValue) -> bool {
        false
    }

    fn remove_key(&self, _key: &str) -> bool {
        false
    }

    /// Replacement value used when the object is serialized to JSON.
    fn to_json(&self) -> Option<HostValue> {
        None
    }

    /// Items of an enumerable object, snapshotted per iteration.
    fn iterate(&self) -> Option<Vec<HostValue>> {
        None
    }

    /// Generic to-string conversion
    fn display(&self) -> String {
        self.type_name().to_string()
    }
}
