//! Bridge Types - host-side value model shared by the script runtime and the debugger
//!
//! Script values never leave the engine. Everything the host sees is a
//! [`HostValue`], described by a [`HostType`] and, for arbitrary objects,
//! reflected through the [`HostObject`] trait.

pub mod class;
pub mod error;
pub mod reflect;
pub mod types;
pub mod value;

pub use class::{ClassBuilder, HostClass, Instance};
pub use error::{HostError, HostResult};
pub use reflect::{HostObject, MethodInfo, ParamInfo, PropertyInfo};
pub use types::{EnumType, EnumValue, HostType, coerce};
pub use value::{
    Decimal, HostArray, HostCallable, HostDict, HostException, HostObjectRef, HostRegex,
    HostValue, RegexFlags, ScriptCallable, ScriptFunctionRef,
};
