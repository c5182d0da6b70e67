//! Universal host value that flows between Rust code and script contexts
//!
//! Composite values ([`HostArray`], [`HostDict`]) are shared references: a
//! script object graph converted into the host keeps its identity, so a
//! self-referencing script object becomes a dictionary that contains itself.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;

use crate::error::{HostError, HostResult};
use crate::reflect::{HostObject, ParamInfo};
use crate::types::{EnumValue, HostType};

/// Reference to a reflected host object.
pub type HostObjectRef = Arc<dyn HostObject>;

/// Reference to a function owned by a script context.
pub type ScriptFunctionRef = Arc<dyn ScriptCallable>;

// ─────────────────────────────────────────────────────────────────────────────
// Universal Host Value
// ─────────────────────────────────────────────────────────────────────────────

/// A host-side value.
///
/// Integer widths are kept distinct so reflection can match declared
/// parameter types exactly; see [`HostValue::host_type`].
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    UInt(u32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    Enum(EnumValue),
    DateTime(DateTime<Local>),
    Regex(HostRegex),
    Array(HostArray),
    Dictionary(HostDict),
    /// Host delegate callable from script
    Callable(HostCallable),
    Exception(HostException),
    Object(HostObjectRef),
    /// Script function callable from the host
    Function(ScriptFunctionRef),
}

impl HostValue {
    /// Runtime type of this value, as compared against declared parameter types.
    pub fn host_type(&self) -> HostType {
        match self {
            HostValue::Null => HostType::Null,
            HostValue::Bool(_) => HostType::Bool,
            HostValue::Byte(_) => HostType::Byte,
            HostValue::Short(_) => HostType::Short,
            HostValue::Int(_) => HostType::Int,
            HostValue::UInt(_) => HostType::UInt,
            HostValue::Long(_) => HostType::Long,
            HostValue::Float(_) => HostType::Float,
            HostValue::Double(_) => HostType::Double,
            HostValue::Decimal(_) => HostType::Decimal,
            HostValue::Char(_) => HostType::Char,
            HostValue::String(_) => HostType::String,
            HostValue::Enum(e) => HostType::Enum(e.enum_type().clone()),
            HostValue::DateTime(_) => HostType::DateTime,
            HostValue::Regex(_) => HostType::Regex,
            HostValue::Array(_) => HostType::Array,
            HostValue::Dictionary(_) => HostType::Dictionary,
            HostValue::Callable(_) => HostType::Callable,
            HostValue::Exception(_) => HostType::Exception,
            HostValue::Object(o) => HostType::Object(o.type_name().to_string()),
            HostValue::Function(_) => HostType::Function,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 from any integer variant (also from an integral float)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Byte(v) => Some(*v as i64),
            HostValue::Short(v) => Some(*v as i64),
            HostValue::Int(v) => Some(*v as i64),
            HostValue::UInt(v) => Some(*v as i64),
            HostValue::Long(v) => Some(*v),
            HostValue::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as f64 from any numeric variant
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f as f64),
            HostValue::Double(f) => Some(*f),
            HostValue::Decimal(d) => Some(d.to_f64()),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HostDict> {
        match self {
            HostValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Local>> {
        match self {
            HostValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<&HostRegex> {
        match self {
            HostValue::Regex(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_exception(&self) -> Option<&HostException> {
        match self {
            HostValue::Exception(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&HostCallable> {
        match self {
            HostValue::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ScriptFunctionRef> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcast a wrapped host object to its concrete type.
    pub fn downcast_object<T: HostObject>(&self) -> Option<&T> {
        self.as_object()
            .and_then(|o| o.as_any().downcast_ref::<T>())
    }

    /// Look up a key of a dictionary value.
    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Look up an element of an array value.
    pub fn get_index(&self, index: usize) -> Option<HostValue> {
        self.as_array().and_then(|a| a.get(index))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Containers
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list shared by reference.
#[derive(Clone, Default)]
pub struct HostArray(Arc<RwLock<Vec<HostValue>>>);

impl HostArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<HostValue>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.0.read().get(index).cloned()
    }

    pub fn push(&self, value: HostValue) {
        self.0.write().push(value);
    }

    /// Snapshot of the current elements
    pub fn to_vec(&self) -> Vec<HostValue> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &HostArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the underlying storage
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl FromIterator<HostValue> for HostArray {
    fn from_iter<I: IntoIterator<Item = HostValue>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// String-keyed mapping shared by reference.
#[derive(Clone, Default)]
pub struct HostDict(Arc<RwLock<HashMap<String, HostValue>>>);

impl HostDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.0.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<HostValue>) -> Option<HostValue> {
        self.0.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<HostValue> {
        self.0.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    /// Snapshot of the current entries, in iteration order
    pub fn entries(&self) -> Vec<(String, HostValue)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &HostDict) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the underlying storage
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: Into<String>, V: Into<HostValue>> FromIterator<(K, V)> for HostDict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Arc::new(RwLock::new(map)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decimal
// ─────────────────────────────────────────────────────────────────────────────

/// Base-10 fixed point number: `mantissa * 10^-scale`, kept normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub const MAX_SCALE: u32 = 28;

    pub fn new(mut mantissa: i128, mut scale: u32) -> Self {
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        value.to_string().parse().ok()
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// The value as an integer, when it has no fractional part.
    pub fn to_i128(&self) -> Option<i128> {
        (self.scale == 0).then_some(self.mantissa)
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl FromStr for Decimal {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HostError::Coercion {
            from: "string".into(),
            to: "decimal".into(),
        };
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let fraction = &fraction[..fraction.len().min(Self::MAX_SCALE as usize)];
        let mut mantissa: i128 = 0;
        for c in whole.chars().chain(fraction.chars()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(c.to_digit(10)?)))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(Decimal::new(mantissa, fraction.len() as u32))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
        } else {
            digits
        };
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(f, "{sign}{whole}.{fraction}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Regular Expressions
// ─────────────────────────────────────────────────────────────────────────────

/// Options of a host regular expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    pub ignore_case: bool,
    pub multiline: bool,
    /// Pattern uses ECMAScript-compatible syntax and may cross into script
    pub ecma_script: bool,
}

/// A regular expression as pattern plus flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRegex {
    pattern: String,
    flags: RegexFlags,
}

impl HostRegex {
    pub fn new(pattern: impl Into<String>, flags: RegexFlags) -> Self {
        Self {
            pattern: pattern.into(),
            flags,
        }
    }

    /// A regex whose syntax is ECMAScript-compatible.
    pub fn ecma_script(pattern: impl Into<String>) -> Self {
        Self::new(
            pattern,
            RegexFlags {
                ecma_script: true,
                ..RegexFlags::default()
            },
        )
    }

    pub fn ignore_case(mut self) -> Self {
        self.flags.ignore_case = true;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.flags.multiline = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> RegexFlags {
        self.flags
    }

    /// Script flag string (`i`, `m`) for these options.
    pub fn script_flags(&self) -> String {
        let mut flags = String::new();
        if self.flags.ignore_case {
            flags.push('i');
        }
        if self.flags.multiline {
            flags.push('m');
        }
        flags
    }

    /// Compile for host-side matching.
    pub fn compile(&self) -> Result<regex::Regex, regex::Error> {
        regex::RegexBuilder::new(&self.pattern)
            .case_insensitive(self.flags.ignore_case)
            .multi_line(self.flags.multiline)
            .build()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exceptions
// ─────────────────────────────────────────────────────────────────────────────

struct ExceptionInner {
    type_name: String,
    message: String,
    inner: Option<HostException>,
}

/// A host exception. Clones share identity, so an exception thrown through
/// script and caught again on the host is the same exception.
#[derive(Clone)]
pub struct HostException(Arc<ExceptionInner>);

impl HostException {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_type("Exception", message)
    }

    pub fn with_type(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self(Arc::new(ExceptionInner {
            type_name: type_name.into(),
            message: message.into(),
            inner: None,
        }))
    }

    pub fn with_inner(
        type_name: impl Into<String>,
        message: impl Into<String>,
        inner: HostException,
    ) -> Self {
        Self(Arc::new(ExceptionInner {
            type_name: type_name.into(),
            message: message.into(),
            inner: Some(inner),
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn inner(&self) -> Option<&HostException> {
        self.0.inner.as_ref()
    }

    pub fn ptr_eq(&self, other: &HostException) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostException")
            .field("type_name", &self.0.type_name)
            .field("message", &self.0.message)
            .field("inner", &self.0.inner)
            .finish()
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.message)
    }
}

impl std::error::Error for HostException {}

// ─────────────────────────────────────────────────────────────────────────────
// Callables
// ─────────────────────────────────────────────────────────────────────────────

type CallableFn = dyn Fn(Vec<HostValue>) -> HostResult<HostValue> + Send + Sync;

struct CallableInner {
    params: Vec<ParamInfo>,
    variadic: bool,
    func: Box<CallableFn>,
}

/// A host delegate with a fixed parameter list.
#[derive(Clone)]
pub struct HostCallable(Arc<CallableInner>);

impl HostCallable {
    pub fn new<F>(params: Vec<ParamInfo>, func: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        Self(Arc::new(CallableInner {
            params,
            variadic: false,
            func: Box::new(func),
        }))
    }

    /// A delegate that receives every argument as supplied.
    pub fn variadic<F>(func: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        Self(Arc::new(CallableInner {
            params: Vec::new(),
            variadic: true,
            func: Box::new(func),
        }))
    }

    /// Adapt a script function to a host delegate.
    pub fn from_script(function: ScriptFunctionRef) -> Self {
        Self::variadic(move |args| function.call(args))
    }

    pub fn params(&self) -> &[ParamInfo] {
        &self.0.params
    }

    pub fn is_variadic(&self) -> bool {
        self.0.variadic
    }

    pub fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        (self.0.func)(args)
    }

    pub fn ptr_eq(&self, other: &HostCallable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the underlying delegate
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallable")
            .field("params", &self.0.params)
            .field("variadic", &self.0.variadic)
            .finish_non_exhaustive()
    }
}

/// A function that lives inside a script context.
///
/// Implementations hold only a weak reference to their context and fail with
/// [`HostError::InvalidHandle`] once it is gone.
pub trait ScriptCallable: Send + Sync {
    fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue>;

    /// Whether the owning context is alive and the handle not released.
    fn is_valid(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

// ─────────────────────────────────────────────────────────────────────────────
// Equality & Debug
// ─────────────────────────────────────────────────────────────────────────────

impl PartialEq for HostValue {
    /// Primitives compare by value, containers by content (short-circuiting on
    /// shared identity), everything else by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Byte(a), HostValue::Byte(b)) => a == b,
            (HostValue::Short(a), HostValue::Short(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::UInt(a), HostValue::UInt(b)) => a == b,
            (HostValue::Long(a), HostValue::Long(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Double(a), HostValue::Double(b)) => a == b,
            (HostValue::Decimal(a), HostValue::Decimal(b)) => a == b,
            (HostValue::Char(a), HostValue::Char(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Enum(a), HostValue::Enum(b)) => a == b,
            (HostValue::DateTime(a), HostValue::DateTime(b)) => a == b,
            (HostValue::Regex(a), HostValue::Regex(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => {
                a.ptr_eq(b) || *a.0.read() == *b.0.read()
            }
            (HostValue::Dictionary(a), HostValue::Dictionary(b)) => {
                a.ptr_eq(b) || *a.0.read() == *b.0.read()
            }
            (HostValue::Callable(a), HostValue::Callable(b)) => a.ptr_eq(b),
            (HostValue::Exception(a), HostValue::Exception(b)) => a.ptr_eq(b),
            (HostValue::Object(a), HostValue::Object(b)) => Arc::ptr_eq(a, b),
            (HostValue::Function(a), HostValue::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

thread_local! {
    static FORMATTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Format a container once per path so cyclic graphs terminate.
fn fmt_guarded(
    id: usize,
    f: &mut fmt::Formatter<'_>,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if FORMATTING.with(|stack| stack.borrow().contains(&id)) {
        return f.write_str("[Circular]");
    }
    FORMATTING.with(|stack| stack.borrow_mut().push(id));
    let result = body(f);
    FORMATTING.with(|stack| stack.borrow_mut().pop());
    result
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_guarded(self.id(), f, |f| f.debug_list().entries(self.to_vec()).finish())
    }
}

impl fmt::Debug for HostDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_guarded(self.id(), f, |f| f.debug_map().entries(self.entries()).finish())
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            HostValue::Byte(v) => f.debug_tuple("Byte").field(v).finish(),
            HostValue::Short(v) => f.debug_tuple("Short").field(v).finish(),
            HostValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            HostValue::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            HostValue::Long(v) => f.debug_tuple("Long").field(v).finish(),
            HostValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            HostValue::Double(v) => f.debug_tuple("Double").field(v).finish(),
            HostValue::Decimal(v) => f.debug_tuple("Decimal").field(&v.to_string()).finish(),
            HostValue::Char(v) => f.debug_tuple("Char").field(v).finish(),
            HostValue::String(v) => f.debug_tuple("String").field(v).finish(),
            HostValue::Enum(v) => f.debug_tuple("Enum").field(&v.name()).finish(),
            HostValue::DateTime(v) => f.debug_tuple("DateTime").field(v).finish(),
            HostValue::Regex(v) => f.debug_tuple("Regex").field(v).finish(),
            HostValue::Array(v) => f.debug_tuple("Array").field(v).finish(),
            HostValue::Dictionary(v) => f.debug_tuple("Dictionary").field(v).finish(),
            HostValue::Callable(v) => f.debug_tuple("Callable").field(v).finish(),
            HostValue::Exception(v) => f.debug_tuple("Exception").field(v).finish(),
            HostValue::Object(o) => f.debug_tuple("Object").field(&o.type_name()).finish(),
            HostValue::Function(_) => f.write_str("Function"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    char => Char,
    String => String,
    EnumValue => Enum,
    DateTime<Local> => DateTime,
    HostRegex => Regex,
    HostArray => Array,
    HostDict => Dictionary,
    HostCallable => Callable,
    HostException => Exception,
    HostObjectRef => Object,
    ScriptFunctionRef => Function,
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for HostValue {
    fn from(v: DateTime<Utc>) -> Self {
        HostValue::DateTime(v.with_timezone(&Local))
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(v: Vec<T>) -> Self {
        HostValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl From<HashMap<String, HostValue>> for HostValue {
    fn from(map: HashMap<String, HostValue>) -> Self {
        HostValue::Dictionary(map.into_iter().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serde_json::Value Interop
// ─────────────────────────────────────────────────────────────────────────────

impl From<serde_json::Value> for HostValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => i32::try_from(i)
                    .map(HostValue::Int)
                    .unwrap_or(HostValue::Long(i)),
                None => n.as_f64().map(HostValue::Double).unwrap_or_default(),
            },
            serde_json::Value::String(s) => HostValue::String(s),
            serde_json::Value::Array(arr) => {
                HostValue::Array(arr.into_iter().map(HostValue::from).collect())
            }
            serde_json::Value::Object(obj) => HostValue::Dictionary(
                obj.into_iter().map(|(k, v)| (k, HostValue::from(v))).collect(),
            ),
        }
    }
}

impl HostValue {
    /// Render as JSON. Cycles render as `null`; opaque values render through
    /// their `to_json` hook or display string.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(&self, seen: &mut Vec<usize>) -> serde_json::Value {
        use serde_json::Value as Json;

        let number = |f: f64| {
            serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null)
        };
        match self {
            HostValue::Null => Json::Null,
            HostValue::Bool(b) => Json::Bool(*b),
            HostValue::Byte(v) => Json::from(*v),
            HostValue::Short(v) => Json::from(*v),
            HostValue::Int(v) => Json::from(*v),
            HostValue::UInt(v) => Json::from(*v),
            HostValue::Long(v) => Json::from(*v),
            HostValue::Float(v) => number(*v as f64),
            HostValue::Double(v) => number(*v),
            HostValue::Decimal(d) => number(d.to_f64()),
            HostValue::Char(c) => Json::String(c.to_string()),
            HostValue::String(s) => Json::String(s.clone()),
            HostValue::Enum(e) => Json::String(e.name().to_string()),
            HostValue::DateTime(dt) => Json::String(dt.to_rfc3339()),
            HostValue::Regex(r) => Json::String(format!("/{}/{}", r.pattern(), r.script_flags())),
            HostValue::Array(a) => {
                if seen.contains(&a.id()) {
                    return Json::Null;
                }
                seen.push(a.id());
                let items = a.to_vec().iter().map(|v| v.to_json_inner(seen)).collect();
                seen.pop();
                Json::Array(items)
            }
            HostValue::Dictionary(d) => {
                if seen.contains(&d.id()) {
                    return Json::Null;
                }
                seen.push(d.id());
                let map = d
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(seen)))
                    .collect();
                seen.pop();
                Json::Object(map)
            }
            HostValue::Exception(e) => Json::String(e.message().to_string()),
            HostValue::Object(o) => match o.to_json() {
                Some(v) => v.to_json_inner(seen),
                None => Json::String(o.display()),
            },
            HostValue::Callable(_) | HostValue::Function(_) => Json::Null,
        }
    }
}
