//! Host type descriptors and coercion between primitive representations
//!
//! [`HostType`] is what reflection reports for a parameter or property, and
//! what [`coerce`] converts a loosely typed script argument into.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::error::{HostError, HostResult};
use crate::value::{Decimal, HostCallable, HostValue};

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// A named enumeration type; ordinals are the variant positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: Arc<str>,
    variants: Arc<[String]>,
}

impl EnumType {
    pub fn new<I, S>(name: &str, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: Arc::from(name),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Look up a variant by its symbolic name.
    pub fn value_of(&self, name: &str) -> Option<EnumValue> {
        self.variants
            .iter()
            .position(|v| v == name)
            .map(|ordinal| EnumValue {
                ty: self.clone(),
                ordinal,
            })
    }

    /// Look up a variant by ordinal.
    pub fn from_ordinal(&self, ordinal: usize) -> Option<EnumValue> {
        (ordinal < self.variants.len()).then(|| EnumValue {
            ty: self.clone(),
            ordinal,
        })
    }
}

/// One variant of an [`EnumType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    ty: EnumType,
    ordinal: usize,
}

impl EnumValue {
    pub fn enum_type(&self) -> &EnumType {
        &self.ty
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.ty.variants[self.ordinal]
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host Types
// ─────────────────────────────────────────────────────────────────────────────

/// Declared type of a host parameter, property or indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostType {
    Null,
    Bool,
    Byte,
    Short,
    Int,
    UInt,
    Long,
    Float,
    Double,
    Decimal,
    Char,
    String,
    Enum(EnumType),
    DateTime,
    Regex,
    Array,
    Dictionary,
    /// Host delegate
    Callable,
    Exception,
    /// Arbitrary reflected object, identified by its type name
    Object(String),
    /// Function living in a script context
    Function,
    /// Accepts any value unchanged
    Any,
}

impl HostType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            HostType::Byte
                | HostType::Short
                | HostType::Int
                | HostType::UInt
                | HostType::Long
                | HostType::Float
                | HostType::Double
                | HostType::Decimal
        )
    }

    /// Whether `null` is a legal value of this type.
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            HostType::Null
                | HostType::String
                | HostType::Regex
                | HostType::Array
                | HostType::Dictionary
                | HostType::Callable
                | HostType::Exception
                | HostType::Object(_)
                | HostType::Function
                | HostType::Any
        )
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Null => f.write_str("null"),
            HostType::Bool => f.write_str("bool"),
            HostType::Byte => f.write_str("u8"),
            HostType::Short => f.write_str("i16"),
            HostType::Int => f.write_str("i32"),
            HostType::UInt => f.write_str("u32"),
            HostType::Long => f.write_str("i64"),
            HostType::Float => f.write_str("f32"),
            HostType::Double => f.write_str("f64"),
            HostType::Decimal => f.write_str("decimal"),
            HostType::Char => f.write_str("char"),
            HostType::String => f.write_str("string"),
            HostType::Enum(e) => f.write_str(e.name()),
            HostType::DateTime => f.write_str("datetime"),
            HostType::Regex => f.write_str("regex"),
            HostType::Array => f.write_str("array"),
            HostType::Dictionary => f.write_str("dictionary"),
            HostType::Callable => f.write_str("callable"),
            HostType::Exception => f.write_str("exception"),
            HostType::Object(name) => f.write_str(name),
            HostType::Function => f.write_str("function"),
            HostType::Any => f.write_str("any"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coercion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert `value` to the declared `target` type.
///
/// Values already of the target type pass through untouched. Numbers widen
/// and narrow with range checks (fractions round half to even), strings parse
/// into numbers, booleans, chars and enum variants, and numbers select enum
/// variants by ordinal. Anything else fails with [`HostError::Coercion`].
pub fn coerce(value: HostValue, target: &HostType) -> HostResult<HostValue> {
    if *target == HostType::Any || value.host_type() == *target {
        return Ok(value);
    }

    let mismatch = |value: &HostValue| HostError::Coercion {
        from: value.host_type().to_string(),
        to: target.to_string(),
    };

    if value.is_null() {
        return if target.is_nullable() {
            Ok(HostValue::Null)
        } else {
            Err(mismatch(&value))
        };
    }

    let coerced = match target {
        t if t.is_numeric() => numeric_source(&value).and_then(|n| n.into_type(t)),
        HostType::Bool => match &value {
            HostValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(HostValue::Bool(true)),
                "false" => Some(HostValue::Bool(false)),
                _ => None,
            },
            other => numeric_source(other).map(|n| HostValue::Bool(n.as_f64() != 0.0)),
        },
        HostType::Char => match &value {
            HostValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(HostValue::Char(c)),
                    _ => None,
                }
            }
            other => numeric_source(other)
                .and_then(|n| n.as_integer())
                .and_then(|i| u32::try_from(i).ok())
                .and_then(char::from_u32)
                .map(HostValue::Char),
        },
        HostType::String => match &value {
            HostValue::Char(c) => Some(HostValue::String(c.to_string())),
            HostValue::Enum(e) => Some(HostValue::String(e.name().to_string())),
            _ => None,
        },
        HostType::Enum(ty) => {
            let variant = match &value {
                HostValue::String(s) => ty.value_of(s.trim()).or_else(|| {
                    s.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| ty.from_ordinal(i))
                }),
                other => numeric_source(other)
                    .and_then(|n| n.as_integer())
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| ty.from_ordinal(i)),
            };
            variant.map(HostValue::Enum)
        }
        HostType::DateTime => match &value {
            HostValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| HostValue::DateTime(dt.with_timezone(&Local))),
            _ => None,
        },
        HostType::Callable => match &value {
            HostValue::Function(f) => Some(HostValue::Callable(HostCallable::from_script(f.clone()))),
            _ => None,
        },
        _ => None,
    };

    coerced.ok_or_else(|| mismatch(&value))
}

/// Intermediate numeric form used while coercing.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Integer(i128),
    Real(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Real(f) => f,
        }
    }

    fn as_integer(self) -> Option<i128> {
        match self {
            Numeric::Integer(i) => Some(i),
            Numeric::Real(f) if f.is_finite() => Some(f.round_ties_even() as i128),
            Numeric::Real(_) => None,
        }
    }

    fn into_type(self, target: &HostType) -> Option<HostValue> {
        match target {
            HostType::Byte => self.as_integer().and_then(|i| u8::try_from(i).ok()).map(HostValue::Byte),
            HostType::Short => self.as_integer().and_then(|i| i16::try_from(i).ok()).map(HostValue::Short),
            HostType::Int => self.as_integer().and_then(|i| i32::try_from(i).ok()).map(HostValue::Int),
            HostType::UInt => self.as_integer().and_then(|i| u32::try_from(i).ok()).map(HostValue::UInt),
            HostType::Long => self.as_integer().and_then(|i| i64::try_from(i).ok()).map(HostValue::Long),
            HostType::Float => Some(HostValue::Float(self.as_f64() as f32)),
            HostType::Double => Some(HostValue::Double(self.as_f64())),
            HostType::Decimal => match self {
                Numeric::Integer(i) => Some(HostValue::Decimal(Decimal::new(i, 0))),
                Numeric::Real(f) => Decimal::from_f64(f).map(HostValue::Decimal),
            },
            _ => None,
        }
    }
}

fn numeric_source(value: &HostValue) -> Option<Numeric> {
    match value {
        HostValue::Bool(b) => Some(Numeric::Integer(*b as i128)),
        HostValue::Byte(v) => Some(Numeric::Integer(*v as i128)),
        HostValue::Short(v) => Some(Numeric::Integer(*v as i128)),
        HostValue::Int(v) => Some(Numeric::Integer(*v as i128)),
        HostValue::UInt(v) => Some(Numeric::Integer(*v as i128)),
        HostValue::Long(v) => Some(Numeric::Integer(*v as i128)),
        HostValue::Float(v) => Some(Numeric::Real(*v as f64)),
        HostValue::Double(v) => Some(Numeric::Real(*v)),
        HostValue::Decimal(d) => Some(match d.to_i128() {
            Some(i) => Numeric::Integer(i),
            None => Numeric::Real(d.to_f64()),
        }),
        HostValue::Enum(e) => Some(Numeric::Integer(e.ordinal() as i128)),
        HostValue::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .map(Numeric::Integer)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Numeric::Real))
        }
        _ => None,
    }
}
