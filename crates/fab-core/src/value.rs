//! Values exchanged with a story engine.
//!
//! [`Value`] is everything an engine can hold in a variable, including
//! composites with no natural host representation. [`Primitive`] is the
//! subset that crosses the controller boundary; [`Value::to_primitive`] is the
//! deliberate lossy projection between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value stored in or produced by a story engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Engine-internal list of item names. Opaque to hosts.
    List {
        /// Item names in the list.
        list: Vec<String>,
    },
}

/// A primitive-shaped value: the only kind of value hosts see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl Value {
    /// Project onto the host-visible primitives. Lists have no host
    /// representation and become `None`.
    pub fn to_primitive(&self) -> Option<Primitive> {
        match self {
            Self::Bool(b) => Some(Primitive::Bool(*b)),
            Self::Int(i) => Some(Primitive::Int(*i)),
            Self::Float(f) => Some(Primitive::Float(*f)),
            Self::Str(s) => Some(Primitive::Str(s.clone())),
            Self::List { .. } => None,
        }
    }

    /// Short name of the value's kind, used in fault messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List { .. } => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List { list } => f.write_str(&list.join(", ")),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Value::from(self.clone()), f)
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Bool(b) => Self::Bool(b),
            Primitive::Int(i) => Self::Int(i),
            Primitive::Float(f) => Self::Float(f),
            Primitive::Str(s) => Self::Str(s),
        }
    }
}

macro_rules! primitive_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Primitive {
                fn from(v: $t) -> Self {
                    Self::$variant(v.into())
                }
            }

            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

primitive_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => Str,
    &str => Str,
}

/// Conversion from an engine value into a native argument type.
///
/// Used by typed external function bindings; a `None` result surfaces as an
/// engine fault at call time.
pub trait FromValue: Sized {
    /// Convert, or `None` if the value has the wrong shape.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for Primitive {
    fn from_value(value: &Value) -> Option<Self> {
        value.to_primitive()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Conversion from a native return type into an optional engine value.
pub trait IntoValue {
    /// Convert; `None` means "no return value".
    fn into_value(self) -> Option<Value>;
}

impl IntoValue for () {
    fn into_value(self) -> Option<Value> {
        None
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Option<Value> {
        Some(self)
    }
}

impl IntoValue for Primitive {
    fn into_value(self) -> Option<Value> {
        Some(self.into())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Option<Value> {
        self.and_then(IntoValue::into_value)
    }
}

macro_rules! into_value_via_from {
    ($($t:ty),*) => {
        $(
            impl IntoValue for $t {
                fn into_value(self) -> Option<Value> {
                    Some(Value::from(self))
                }
            }
        )*
    };
}

into_value_via_from!(bool, i32, i64, f64, String, &str);
