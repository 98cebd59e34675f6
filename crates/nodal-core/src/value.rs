//! The socket/parameter value model.
//!
//! Node inputs, outputs, and parameters all carry [`Value`]: a tagged union
//! over primitives, an opaque geometry handle, and lists. The engine never
//! interprets payloads beyond hashing and pass-through; node definitions
//! declare the shapes they expect and use the typed accessors to unpack.
//!
//! `Float` stores `f64` directly. Values are compared with `PartialEq` only
//! (no `Eq`), and fingerprinting goes through canonical serde serialization
//! rather than structural hashing, so NaN quirks never reach a cache key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Opaque reference to an object living inside the external geometry
/// backend. The engine treats it as data: it is hashed, stored, and passed
/// back to the backend, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryHandle(pub u64);

impl fmt::Display for GeometryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geom#{}", self.0)
    }
}

/// A socket or parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A 3-component vector (point, direction, scale).
    Vector([f64; 3]),
    /// Reference into the geometry backend.
    Handle(GeometryHandle),
    /// Ordered collection; also produced when several edges feed one socket.
    List(Vec<Value>),
}

impl Value {
    /// Returns the variant name, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Vector(_) => "vector",
            Value::Handle(_) => "handle",
            Value::List(_) => "list",
        }
    }

    pub fn as_bool(&self) -> Result<bool, CoreError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(CoreError::ValueType {
                expected: "bool",
                got: other.kind(),
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, CoreError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(CoreError::ValueType {
                expected: "int",
                got: other.kind(),
            }),
        }
    }

    /// Returns the value as `f64`. Ints widen; everything else is an error.
    pub fn as_float(&self) -> Result<f64, CoreError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(CoreError::ValueType {
                expected: "float",
                got: other.kind(),
            }),
        }
    }

    pub fn as_text(&self) -> Result<&str, CoreError> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(CoreError::ValueType {
                expected: "text",
                got: other.kind(),
            }),
        }
    }

    pub fn as_vector(&self) -> Result<[f64; 3], CoreError> {
        match self {
            Value::Vector(v) => Ok(*v),
            other => Err(CoreError::ValueType {
                expected: "vector",
                got: other.kind(),
            }),
        }
    }

    pub fn as_handle(&self) -> Result<GeometryHandle, CoreError> {
        match self {
            Value::Handle(h) => Ok(*h),
            other => Err(CoreError::ValueType {
                expected: "handle",
                got: other.kind(),
            }),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], CoreError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(CoreError::ValueType {
                expected: "list",
                got: other.kind(),
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<GeometryHandle> for Value {
    fn from(h: GeometryHandle) -> Self {
        Value::Handle(h)
    }
}
