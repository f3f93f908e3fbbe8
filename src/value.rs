//! Typed values and raw-value coercion.

use std::fmt;

use crate::error::{Error, Result};

/// A column value after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (int2/int4/int8 widened to i64)
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text, also the fallback for unrecognized type names
    Text(String),
}

impl Value {
    /// True if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as i64, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64, if this is a float or integer.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as &str, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Coerces a raw text-format column value into a [`Value`] based on the
/// column's type name.
pub trait DataTypeParser {
    /// Parse a raw value. `None` is SQL NULL and must pass through as
    /// [`Value::Null`]. Unknown type names fall back to the raw text.
    fn parse(&self, raw: Option<&str>, type_name: &str) -> Result<Value>;
}

/// Default parser covering the text-format representations of the common
/// scalar types.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDataTypeParser;

impl DataTypeParser for TextDataTypeParser {
    fn parse(&self, raw: Option<&str>, type_name: &str) -> Result<Value> {
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };

        match type_name {
            "bool" => match raw {
                "t" | "true" | "TRUE" | "T" | "1" => Ok(Value::Bool(true)),
                "f" | "false" | "FALSE" | "F" | "0" => Ok(Value::Bool(false)),
                _ => Err(Error::Parse(format!("invalid boolean: {:?}", raw))),
            },
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "oid" => raw
                .parse()
                .map(Value::Int)
                .map_err(|e| Error::Parse(format!("invalid {}: {}", type_name, e))),
            "float4" | "float8" | "numeric" => raw
                .parse()
                .map(Value::Float)
                .map_err(|e| Error::Parse(format!("invalid {}: {}", type_name, e))),
            "text" | "varchar" | "bpchar" | "char" | "name" => Ok(Value::Text(raw.to_string())),
            _ => Ok(Value::Text(raw.to_string())),
        }
    }
}
