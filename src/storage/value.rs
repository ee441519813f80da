use crate::errors::Error;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value stored against a key.
///
/// Only scalar, serializable values are accepted. There is no null variant: an absent
/// value is rejected at the boundary that produced it (command line, form field, JSON).
#[derive(Encode, Decode, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Infers a value from its text form: integer, then float, then boolean, then string.
    ///
    /// # Errors
    /// Returns `Error::InvalidEntry` for empty input or a non-finite float.
    ///
    /// # Examples
    /// ```
    /// use kvtree::storage::Value;
    /// assert_eq!(Value::parse("42").unwrap(), Value::Int(42));
    /// assert_eq!(Value::parse("true").unwrap(), Value::Bool(true));
    /// assert_eq!(Value::parse("forty").unwrap(), Value::Str("forty".into()));
    /// ```
    pub fn parse(text: &str) -> Result<Value, Error> {
        if text.is_empty() {
            return Err(err!(InvalidEntry, "Value cannot be empty"));
        }
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Value::Int(v));
        }
        if let Ok(v) = text.parse::<f64>() {
            // "inf" and "NaN" parse as floats but are not storable
            if text.chars().any(|c| c.is_ascii_digit()) {
                return Value::Float(v).validated();
            }
        }
        match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Ok(Value::Str(text.to_string())),
        }
    }

    /// Converts a JSON scalar into a value.
    ///
    /// # Errors
    /// Returns `Error::InvalidEntry` for `null`, arrays, objects and unrepresentable numbers.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, Error> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f).validated()
                } else {
                    Err(err!(InvalidEntry, "Number {} is out of range", n))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()).validated(),
            serde_json::Value::Null => Err(err!(InvalidEntry, "Value cannot be null")),
            other => Err(err!(
                InvalidEntry,
                "Value must be a string, number or boolean, got {}",
                other
            )),
        }
    }

    /// Checks the value against the accepted-type contract.
    ///
    /// # Errors
    /// Returns `Error::InvalidEntry` for empty strings and non-finite floats.
    pub fn validated(self) -> Result<Value, Error> {
        match &self {
            Value::Str(s) if s.is_empty() => Err(err!(InvalidEntry, "Value cannot be empty")),
            Value::Float(f) if !f.is_finite() => {
                Err(err!(InvalidEntry, "Value {} is not a finite number", f))
            }
            _ => Ok(self),
        }
    }

    /// Returns the name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INT",
            Value::Float(_) => "DOUBLE",
            Value::Str(_) => "TEXT",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            // `{:?}` keeps the fraction (`2.0`, `1e16`) so the text parses back as a float
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
