use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TypeError;
use crate::schema::SchemaBuilder;
use crate::value::{FieldKind, Value};

/// A cacheable document type.
///
/// Implementors describe their fields once through [`Document::describe`] and
/// expose them by name. Field access is dynamic so that predicates, indexes,
/// and relation matchers can work on any document type without generated code.
///
/// `Default` must produce the blank document every field of which holds the
/// default value of its kind; relation projection starts from it.
pub trait Document: Default + Clone + Send + Sync + 'static {
    /// Declare this type's fields and key.
    fn describe() -> SchemaBuilder;

    /// Read a field. Returns `None` for names this type does not have.
    fn get(&self, field: &str) -> Option<Value>;

    /// Assign a field, converting the value into the field's type.
    fn set(&mut self, field: &str, value: Value) -> Result<(), TypeError>;
}

/// Conversion from a dynamic [`Value`] into a concrete field type.
///
/// Used by [`Document::set`] implementations.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, TypeError>;
}

fn require(value: Value, kind: FieldKind) -> Result<Value, TypeError> {
    if value.is_null() {
        return Err(TypeError::NullNotAllowed);
    }
    value.coerce(kind)
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Bool)? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(FieldKind::Bool, &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Int)? {
            Value::Int(i) => Ok(i),
            other => Err(mismatch(FieldKind::Int, &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| TypeError::OutOfRange {
            value: wide.to_string(),
            kind: FieldKind::Int,
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Float)? {
            Value::Float(f) => Ok(f),
            other => Err(mismatch(FieldKind::Float, &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Text)? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(FieldKind::Text, &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Uuid)? {
            Value::Uuid(u) => Ok(u),
            other => Err(mismatch(FieldKind::Uuid, &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        match require(value, FieldKind::Timestamp)? {
            Value::Timestamp(t) => Ok(t),
            other => Err(mismatch(FieldKind::Timestamp, &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

fn mismatch(expected: FieldKind, found: &Value) -> TypeError {
    TypeError::Mismatch {
        expected,
        found: found.type_name().to_string(),
    }
}
