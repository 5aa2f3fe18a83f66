use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Declared type of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Timestamp,
}

impl FieldKind {
    /// The value a freshly defaulted document holds for a field of this kind.
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Text => Value::Text(String::new()),
            Self::Uuid => Value::Uuid(Uuid::nil()),
            Self::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
        }
    }

    /// Returns `true` for `Int` and `Float`.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Two kinds are comparable when equal or both numeric.
    pub fn is_comparable_with(self, other: FieldKind) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
        };
        write!(f, "{s}")
    }
}

/// A dynamically typed field value.
///
/// Values flow between documents, predicates, and indexes. Structural equality
/// (`PartialEq`, `Hash`) is kind-exact and is what indexes bucket on; predicate
/// evaluation uses [`Value::loosely_equals`] and [`Value::compare`], which treat
/// `Int` and `Float` as one numeric domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// The kind of a non-null value.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Text(_) => Some(FieldKind::Text),
            Self::Uuid(_) => Some(FieldKind::Uuid),
            Self::Timestamp(_) => Some(FieldKind::Timestamp),
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is null or the zero value of its kind.
    pub fn is_default(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Uuid(u) => u.is_nil(),
            Self::Timestamp(t) => *t == DateTime::<Utc>::default(),
        }
    }

    /// The numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Order two values of comparable kinds. Returns `None` for nulls and
    /// incomparable kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Predicate equality: null equals only null, numerics compare by value.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Convert this value into the given kind.
    ///
    /// Null passes through unchanged. Integers widen to floats, integral
    /// floats narrow to integers, and text parses into uuids and RFC 3339
    /// timestamps. Anything else is a mismatch.
    pub fn coerce(self, kind: FieldKind) -> Result<Value, TypeError> {
        match (self, kind) {
            (Self::Null, _) => Ok(Self::Null),
            (v @ Self::Bool(_), FieldKind::Bool)
            | (v @ Self::Int(_), FieldKind::Int)
            | (v @ Self::Float(_), FieldKind::Float)
            | (v @ Self::Text(_), FieldKind::Text)
            | (v @ Self::Uuid(_), FieldKind::Uuid)
            | (v @ Self::Timestamp(_), FieldKind::Timestamp) => Ok(v),
            (Self::Int(i), FieldKind::Float) => Ok(Self::Float(i as f64)),
            (Self::Float(f), FieldKind::Int) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(Self::Int(f as i64))
                } else {
                    Err(TypeError::OutOfRange {
                        value: format!("{f:?}"),
                        kind,
                    })
                }
            }
            (Self::Text(s), FieldKind::Uuid) => Uuid::parse_str(&s)
                .map(Self::Uuid)
                .map_err(|e| TypeError::Parse {
                    kind,
                    reason: e.to_string(),
                }),
            (Self::Text(s), FieldKind::Timestamp) => DateTime::parse_from_rfc3339(&s)
                .map(|t| Self::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| TypeError::Parse {
                    kind,
                    reason: e.to_string(),
                }),
            (other, kind) => Err(TypeError::Mismatch {
                expected: kind,
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Feed a tagged, length-delimited encoding of this value into a hasher.
    pub fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Null => {
                hasher.update(&[0]);
            }
            Self::Bool(b) => {
                hasher.update(&[1, u8::from(*b)]);
            }
            Self::Int(i) => {
                hasher.update(&[2]);
                hasher.update(&i.to_le_bytes());
            }
            Self::Float(f) => {
                hasher.update(&[3]);
                hasher.update(&canonical_bits(*f).to_le_bytes());
            }
            Self::Text(s) => {
                hasher.update(&[4]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Self::Uuid(u) => {
                hasher.update(&[5]);
                hasher.update(u.as_bytes());
            }
            Self::Timestamp(t) => {
                hasher.update(&[6]);
                hasher.update(&t.timestamp().to_le_bytes());
                hasher.update(&t.timestamp_subsec_nanos().to_le_bytes());
            }
        }
    }
}

// Folds -0.0 onto 0.0 and every NaN onto one payload so Eq and Hash agree.
fn canonical_bits(f: f64) -> u64 {
    if f == 0.0 {
        0
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => canonical_bits(*f).hash(state),
            Self::Text(s) => s.hash(state),
            Self::Uuid(u) => u.hash(state),
            Self::Timestamp(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Uuid(u) => write!(f, "uuid:{u}"),
            Self::Timestamp(t) => write!(f, "ts:{}", t.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
