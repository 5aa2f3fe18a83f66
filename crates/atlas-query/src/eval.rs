use std::cmp::Ordering;

use atlas_types::{Document, Value};

use crate::expr::CompareOp;
use crate::predicate::{Predicate, Term};

/// Apply a comparison operator to two values.
///
/// Null equals only null and never orders. Text operators are false unless
/// both sides are text.
pub fn compare_values(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => left.loosely_equals(right),
        CompareOp::Ne => !left.loosely_equals(right),
        CompareOp::Lt => left.compare(right) == Some(Ordering::Less),
        CompareOp::Lte => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => left.compare(right) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            left.compare(right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Contains => text_pair(left, right).is_some_and(|(l, r)| l.contains(r)),
        CompareOp::StartsWith => text_pair(left, right).is_some_and(|(l, r)| l.starts_with(r)),
        CompareOp::EndsWith => text_pair(left, right).is_some_and(|(l, r)| l.ends_with(r)),
    }
}

fn text_pair<'a>(left: &'a Value, right: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((left.as_str()?, right.as_str()?))
}

pub(crate) fn read<D: Document>(document: &D, field: &str) -> Value {
    document.get(field).unwrap_or(Value::Null)
}

impl Term {
    /// Interpret this term against a document.
    pub fn matches<D: Document>(&self, document: &D) -> bool {
        match self {
            Term::Compare { field, op, value } => compare_values(*op, &read(document, field), value),
            Term::Fields { left, op, right } => {
                compare_values(*op, &read(document, left), &read(document, right))
            }
            Term::And(children) => children.iter().all(|t| t.matches(document)),
            Term::Or(children) => children.iter().any(|t| t.matches(document)),
            Term::Not(inner) => !inner.matches(document),
            Term::Literal(b) => *b,
        }
    }
}

impl Predicate {
    /// Interpret the predicate against a document.
    ///
    /// Prefer [`crate::CompiledPredicate`] on hot paths.
    pub fn matches<D: Document>(&self, document: &D) -> bool {
        self.terms().iter().all(|t| t.matches(document))
    }
}
