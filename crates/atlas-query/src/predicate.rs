use std::fmt;

use atlas_types::Value;

use crate::expr::CompareOp;

/// One node of a normalized predicate.
///
/// Members are always on the left and constants are already coerced to the
/// member's field kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// `field op constant`
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// `left op right` over two fields of the same document.
    Fields {
        left: String,
        op: CompareOp,
        right: String,
    },
    And(Vec<Term>),
    Or(Vec<Term>),
    Not(Box<Term>),
    Literal(bool),
}

impl Term {
    /// Key used to order sibling terms canonically.
    pub(crate) fn sort_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            Term::Fields { left, op, right } => write!(f, "{left} {op} @{right}"),
            Term::And(children) => write_joined(f, children, " && "),
            Term::Or(children) => write_joined(f, children, " || "),
            Term::Not(inner) => write!(f, "!({inner})"),
            Term::Literal(b) => write!(f, "{b}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Term], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

/// A canonical conjunctive predicate over one document type.
///
/// Produced only by [`crate::normalize`]. Equivalent queries normalize to
/// structurally equal predicates, so `Eq`/`Hash` identify a filter and the
/// `Display` form doubles as the query-context memo key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    pub(crate) fn from_terms(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    /// Top-level conjuncts, in canonical order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The constant a top-level `field == constant` term pins `field` to.
    ///
    /// Null equalities are not reported.
    pub fn equality(&self, field: &str) -> Option<&Value> {
        self.equalities()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Every top-level non-null `field == constant` pair.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().filter_map(|term| match term {
            Term::Compare {
                field,
                op: CompareOp::Eq,
                value,
            } if !value.is_null() => Some((field.as_str(), value)),
            _ => None,
        })
    }

    /// Returns `true` if the predicate folded to constant false.
    pub fn is_never(&self) -> bool {
        self.terms == [Term::Literal(false)]
    }

    /// The memo key for this predicate.
    pub fn key(&self) -> PredicateKey {
        PredicateKey(self.to_string())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

/// Canonical textual identity of an optional predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateKey(String);

impl PredicateKey {
    /// Key used when there is no predicate at all.
    pub const ALL: &'static str = "<all>";

    /// Key for `predicate`, or [`PredicateKey::ALL`] for none.
    pub fn of(predicate: Option<&Predicate>) -> Self {
        match predicate {
            Some(p) => p.key(),
            None => Self(Self::ALL.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PredicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
