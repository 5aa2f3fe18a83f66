use std::fmt;
use std::ops;

use atlas_types::{FieldKind, Value};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A lambda parameter an expression's members are bound to.
///
/// Query clauses range over [`Param::DOCUMENT`]; relation matchers range over
/// [`Param::LOCAL`] (the navigating document) and [`Param::FOREIGN`] (the
/// target document). Other numbers are free for callers composing clauses by
/// hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Param(pub u32);

impl Param {
    pub const DOCUMENT: Param = Param(0);
    pub const LOCAL: Param = Param(1);
    pub const FOREIGN: Param = Param(2);
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DOCUMENT => write!(f, "doc"),
            Self::LOCAL => write!(f, "local"),
            Self::FOREIGN => write!(f, "foreign"),
            Param(n) => write!(f, "${n}"),
        }
    }
}

/// Binary comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    EndsWith,
}

impl CompareOp {
    /// The operator that gives the same result with operands swapped.
    ///
    /// Text operators are not symmetric and have no mirror.
    pub fn flip(self) -> Option<CompareOp> {
        match self {
            Self::Eq => Some(Self::Eq),
            Self::Ne => Some(Self::Ne),
            Self::Lt => Some(Self::Gt),
            Self::Lte => Some(Self::Gte),
            Self::Gt => Some(Self::Lt),
            Self::Gte => Some(Self::Lte),
            Self::Contains | Self::StartsWith | Self::EndsWith => None,
        }
    }

    /// Returns `true` for `<`, `<=`, `>` and `>=`.
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }

    /// Returns `true` for the string-only operators.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    /// Operator text used in the canonical form.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A boolean or scalar expression over one or more document parameters.
///
/// `Expr` is the user-facing predicate language. It is deliberately loose:
/// constants may sit on either side of a comparison and clauses may use any
/// parameter. [`crate::normalize`] turns it into a canonical [`crate::Predicate`].
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(Value),
    Member { param: Param, field: String },
    Convert { expr: Box<Expr>, kind: FieldKind },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

/// A field of the queried document.
pub fn field(name: impl Into<String>) -> Expr {
    member(Param::DOCUMENT, name)
}

/// A field of the navigating document in a relation matcher.
pub fn local(name: impl Into<String>) -> Expr {
    member(Param::LOCAL, name)
}

/// A field of the target document in a relation matcher.
pub fn foreign(name: impl Into<String>) -> Expr {
    member(Param::FOREIGN, name)
}

/// Field `name` of the document bound to `param`.
pub fn member(param: Param, name: impl Into<String>) -> Expr {
    Expr::Member {
        param,
        field: name.into(),
    }
}

/// A constant operand.
pub fn value(v: impl Into<Value>) -> Expr {
    Expr::Const(v.into())
}

impl Expr {
    /// Compare two expressions with `op`.
    pub fn compare(op: CompareOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    /// `self == rhs`
    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Eq, self, rhs)
    }

    /// `self != rhs`
    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Ne, self, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Lt, self, rhs)
    }

    /// `self <= rhs`
    pub fn lte(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Lte, self, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Gt, self, rhs)
    }

    /// `self >= rhs`
    pub fn gte(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Gte, self, rhs)
    }

    /// String containment.
    pub fn contains(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::Contains, self, rhs)
    }

    /// String prefix test.
    pub fn starts_with(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::StartsWith, self, rhs)
    }

    /// String suffix test.
    pub fn ends_with(self, rhs: impl Into<Expr>) -> Expr {
        Self::compare(CompareOp::EndsWith, self, rhs)
    }

    /// Conjunction.
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(vec![self, rhs])
    }

    /// Disjunction.
    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(vec![self, rhs])
    }

    /// Explicit conversion of this operand to another kind.
    pub fn convert(self, kind: FieldKind) -> Expr {
        Expr::Convert {
            expr: Box::new(self),
            kind,
        }
    }

    /// Returns `true` for nodes that produce a boolean rather than a scalar.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Expr::Compare { .. } | Expr::And(_) | Expr::Or(_) | Expr::Not(_)
        )
    }

    /// Call `f` for every member reference in the tree.
    pub fn for_each_member(&self, f: &mut dyn FnMut(Param, &str)) {
        match self {
            Expr::Const(_) => {}
            Expr::Member { param, field } => f(*param, field),
            Expr::Convert { expr, .. } | Expr::Not(expr) => expr.for_each_member(f),
            Expr::Compare { left, right, .. } => {
                left.for_each_member(f);
                right.for_each_member(f);
            }
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.for_each_member(f);
                }
            }
        }
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

macro_rules! const_expr_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Expr {
                fn from(v: $t) -> Self {
                    Expr::Const(Value::from(v))
                }
            }
        )*
    };
}

const_expr_from!(
    Value,
    bool,
    i64,
    i32,
    u32,
    f64,
    &str,
    String,
    Uuid,
    DateTime<Utc>,
);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Member { param, field } => write!(f, "{param}.{field}"),
            Expr::Convert { expr, kind } => write!(f, "({kind}){expr}"),
            Expr::Compare { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::And(children) => write_joined(f, children, " && "),
            Expr::Or(children) => write_joined(f, children, " || "),
            Expr::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
