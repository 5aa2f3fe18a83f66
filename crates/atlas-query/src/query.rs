use crate::expr::{Expr, Param};

/// The operator a filtering clause came from.
///
/// All clause kinds filter; `First`, `Single` and `Any` additionally tell the
/// caller how many results it is after.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Where,
    First,
    Single,
    Any,
}

/// One filtering clause: a boolean body over its own parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub param: Param,
    pub body: Expr,
}

impl Clause {
    /// A clause binding `param` in `body`.
    pub fn new(kind: ClauseKind, param: Param, body: Expr) -> Self {
        Self { kind, param, body }
    }
}

/// A chain of filtering clauses over one document type.
///
/// The clauses are ANDed together by the normalizer. An empty query matches
/// every document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// A query with no clauses.
    pub fn all() -> Self {
        Self::default()
    }

    /// A query with a single `Where` clause over [`Param::DOCUMENT`].
    pub fn filter(body: Expr) -> Self {
        Self::all().and_where(body)
    }

    /// Add a `Where` clause.
    pub fn and_where(self, body: Expr) -> Self {
        self.with_clause(Clause::new(ClauseKind::Where, Param::DOCUMENT, body))
    }

    /// Add a `First` clause.
    pub fn first(self, body: Expr) -> Self {
        self.with_clause(Clause::new(ClauseKind::First, Param::DOCUMENT, body))
    }

    /// Add a `Single` clause.
    pub fn single(self, body: Expr) -> Self {
        self.with_clause(Clause::new(ClauseKind::Single, Param::DOCUMENT, body))
    }

    /// Add an `Any` clause.
    pub fn any(self, body: Expr) -> Self {
        self.with_clause(Clause::new(ClauseKind::Any, Param::DOCUMENT, body))
    }

    /// Append a clause bound to an arbitrary parameter.
    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Clauses in the order they were added.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns `true` for a query that matches everything.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl From<Expr> for Query {
    fn from(body: Expr) -> Self {
        Query::filter(body)
    }
}
