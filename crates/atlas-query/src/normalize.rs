use atlas_types::{FieldDef, FieldKind, Schema, TypeError, Value};

use crate::error::{PredicateError, PredicateResult};
use crate::eval::compare_values;
use crate::expr::{CompareOp, Expr, Param};
use crate::predicate::{Predicate, Term};
use crate::query::Query;

/// Normalize a query into one canonical predicate over `schema`.
///
/// Returns `Ok(None)` when the query places no restriction on the documents
/// (no clauses, or clauses that fold to `true`). A query that folds to `false`
/// yields the predicate `false` rather than `None`.
pub fn normalize(query: &Query, schema: &Schema) -> PredicateResult<Option<Predicate>> {
    let mut conjuncts = Vec::with_capacity(query.clauses().len());
    for clause in query.clauses() {
        let body = unify(&clause.body, clause.param)?;
        conjuncts.push(lower(&body, schema)?);
    }

    let terms = match and_terms(conjuncts) {
        Term::Literal(true) => return Ok(None),
        Term::And(children) => children,
        single => vec![single],
    };
    Ok(Some(Predicate::from_terms(terms)))
}

/// Normalize a single boolean expression over [`Param::DOCUMENT`].
pub fn normalize_expr(expr: &Expr, schema: &Schema) -> PredicateResult<Option<Predicate>> {
    normalize(&Query::filter(expr.clone()), schema)
}

// Rewrite every member of `param` onto the canonical document parameter.
fn unify(expr: &Expr, param: Param) -> PredicateResult<Expr> {
    Ok(match expr {
        Expr::Const(v) => Expr::Const(v.clone()),
        Expr::Member { param: p, field } => {
            if *p != param {
                return Err(PredicateError::UnboundParameter(*p));
            }
            Expr::Member {
                param: Param::DOCUMENT,
                field: field.clone(),
            }
        }
        Expr::Convert { expr, kind } => Expr::Convert {
            expr: Box::new(unify(expr, param)?),
            kind: *kind,
        },
        Expr::Compare { op, left, right } => Expr::Compare {
            op: *op,
            left: Box::new(unify(left, param)?),
            right: Box::new(unify(right, param)?),
        },
        Expr::And(children) => Expr::And(unify_all(children, param)?),
        Expr::Or(children) => Expr::Or(unify_all(children, param)?),
        Expr::Not(inner) => Expr::Not(Box::new(unify(inner, param)?)),
    })
}

fn unify_all(children: &[Expr], param: Param) -> PredicateResult<Vec<Expr>> {
    children.iter().map(|c| unify(c, param)).collect()
}

// Lower a boolean expression into a folded term.
fn lower(expr: &Expr, schema: &Schema) -> PredicateResult<Term> {
    match expr {
        Expr::Const(Value::Bool(b)) => Ok(Term::Literal(*b)),
        Expr::Const(other) => Err(PredicateError::NotSupported(format!(
            "constant {other} used as a predicate"
        ))),
        Expr::Member { field, .. } => {
            let def = lookup(schema, field)?;
            if def.kind != FieldKind::Bool {
                return Err(PredicateError::NotSupported(format!(
                    "{} field {field} used as a predicate",
                    def.kind
                )));
            }
            Ok(Term::Compare {
                field: field.clone(),
                op: CompareOp::Eq,
                value: Value::Bool(true),
            })
        }
        Expr::Convert {
            expr,
            kind: FieldKind::Bool,
        } => lower(expr, schema),
        Expr::Convert { kind, .. } => Err(PredicateError::NotSupported(format!(
            "conversion to {kind} used as a predicate"
        ))),
        Expr::Not(inner) => Ok(negate(lower(inner, schema)?)),
        Expr::And(children) => {
            let lowered = children
                .iter()
                .map(|c| lower(c, schema))
                .collect::<PredicateResult<Vec<_>>>()?;
            Ok(and_terms(lowered))
        }
        Expr::Or(children) => {
            let lowered = children
                .iter()
                .map(|c| lower(c, schema))
                .collect::<PredicateResult<Vec<_>>>()?;
            Ok(or_terms(lowered))
        }
        Expr::Compare { op, left, right } => lower_compare(*op, left, right, schema),
    }
}

fn negate(term: Term) -> Term {
    match term {
        Term::Literal(b) => Term::Literal(!b),
        Term::Not(inner) => *inner,
        other => Term::Not(Box::new(other)),
    }
}

fn and_terms(children: Vec<Term>) -> Term {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Term::Literal(true) => {}
            Term::Literal(false) => return Term::Literal(false),
            Term::And(grandchildren) => out.extend(grandchildren),
            other => out.push(other),
        }
    }
    collapse(out, true, Term::And)
}

fn or_terms(children: Vec<Term>) -> Term {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Term::Literal(false) => {}
            Term::Literal(true) => return Term::Literal(true),
            Term::Or(grandchildren) => out.extend(grandchildren),
            other => out.push(other),
        }
    }
    collapse(out, false, Term::Or)
}

fn collapse(mut out: Vec<Term>, identity: bool, wrap: fn(Vec<Term>) -> Term) -> Term {
    out.sort_by_cached_key(Term::sort_key);
    out.dedup();
    match out.len() {
        0 => Term::Literal(identity),
        1 => out.remove(0),
        _ => wrap(out),
    }
}

enum Operand<'a> {
    Const(Value),
    Field(&'a FieldDef),
}

fn operand<'s>(expr: &Expr, schema: &'s Schema) -> PredicateResult<Operand<'s>> {
    match expr {
        Expr::Const(v) => Ok(Operand::Const(v.clone())),
        Expr::Member { field, .. } => Ok(Operand::Field(lookup(schema, field)?)),
        // Conversions on a member are absorbed; on a constant they are applied now.
        Expr::Convert { expr, kind } => match operand(expr, schema)? {
            Operand::Field(def) => Ok(Operand::Field(def)),
            Operand::Const(v) => v
                .coerce(*kind)
                .map(Operand::Const)
                .map_err(|e| PredicateError::NotSupported(e.to_string())),
        },
        boolean => Err(PredicateError::NotSupported(format!(
            "boolean expression {boolean} used as a comparison operand"
        ))),
    }
}

fn lower_compare(op: CompareOp, left: &Expr, right: &Expr, schema: &Schema) -> PredicateResult<Term> {
    match (operand(left, schema)?, operand(right, schema)?) {
        (Operand::Const(a), Operand::Const(b)) => Ok(Term::Literal(compare_values(op, &a, &b))),
        (Operand::Field(def), Operand::Const(v)) => compare_field(def, op, v),
        (Operand::Const(v), Operand::Field(def)) => {
            let flipped = op.flip().ok_or_else(|| {
                PredicateError::NotSupported(format!(
                    "{op} with the constant on the left of {}",
                    def.name
                ))
            })?;
            compare_field(def, flipped, v)
        }
        (Operand::Field(l), Operand::Field(r)) => compare_fields(l, op, r),
    }
}

fn compare_field(def: &FieldDef, op: CompareOp, value: Value) -> PredicateResult<Term> {
    if value.is_null() {
        return Ok(match op {
            CompareOp::Eq if def.nullable => compare_term(def, op, Value::Null),
            CompareOp::Ne if def.nullable => compare_term(def, op, Value::Null),
            CompareOp::Ne => Term::Literal(true),
            _ => Term::Literal(false),
        });
    }

    if op.is_text() {
        if def.kind != FieldKind::Text {
            return Err(mismatch(def, FieldKind::Text.to_string()));
        }
        if value.kind() != Some(FieldKind::Text) {
            return Err(mismatch(def, value.type_name().to_string()));
        }
        return Ok(compare_term(def, op, value));
    }

    let found = value.type_name();
    match value.clone().coerce(def.kind) {
        Ok(coerced) => Ok(compare_term(def, op, coerced)),
        // A fractional constant against an integer field: equality can never
        // hold, ordering still compares numerically.
        Err(TypeError::OutOfRange { .. }) => Ok(match op {
            CompareOp::Eq => Term::Literal(false),
            CompareOp::Ne => Term::Literal(true),
            _ => compare_term(def, op, value),
        }),
        Err(_) => Err(mismatch(def, found.to_string())),
    }
}

fn compare_fields(left: &FieldDef, op: CompareOp, right: &FieldDef) -> PredicateResult<Term> {
    if !left.kind.is_comparable_with(right.kind) {
        return Err(mismatch(left, right.kind.to_string()));
    }
    if op.is_text() && (left.kind != FieldKind::Text || right.kind != FieldKind::Text) {
        return Err(mismatch(left, right.kind.to_string()));
    }

    // Order the two fields by name so `a < b` and `b > a` normalize alike.
    let (left, op, right) = match op.flip() {
        Some(flipped) if right.name < left.name => (right, flipped, left),
        _ => (left, op, right),
    };
    Ok(Term::Fields {
        left: left.name.clone(),
        op,
        right: right.name.clone(),
    })
}

fn compare_term(def: &FieldDef, op: CompareOp, value: Value) -> Term {
    Term::Compare {
        field: def.name.clone(),
        op,
        value,
    }
}

fn lookup<'s>(schema: &'s Schema, field: &str) -> PredicateResult<&'s FieldDef> {
    schema
        .field(field)
        .ok_or_else(|| PredicateError::UnknownField {
            document: schema.name().to_string(),
            field: field.to_string(),
        })
}

fn mismatch(def: &FieldDef, found: String) -> PredicateError {
    PredicateError::TypeMismatch {
        field: def.name.clone(),
        expected: def.kind,
        found,
    }
}
