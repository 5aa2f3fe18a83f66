use atlas_types::{Document, Schema, Value};

use crate::error::{PredicateError, PredicateResult};
use crate::expr::{Expr, Param};

/// Substitute every member of `param` with the matching field of `document`.
///
/// Returns `Ok(None)` if any substituted value is null: a join through a null
/// value matches nothing, so there is no expression left to evaluate.
pub fn bind<D: Document>(
    expr: &Expr,
    param: Param,
    document: &D,
    schema: &Schema,
) -> PredicateResult<Option<Expr>> {
    bind_with(expr, param, &|field| {
        document
            .get(field)
            .ok_or_else(|| PredicateError::UnknownField {
                document: schema.name().to_string(),
                field: field.to_string(),
            })
    })
}

/// Substitute every member of `param` with the value `lookup` returns for it.
pub fn bind_with(
    expr: &Expr,
    param: Param,
    lookup: &dyn Fn(&str) -> PredicateResult<Value>,
) -> PredicateResult<Option<Expr>> {
    let bound = match expr {
        Expr::Member { param: p, field } if *p == param => {
            let value = lookup(field)?;
            if value.is_null() {
                return Ok(None);
            }
            Expr::Const(value)
        }
        Expr::Const(_) | Expr::Member { .. } => expr.clone(),
        Expr::Convert { expr, kind } => match bind_with(expr, param, lookup)? {
            Some(inner) => Expr::Convert {
                expr: Box::new(inner),
                kind: *kind,
            },
            None => return Ok(None),
        },
        Expr::Compare { op, left, right } => {
            let (Some(left), Some(right)) = (
                bind_with(left, param, lookup)?,
                bind_with(right, param, lookup)?,
            ) else {
                return Ok(None);
            };
            Expr::Compare {
                op: *op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Expr::And(children) => match bind_all(children, param, lookup)? {
            Some(children) => Expr::And(children),
            None => return Ok(None),
        },
        Expr::Or(children) => match bind_all(children, param, lookup)? {
            Some(children) => Expr::Or(children),
            None => return Ok(None),
        },
        Expr::Not(inner) => match bind_with(inner, param, lookup)? {
            Some(inner) => Expr::Not(Box::new(inner)),
            None => return Ok(None),
        },
    };
    Ok(Some(bound))
}

fn bind_all(
    children: &[Expr],
    param: Param,
    lookup: &dyn Fn(&str) -> PredicateResult<Value>,
) -> PredicateResult<Option<Vec<Expr>>> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match bind_with(child, param, lookup)? {
            Some(bound) => out.push(bound),
            None => return Ok(None),
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{foreign, local, value};
    use crate::test_support::{person, person_schema};

    #[test]
    fn local_members_become_constants() {
        let schema = person_schema();
        let matcher = local("manager").equals(foreign("id"));
        let mut doc = person(1, "ann", 30);
        doc.manager = Some(9);

        let bound = bind(&matcher, Param::LOCAL, &doc, &schema).unwrap().unwrap();
        assert_eq!(bound, value(9).equals(foreign("id")));
    }

    #[test]
    fn null_value_resolves_to_nothing() {
        let schema = person_schema();
        let matcher = local("manager").equals(foreign("id"));
        let doc = person(1, "ann", 30);
        assert_eq!(bind(&matcher, Param::LOCAL, &doc, &schema).unwrap(), None);
    }

    #[test]
    fn unknown_local_field_is_an_error() {
        let schema = person_schema();
        let matcher = local("boss").equals(foreign("id"));
        let doc = person(1, "ann", 30);
        assert!(matches!(
            bind(&matcher, Param::LOCAL, &doc, &schema),
            Err(PredicateError::UnknownField { field, .. }) if field == "boss"
        ));
    }

    #[test]
    fn other_parameters_are_untouched() {
        let matcher = foreign("name").equals("x");
        let bound = bind_with(&matcher, Param::LOCAL, &|_| Ok(Value::Int(1)))
            .unwrap()
            .unwrap();
        assert_eq!(bound, matcher);
    }
}
