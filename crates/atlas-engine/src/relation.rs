use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use atlas_query::{
    bind, bind_with, normalize, Clause, ClauseKind, Expr, Param, PredicateError, Query,
};
use atlas_types::{Document, Schema};
use serde::{Deserialize, Serialize};

use crate::error::AtlasResult;

/// How many foreign documents a relation resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// A declared link from documents of type `D` to documents of type `F`.
///
/// The matcher is a boolean expression over the [`Param::LOCAL`] document
/// and the [`Param::FOREIGN`] candidate, e.g.
/// `local("team_id").equals(foreign("id"))`.
pub struct Relation<D, F> {
    name: String,
    cardinality: Cardinality,
    matcher: Expr,
    _types: PhantomData<fn() -> (D, F)>,
}

impl<D: Document, F: Document> Relation<D, F> {
    /// Declare a relation named `name`.
    pub fn new(name: impl Into<String>, cardinality: Cardinality, matcher: Expr) -> Self {
        Self {
            name: name.into(),
            cardinality,
            matcher,
            _types: PhantomData,
        }
    }

    /// Name used to navigate the relation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the relation yields one document or many.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The join expression over the local and foreign documents.
    pub fn matcher(&self) -> &Expr {
        &self.matcher
    }

    /// The query over `F` that finds the documents related to `document`.
    ///
    /// Returns `Ok(None)` when a join value drawn from `document` is null.
    pub fn query(&self, document: &D, schema: &Schema) -> AtlasResult<Option<Query>> {
        let Some(bound) = bind(&self.matcher, Param::LOCAL, document, schema)? else {
            return Ok(None);
        };
        Ok(Some(self.foreign_query(bound)))
    }

    /// Check the matcher against both schemas.
    pub fn validate(&self, local: &Schema, foreign: &Schema) -> AtlasResult<()> {
        let mut stray = None;
        self.matcher.for_each_member(&mut |param, _| {
            if param != Param::LOCAL && param != Param::FOREIGN && stray.is_none() {
                stray = Some(param);
            }
        });
        if let Some(param) = stray {
            return Err(PredicateError::UnboundParameter(param).into());
        }

        let bound = bind_with(&self.matcher, Param::LOCAL, &|field| {
            local
                .field(field)
                .map(|def| def.kind.default_value())
                .ok_or_else(|| PredicateError::UnknownField {
                    document: local.name().to_string(),
                    field: field.to_string(),
                })
        })?;
        if let Some(bound) = bound {
            normalize(&self.foreign_query(bound), foreign)?;
        }
        Ok(())
    }

    fn foreign_query(&self, bound: Expr) -> Query {
        let kind = match self.cardinality {
            Cardinality::One => ClauseKind::First,
            Cardinality::Many => ClauseKind::Where,
        };
        Query::all().with_clause(Clause::new(kind, Param::FOREIGN, bound))
    }
}

impl<D, F> fmt::Debug for Relation<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("target", &type_name::<F>())
            .field("matcher", &format_args!("{}", self.matcher))
            .finish()
    }
}

/// A relation of `D` with its target type erased.
pub(crate) trait ErasedRelation<D>: Send + Sync {
    fn name(&self) -> &str;
    fn target(&self) -> TypeId;
    fn target_name(&self) -> &'static str;
    fn validate(&self, local: &Schema, foreign: &Schema) -> AtlasResult<()>;
    fn as_any(&self) -> &dyn Any;
}

impl<D: Document, F: Document> ErasedRelation<D> for Relation<D, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> TypeId {
        TypeId::of::<F>()
    }

    fn target_name(&self) -> &'static str {
        type_name::<F>()
    }

    fn validate(&self, local: &Schema, foreign: &Schema) -> AtlasResult<()> {
        Relation::validate(self, local, foreign)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtlasError;
    use crate::fixtures::{member, Member, Team};
    use atlas_query::{foreign, local, member as param_member};

    fn team_of() -> Relation<Member, Team> {
        Relation::new("team", Cardinality::One, local("team_id").equals(foreign("id")))
    }

    fn schemas() -> (Schema, Schema) {
        (Schema::of::<Member>().unwrap(), Schema::of::<Team>().unwrap())
    }

    #[test]
    fn query_binds_local_values() {
        let (members, teams) = schemas();
        let query = team_of()
            .query(&member(1, "ann", Some(7)), &members)
            .unwrap()
            .unwrap();

        assert_eq!(query.clauses().len(), 1);
        assert_eq!(query.clauses()[0].kind, ClauseKind::First);
        let p = normalize(&query, &teams).unwrap().unwrap();
        assert_eq!(p.to_string(), "id == 7");
    }

    #[test]
    fn null_join_value_has_no_query() {
        let (members, _) = schemas();
        assert!(team_of()
            .query(&member(1, "ann", None), &members)
            .unwrap()
            .is_none());
    }

    #[test]
    fn many_uses_where_clauses() {
        let rel: Relation<Team, Member> =
            Relation::new("members", Cardinality::Many, local("id").equals(foreign("team_id")));
        let (_, teams) = schemas();
        let team = Team {
            id: 3,
            name: "core".into(),
        };
        let query = rel.query(&team, &teams).unwrap().unwrap();
        assert_eq!(query.clauses()[0].kind, ClauseKind::Where);
    }

    #[test]
    fn validate_accepts_well_formed_matchers() {
        let (members, teams) = schemas();
        team_of().validate(&members, &teams).unwrap();
    }

    #[test]
    fn validate_rejects_unknown_fields() {
        let (members, teams) = schemas();
        let bad_local: Relation<Member, Team> =
            Relation::new("team", Cardinality::One, local("squad").equals(foreign("id")));
        assert!(matches!(
            bad_local.validate(&members, &teams),
            Err(AtlasError::Predicate(PredicateError::UnknownField { field, .. })) if field == "squad"
        ));

        let bad_foreign: Relation<Member, Team> =
            Relation::new("team", Cardinality::One, local("team_id").equals(foreign("uid")));
        assert!(matches!(
            bad_foreign.validate(&members, &teams),
            Err(AtlasError::Predicate(PredicateError::UnknownField { field, .. })) if field == "uid"
        ));
    }

    #[test]
    fn validate_rejects_type_mismatch_and_stray_params() {
        let (members, teams) = schemas();
        let mismatch: Relation<Member, Team> =
            Relation::new("team", Cardinality::One, local("team_id").equals(foreign("name")));
        assert!(matches!(
            mismatch.validate(&members, &teams),
            Err(AtlasError::Predicate(PredicateError::TypeMismatch { .. }))
        ));

        let stray: Relation<Member, Team> = Relation::new(
            "team",
            Cardinality::One,
            param_member(Param(9), "id").equals(foreign("id")),
        );
        assert!(matches!(
            stray.validate(&members, &teams),
            Err(AtlasError::Predicate(PredicateError::UnboundParameter(Param(9))))
        ));
    }

    #[test]
    fn erased_view_reports_target() {
        let rel = team_of();
        let erased: &dyn ErasedRelation<Member> = &rel;
        assert_eq!(erased.target(), TypeId::of::<Team>());
        assert!(erased.target_name().ends_with("Team"));
        assert!(erased
            .as_any()
            .downcast_ref::<Relation<Member, Team>>()
            .is_some());
    }
}
