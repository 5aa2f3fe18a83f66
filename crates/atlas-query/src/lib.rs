//! Predicate algebra for Atlas.
//!
//! Callers describe filters with the loose [`Expr`] language and chain them
//! into a [`Query`]. The normalizer rewrites a query into one canonical,
//! type-checked [`Predicate`] that indexes and the keyed lookup path can
//! pattern-match, and that the compiler turns into a reusable filter.
//!
//! # Key Types
//!
//! - [`Expr`] -- boolean and scalar expression tree over lambda parameters
//! - [`Query`] -- chain of `Where`/`First`/`Single`/`Any` clauses
//! - [`Predicate`] -- canonical conjunction of [`Term`]s
//! - [`PredicateKey`] -- textual identity used for per-call memoization
//! - [`CompiledPredicate`] / [`PredicateCache`] -- closure-compiled filters
//!
//! # Normalization Rules
//!
//! 1. Every clause parameter is unified onto [`Param::DOCUMENT`].
//! 2. Members are moved to the left of comparisons, mirroring the operator.
//! 3. Constants are coerced to the member's declared field kind.
//! 4. Constant comparisons fold to literals; so do null comparisons against
//!    fields that cannot be null.
//! 5. Nested `And`/`Or` are flattened, double negation is removed, and sibling
//!    terms are sorted and de-duplicated.

pub mod bind;
pub mod compile;
pub mod error;
pub mod eval;
pub mod expr;
pub mod normalize;
pub mod predicate;
pub mod project;
pub mod query;

pub use bind::{bind, bind_with};
pub use compile::{CacheStats, CompiledPredicate, PredicateCache};
pub use error::{PredicateError, PredicateResult};
pub use eval::compare_values;
pub use expr::{field, foreign, local, member, value, CompareOp, Expr, Param};
pub use normalize::{normalize, normalize_expr};
pub use predicate::{Predicate, PredicateKey, Term};
pub use project::project;
pub use query::{Clause, ClauseKind, Query};

#[cfg(test)]
pub(crate) mod test_support {
    use atlas_types::{Document, FieldKind, FromValue, Schema, SchemaBuilder, TypeError, Value};

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Person {
        pub id: i64,
        pub name: String,
        pub age: i64,
        pub score: f64,
        pub active: bool,
        pub manager: Option<i64>,
    }

    impl Document for Person {
        fn describe() -> SchemaBuilder {
            Schema::builder("Person")
                .key("id", FieldKind::Int)
                .field("name", FieldKind::Text)
                .field("age", FieldKind::Int)
                .field("score", FieldKind::Float)
                .field("active", FieldKind::Bool)
                .nullable("manager", FieldKind::Int)
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.clone().into()),
                "age" => Some(self.age.into()),
                "score" => Some(self.score.into()),
                "active" => Some(self.active.into()),
                "manager" => Some(self.manager.into()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> Result<(), TypeError> {
            match field {
                "id" => self.id = FromValue::from_value(value)?,
                "name" => self.name = FromValue::from_value(value)?,
                "age" => self.age = FromValue::from_value(value)?,
                "score" => self.score = FromValue::from_value(value)?,
                "active" => self.active = FromValue::from_value(value)?,
                "manager" => self.manager = FromValue::from_value(value)?,
                other => return Err(TypeError::UnknownField(other.to_string())),
            }
            Ok(())
        }
    }

    pub fn person(id: i64, name: &str, age: i64) -> Person {
        Person {
            id,
            name: name.into(),
            age,
            ..Person::default()
        }
    }

    pub fn person_schema() -> Schema {
        Schema::of::<Person>().unwrap()
    }
}
