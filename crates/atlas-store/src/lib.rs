//! Concurrent per-type document storage for Atlas.
//!
//! A [`DocumentStore`] holds the canonical copy of every cached document of
//! one type, keyed by the hash of its key fields. It owns the type's
//! secondary [`FieldIndex`]es, its compiled-predicate cache, and the event
//! stream change listeners subscribe to.
//!
//! # Consistency Rules
//!
//! 1. `upsert` and `delete` are the only mutations.
//! 2. Each mutation replaces the map entry and maintains every index while
//!    holding the key's stripe lock, so a document always ends up in exactly
//!    one bucket per index.
//! 3. Events are emitted after the stripe lock is released, synchronously
//!    with respect to the mutating call.
//! 4. Readers take no key locks. Index candidates are re-read from the map
//!    and re-checked against the predicate.

pub mod error;
pub mod event;
pub mod index;
pub mod locks;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use event::{DocumentEvent, EventHandler, EventKind, EventRouter, EventStream, SubscriptionId};
pub use index::FieldIndex;
pub use locks::KeyLocks;
pub use store::{DocumentStore, KeyedLookup, StoreConfig, Upsert};

#[cfg(test)]
pub(crate) mod test_support {
    use atlas_types::{Document, FieldKind, FromValue, Schema, SchemaBuilder, TypeError, Value};

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Item {
        pub id: i64,
        pub category: String,
        pub price: f64,
        pub owner: Option<i64>,
    }

    impl Document for Item {
        fn describe() -> SchemaBuilder {
            Schema::builder("Item")
                .key("id", FieldKind::Int)
                .field("category", FieldKind::Text)
                .field("price", FieldKind::Float)
                .nullable("owner", FieldKind::Int)
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "id" => Some(self.id.into()),
                "category" => Some(self.category.clone().into()),
                "price" => Some(self.price.into()),
                "owner" => Some(self.owner.into()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> Result<(), TypeError> {
            match field {
                "id" => self.id = FromValue::from_value(value)?,
                "category" => self.category = FromValue::from_value(value)?,
                "price" => self.price = FromValue::from_value(value)?,
                "owner" => self.owner = FromValue::from_value(value)?,
                other => return Err(TypeError::UnknownField(other.to_string())),
            }
            Ok(())
        }
    }

    pub fn item(id: i64, category: &str, price: f64) -> Item {
        Item {
            id,
            category: category.into(),
            price,
            owner: None,
        }
    }

    pub fn item_schema() -> Schema {
        Schema::of::<Item>().unwrap()
    }
}
