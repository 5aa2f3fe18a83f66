use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::SchemaError;
use crate::key::KeyHash;
use crate::value::{FieldKind, Value};

/// One declared field of a document schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Part of the document's identity.
    pub key: bool,
    /// May hold `Value::Null`.
    pub nullable: bool,
}

impl FieldDef {
    /// A field named `name` of kind `kind`.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            key: false,
            nullable: false,
        }
    }
}

/// Validated, immutable description of a document type.
///
/// Built once per document type through [`SchemaBuilder`] and shared by the
/// store, its indexes, and the predicate normalizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
}

impl Schema {
    /// Start describing a document type.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Build and validate the schema a document type describes.
    pub fn of<D: Document>() -> Result<Self, SchemaError> {
        D::describe().build()
    }

    /// Document type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every field, in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The field called `name`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Key fields in declaration order.
    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.key)
    }

    /// Returns `true` if `name` is part of the key.
    pub fn is_key(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.key)
    }

    /// Identity hash of a document under this schema.
    pub fn key_hash<D: Document>(&self, document: &D) -> KeyHash {
        KeyHash::compute(
            self.key_fields()
                .map(|f| (f.name.as_str(), document.get(&f.name).unwrap_or(Value::Null))),
        )
    }

    /// Returns `true` if every key field holds a non-default value.
    pub fn all_keys_assigned<D: Document>(&self, document: &D) -> bool {
        self.key_fields().all(|f| {
            document
                .get(&f.name)
                .is_some_and(|value| !value.is_default())
        })
    }

    /// Render a document's fields as `name=value` pairs for diagnostics.
    pub fn describe<D: Document>(&self, document: &D) -> String {
        self.fields
            .iter()
            .map(|f| {
                let value = document.get(&f.name).unwrap_or(Value::Null);
                format!("{}={}", f.name, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builder that declares a document type's fields.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    /// Declare a key field.
    pub fn key(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let mut def = FieldDef::new(name, kind);
        def.key = true;
        self.fields.push(def);
        self
    }

    /// Declare a plain, non-nullable field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Declare a plain field that may hold null.
    pub fn nullable(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let mut def = FieldDef::new(name, kind);
        def.nullable = true;
        self.fields.push(def);
        self
    }

    /// Declare a field from a full definition.
    pub fn with(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Validate the declarations and produce the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }

        let mut seen = HashSet::new();
        for def in &self.fields {
            if def.name.is_empty() {
                return Err(SchemaError::EmptyField {
                    document: self.name.clone(),
                });
            }
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    document: self.name.clone(),
                    field: def.name.clone(),
                });
            }
            if def.key && def.nullable {
                return Err(SchemaError::NullableKey {
                    document: self.name.clone(),
                    field: def.name.clone(),
                });
            }
        }

        if !self.fields.iter().any(|f| f.key) {
            return Err(SchemaError::MissingKey {
                document: self.name,
            });
        }

        Ok(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> Schema {
        Schema::builder("Order")
            .key("region", FieldKind::Text)
            .key("number", FieldKind::Int)
            .field("total", FieldKind::Float)
            .nullable("customer", FieldKind::Int)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let schema = order_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["region", "number", "total", "customer"]);
        let keys: Vec<_> = schema.key_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(keys, ["region", "number"]);
    }

    #[test]
    fn lookup_by_name() {
        let schema = order_schema();
        assert!(schema.is_key("number"));
        assert!(!schema.is_key("total"));
        assert!(schema.field("customer").unwrap().nullable);
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = Schema::builder("Note")
            .field("body", FieldKind::Text)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingKey {
                document: "Note".into()
            }
        );
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let err = Schema::builder("Note")
            .key("id", FieldKind::Int)
            .field("id", FieldKind::Text)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { field, .. } if field == "id"));
    }

    #[test]
    fn nullable_key_is_rejected() {
        let mut def = FieldDef::new("id", FieldKind::Int);
        def.key = true;
        def.nullable = true;
        let err = Schema::builder("Note").with(def).build().unwrap_err();
        assert!(matches!(err, SchemaError::NullableKey { .. }));
    }

    #[test]
    fn empty_names_are_rejected() {
        assert_eq!(
            Schema::builder("").key("id", FieldKind::Int).build().unwrap_err(),
            SchemaError::EmptyName
        );
        assert!(matches!(
            Schema::builder("Note").key("", FieldKind::Int).build(),
            Err(SchemaError::EmptyField { .. })
        ));
    }
}
