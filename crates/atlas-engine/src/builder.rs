use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use atlas_query::Expr;
use atlas_store::{DocumentStore, StoreConfig};
use atlas_types::{Document, Schema};
use tracing::info;

use crate::atlas::{Atlas, Registered};
use crate::collection::{Collection, ErasedCollection};
use crate::config::AtlasConfig;
use crate::error::{AtlasError, AtlasResult};
use crate::relation::{Cardinality, ErasedRelation, Relation};
use crate::source::Source;

/// Registers document types and builds an [`Atlas`].
///
/// Registration happens once: every schema, index, relation, and source is
/// fixed by [`AtlasBuilder::build`].
#[derive(Default)]
pub struct AtlasBuilder {
    config: AtlasConfig,
    documents: Vec<Box<dyn PendingDocument>>,
}

impl AtlasBuilder {
    /// A builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: AtlasConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a document type.
    pub fn document<D: Document>(mut self, document: DocumentBuilder<D>) -> Self {
        self.documents.push(Box::new(document));
        self
    }

    /// Validate every registration, check relations against their targets,
    /// and run requested preloads.
    pub async fn build(self) -> AtlasResult<Atlas> {
        self.config.validate()?;
        let store_config = self.config.store_config();

        let mut collections: HashMap<TypeId, Registered> = HashMap::new();
        for pending in self.documents {
            let id = pending.document_type();
            if collections.contains_key(&id) {
                return Err(AtlasError::DuplicateDocument(pending.type_name().to_string()));
            }
            collections.insert(id, pending.install(&store_config)?);
        }

        let schemas: HashMap<TypeId, Schema> = collections
            .iter()
            .map(|(id, r)| (*id, r.erased.schema().clone()))
            .collect();
        for registered in collections.values() {
            registered.erased.validate_relations(&schemas)?;
        }

        let timeout = self.config.source_timeout();
        for registered in collections.values() {
            if registered.erased.wants_preload() {
                registered.erased.preload(timeout).await?;
            }
        }

        info!(documents = collections.len(), "atlas built");
        Ok(Atlas::from_parts(collections, self.config))
    }
}

/// Registration of one document type.
pub struct DocumentBuilder<D: Document> {
    source: Option<Arc<dyn Source<D>>>,
    indexes: Vec<String>,
    relations: Vec<Arc<dyn ErasedRelation<D>>>,
    preload: bool,
}

impl<D: Document> DocumentBuilder<D> {
    /// A builder with no source, indexes or relations yet.
    pub fn new() -> Self {
        Self {
            source: None,
            indexes: Vec::new(),
            relations: Vec::new(),
            preload: false,
        }
    }

    /// Read documents from `source`.
    pub fn source(self, source: impl Source<D> + 'static) -> Self {
        self.shared_source(Arc::new(source))
    }

    /// Read documents from a source shared with the caller.
    pub fn shared_source(mut self, source: Arc<dyn Source<D>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Maintain an equality index on `field`.
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }

    /// Declare a relation to `F`, matched by an expression over
    /// [`atlas_query::local`] and [`atlas_query::foreign`] members.
    pub fn relation<F: Document>(
        mut self,
        name: impl Into<String>,
        cardinality: Cardinality,
        matcher: Expr,
    ) -> Self {
        self.relations
            .push(Arc::new(Relation::<D, F>::new(name, cardinality, matcher)));
        self
    }

    /// Load every document when the atlas is built.
    pub fn preload(mut self) -> Self {
        self.preload = true;
        self
    }
}

impl<D: Document> Default for DocumentBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

trait PendingDocument: Send {
    fn document_type(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn install(self: Box<Self>, config: &StoreConfig) -> AtlasResult<Registered>;
}

impl<D: Document> PendingDocument for DocumentBuilder<D> {
    fn document_type(&self) -> TypeId {
        TypeId::of::<D>()
    }

    fn type_name(&self) -> &'static str {
        type_name::<D>()
    }

    fn install(self: Box<Self>, config: &StoreConfig) -> AtlasResult<Registered> {
        let schema = Schema::of::<D>()?;
        let source = self
            .source
            .ok_or_else(|| AtlasError::MissingSource(schema.name().to_string()))?;
        if self.preload && !source.supports_caching() {
            return Err(AtlasError::PreloadNotSupported(schema.name().to_string()));
        }

        let mut relations = HashMap::new();
        for relation in self.relations {
            let name = relation.name().to_string();
            if relations.contains_key(&name) {
                return Err(AtlasError::DuplicateRelation {
                    document: schema.name().to_string(),
                    relation: name,
                });
            }
            relations.insert(name, relation);
        }

        let mut store = DocumentStore::new(schema, config);
        for field in &self.indexes {
            store.add_index(field)?;
        }

        let collection = Arc::new(Collection::new(store, source, relations, self.preload));
        Ok(Registered {
            typed: Arc::clone(&collection) as Arc<dyn Any + Send + Sync>,
            erased: collection as Arc<dyn ErasedCollection>,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{team, user, Member, Team, User};
    use crate::memory::InMemorySource;
    use atlas_query::{foreign, local, PredicateError};
    use atlas_store::StoreError;

    fn users() -> DocumentBuilder<User> {
        DocumentBuilder::new().source(InMemorySource::with_rows([user(1, "ann")]).unwrap())
    }

    #[tokio::test]
    async fn builds_and_preloads() {
        let atlas = AtlasBuilder::new()
            .document(users().index("name").preload())
            .build()
            .await
            .unwrap();
        assert!(atlas.is_preloaded::<User>().unwrap());
        assert_eq!(atlas.store::<User>().unwrap().len(), 1);
        assert_eq!(atlas.document_names(), ["User"]);
    }

    #[tokio::test]
    async fn rejects_duplicate_registration() {
        let err = AtlasBuilder::new()
            .document(users())
            .document(users())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::DuplicateDocument(_)));
    }

    #[tokio::test]
    async fn rejects_missing_source() {
        let err = AtlasBuilder::new()
            .document(DocumentBuilder::<User>::new())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::MissingSource(name) if name == "User"));
    }

    #[tokio::test]
    async fn rejects_preloading_a_non_caching_source() {
        let source = InMemorySource::<User>::new().unwrap().without_cache();
        let err = AtlasBuilder::new()
            .document(DocumentBuilder::new().source(source).preload())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::PreloadNotSupported(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_index_field() {
        let err = AtlasBuilder::new()
            .document(users().index("email"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AtlasError::Store(StoreError::UnknownIndexField { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = AtlasConfig {
            key_lock_stripes: 0,
            ..AtlasConfig::default()
        };
        let err = AtlasBuilder::new()
            .with_config(config)
            .document(users())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::Config(_)));
    }

    #[tokio::test]
    async fn validates_relations() {
        let members = || DocumentBuilder::<Member>::new().source(InMemorySource::new().unwrap());
        let teams = || {
            DocumentBuilder::<Team>::new()
                .source(InMemorySource::with_rows([team(1, "core")]).unwrap())
        };

        let unregistered = AtlasBuilder::new()
            .document(members().relation::<Team>(
                "team",
                Cardinality::One,
                local("team_id").equals(foreign("id")),
            ))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(unregistered, AtlasError::UnregisteredTarget { .. }));

        let bad_field = AtlasBuilder::new()
            .document(members().relation::<Team>(
                "team",
                Cardinality::One,
                local("team_id").equals(foreign("code")),
            ))
            .document(teams())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            bad_field,
            AtlasError::Predicate(PredicateError::UnknownField { .. })
        ));

        let duplicate = AtlasBuilder::new()
            .document(
                members()
                    .relation::<Team>("team", Cardinality::One, local("team_id").equals(foreign("id")))
                    .relation::<Team>("team", Cardinality::One, local("team_id").equals(foreign("id"))),
            )
            .document(teams())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(duplicate, AtlasError::DuplicateRelation { .. }));

        AtlasBuilder::new()
            .document(members().relation::<Team>(
                "team",
                Cardinality::One,
                local("team_id").equals(foreign("id")),
            ))
            .document(teams())
            .build()
            .await
            .unwrap();
    }
}
