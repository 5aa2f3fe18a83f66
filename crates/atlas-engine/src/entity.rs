use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use atlas_types::Document;

use crate::atlas::Atlas;
use crate::context::{DocumentSet, QueryContext};
use crate::error::AtlasResult;
use crate::flags::QueryOptions;
use crate::relation::Cardinality;

/// The read a document was returned by: relations it navigates reuse the
/// same context and options.
#[derive(Clone)]
pub(crate) struct Scope {
    pub(crate) atlas: Atlas,
    pub(crate) context: QueryContext,
    pub(crate) options: QueryOptions,
}

/// A document returned by a read, able to navigate its relations.
///
/// Dereferences to the document itself.
#[derive(Clone)]
pub struct Entity<D> {
    document: Arc<D>,
    scope: Scope,
}

impl<D: Document> Entity<D> {
    pub(crate) fn new(document: Arc<D>, scope: Scope) -> Self {
        Self { document, scope }
    }

    /// The shared document instance.
    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    /// Drop the read scope and keep the document.
    pub fn into_inner(self) -> Arc<D> {
        self.document
    }

    /// The context shared by every read this entity leads to.
    pub fn context(&self) -> &QueryContext {
        &self.scope.context
    }

    /// Resolve the relation `name`, whatever its cardinality.
    pub async fn related<F: Document>(&self, name: &str) -> AtlasResult<Related<F>> {
        self.resolve(name, None).await
    }

    /// Resolve a [`Cardinality::One`] relation.
    pub async fn one<F: Document>(&self, name: &str) -> AtlasResult<Option<Entity<F>>> {
        match self.resolve(name, Some(Cardinality::One)).await? {
            Related::One(found) => Ok(found),
            Related::Many(set) => Ok(set.first()),
        }
    }

    /// Resolve a [`Cardinality::Many`] relation.
    pub async fn many<F: Document>(&self, name: &str) -> AtlasResult<Documents<F>> {
        match self.resolve(name, Some(Cardinality::Many)).await? {
            Related::Many(set) => Ok(set),
            Related::One(found) => Ok(Documents::from_entity(found, self.scope.clone())),
        }
    }

    async fn resolve<F: Document>(
        &self,
        name: &str,
        expected: Option<Cardinality>,
    ) -> AtlasResult<Related<F>> {
        self.scope
            .atlas
            .resolve_relation::<D, F>(&self.document, name, &self.scope, expected)
            .await
    }
}

impl<D> Deref for Entity<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.document
    }
}

impl<D: fmt::Debug> fmt::Debug for Entity<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&self.document).finish()
    }
}

/// The result set of a read.
///
/// Two reads of the same predicate through the same [`QueryContext`] return
/// the same underlying set; see [`Documents::same_set`].
#[derive(Clone)]
pub struct Documents<D> {
    set: DocumentSet<D>,
    scope: Scope,
}

impl<D: Document> Documents<D> {
    pub(crate) fn new(set: DocumentSet<D>, scope: Scope) -> Self {
        Self { set, scope }
    }

    fn from_entity(entity: Option<Entity<D>>, scope: Scope) -> Self {
        let set = entity.into_iter().map(Entity::into_inner).collect();
        Self::new(Arc::new(set), scope)
    }

    /// Number of documents in the set.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if the read matched nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// The document at `index`, carrying this read's scope.
    pub fn get(&self, index: usize) -> Option<Entity<D>> {
        self.set
            .get(index)
            .map(|doc| Entity::new(Arc::clone(doc), self.scope.clone()))
    }

    /// The first document, if any.
    pub fn first(&self) -> Option<Entity<D>> {
        self.get(0)
    }

    /// Iterate the documents in result order.
    pub fn iter(&self) -> impl Iterator<Item = Entity<D>> + '_ {
        self.set
            .iter()
            .map(|doc| Entity::new(Arc::clone(doc), self.scope.clone()))
    }

    /// The shared set backing this result.
    pub fn set(&self) -> &DocumentSet<D> {
        &self.set
    }

    /// Returns `true` if both results are the same memoized set.
    pub fn same_set(&self, other: &Documents<D>) -> bool {
        Arc::ptr_eq(&self.set, &other.set)
    }

    /// Copy the shared instances out of the set.
    pub fn to_vec(&self) -> Vec<Arc<D>> {
        self.set.to_vec()
    }
}

impl<D: fmt::Debug> fmt::Debug for Documents<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.set.iter()).finish()
    }
}

/// The outcome of navigating a relation.
#[derive(Clone, Debug)]
pub enum Related<F> {
    One(Option<Entity<F>>),
    Many(Documents<F>),
}

impl<F: Document> Related<F> {
    /// Every related document, regardless of cardinality.
    pub fn to_vec(&self) -> Vec<Arc<F>> {
        match self {
            Self::One(found) => found.iter().map(|e| Arc::clone(e.document())).collect(),
            Self::Many(set) => set.to_vec(),
        }
    }
}
