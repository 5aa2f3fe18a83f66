use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use atlas_query::{Predicate, PredicateKey};
use atlas_store::DocumentStore;
use atlas_types::{Document, Schema};
use tracing::{debug, info, trace};

use crate::error::{AtlasError, AtlasResult, SourceResult};
use crate::flags::{CacheFlag, ExecutionFlags};
use crate::relation::ErasedRelation;
use crate::source::{Source, SourceRecord};

/// Everything registered for one document type: its store, its source, and
/// its outgoing relations.
pub(crate) struct Collection<D: Document> {
    store: Arc<DocumentStore<D>>,
    source: Arc<dyn Source<D>>,
    relations: HashMap<String, Arc<dyn ErasedRelation<D>>>,
    preload: bool,
    preloaded: AtomicBool,
}

impl<D: Document> Collection<D> {
    pub(crate) fn new(
        store: DocumentStore<D>,
        source: Arc<dyn Source<D>>,
        relations: HashMap<String, Arc<dyn ErasedRelation<D>>>,
        preload: bool,
    ) -> Self {
        Self {
            store: Arc::new(store),
            source,
            relations,
            preload,
            preloaded: AtomicBool::new(false),
        }
    }

    pub(crate) fn store(&self) -> &Arc<DocumentStore<D>> {
        &self.store
    }

    pub(crate) fn schema(&self) -> &Schema {
        self.store.schema()
    }

    pub(crate) fn relation(&self, name: &str) -> Option<&Arc<dyn ErasedRelation<D>>> {
        self.relations.get(name)
    }

    pub(crate) fn is_preloaded(&self) -> bool {
        self.preloaded.load(Ordering::Acquire)
    }

    /// Answer one normalized read.
    pub(crate) async fn resolve(
        &self,
        predicate: Option<&Predicate>,
        cache: CacheFlag,
        flags: ExecutionFlags,
        timeout: Option<Duration>,
    ) -> AtlasResult<Vec<Arc<D>>> {
        if predicate.is_some_and(Predicate::is_never) {
            trace!(document = self.store.name(), "predicate never matches");
            return Ok(Vec::new());
        }

        if cache != CacheFlag::BypassCache {
            if let Some(p) = predicate {
                if let Some(found) = self.store.find_by_key(p).resolved() {
                    trace!(document = self.store.name(), predicate = %p, count = found.len(), "keyed lookup");
                    return Ok(found);
                }
            }
        }

        let from_memory = match cache {
            CacheFlag::OnlyCache => true,
            CacheFlag::Default => self.is_preloaded(),
            CacheFlag::BypassCache => false,
        };
        if from_memory {
            return Ok(self.store.query(predicate));
        }

        let started = Instant::now();
        let records = self
            .call_source(timeout, self.source.fetch(predicate, flags))
            .await?;
        let documents: Vec<Arc<D>> = records.into_iter().map(|r| self.reconcile(r)).collect();
        trace!(
            document = self.store.name(),
            predicate = %PredicateKey::of(predicate),
            count = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "source query"
        );
        Ok(documents)
    }

    /// Store a cacheable record, or drop any cached copy of a transient one.
    pub(crate) fn reconcile(&self, record: SourceRecord<D>) -> Arc<D> {
        if record.cacheable {
            return self.store.upsert(record.document).document;
        }
        let document = Arc::new(record.document);
        if self.store.delete(&document).is_some() {
            debug!(
                document = self.store.name(),
                stored = %self.schema().describe(&*document),
                "transient record evicted cached copy"
            );
        }
        document
    }

    async fn load_all(&self, timeout: Option<Duration>) -> AtlasResult<usize> {
        if !self.source.supports_caching() {
            return Err(AtlasError::PreloadNotSupported(self.store.name().to_string()));
        }

        let started = Instant::now();
        debug!(document = self.store.name(), "preloading");
        let records = self
            .call_source(timeout, self.source.fetch(None, ExecutionFlags::empty()))
            .await?;
        let mut count = 0;
        for record in records {
            if record.cacheable {
                count += 1;
            }
            self.reconcile(record);
        }
        self.preloaded.store(true, Ordering::Release);
        info!(
            document = self.store.name(),
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preload complete"
        );
        Ok(count)
    }

    async fn call_source<T>(
        &self,
        timeout: Option<Duration>,
        call: impl Future<Output = SourceResult<T>>,
    ) -> AtlasResult<T> {
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                AtlasError::SourceTimeout {
                    document: self.store.name().to_string(),
                    timeout: limit,
                }
            })?,
            None => call.await,
        };
        result.map_err(|source| AtlasError::Source {
            document: self.store.name().to_string(),
            source,
        })
    }
}

/// The type-independent face of a [`Collection`], used at build and dispose time.
#[async_trait]
pub(crate) trait ErasedCollection: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &Schema;

    fn wants_preload(&self) -> bool;

    async fn preload(&self, timeout: Option<Duration>) -> AtlasResult<usize>;

    /// Check every relation against its target's schema.
    fn validate_relations(&self, schemas: &HashMap<TypeId, Schema>) -> AtlasResult<()>;

    fn dispose(&self);
}

#[async_trait]
impl<D: Document> ErasedCollection for Collection<D> {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn schema(&self) -> &Schema {
        self.store.schema()
    }

    fn wants_preload(&self) -> bool {
        self.preload
    }

    async fn preload(&self, timeout: Option<Duration>) -> AtlasResult<usize> {
        self.load_all(timeout).await
    }

    fn validate_relations(&self, schemas: &HashMap<TypeId, Schema>) -> AtlasResult<()> {
        for relation in self.relations.values() {
            let foreign = schemas.get(&relation.target()).ok_or_else(|| {
                AtlasError::UnregisteredTarget {
                    document: self.name().to_string(),
                    relation: relation.name().to_string(),
                    target: relation.target_name(),
                }
            })?;
            relation.validate(self.schema(), foreign)?;
        }
        Ok(())
    }

    fn dispose(&self) {
        self.store.clear();
        self.preloaded.store(false, Ordering::Release);
        self.source.dispose();
    }
}
