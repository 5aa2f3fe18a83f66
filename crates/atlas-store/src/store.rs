use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use atlas_query::{project, CacheStats, CompiledPredicate, Predicate, PredicateCache};
use atlas_types::{Document, KeyHash, Schema};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::event::{DocumentEvent, EventHandler, EventRouter, EventStream, SubscriptionId};
use crate::index::FieldIndex;
use crate::locks::KeyLocks;

/// Tuning knobs for a [`DocumentStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of per-key mutation locks.
    pub key_lock_stripes: usize,
    /// Maximum number of compiled predicates kept before the cache is reset.
    pub compiled_predicate_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_lock_stripes: 64,
            compiled_predicate_capacity: 1024,
        }
    }
}

/// Outcome of [`DocumentStore::upsert`].
#[derive(Debug)]
pub struct Upsert<D> {
    /// The instance now stored.
    pub document: Arc<D>,
    /// The instance it replaced, if the key was already present.
    pub previous: Option<Arc<D>>,
}

impl<D> Upsert<D> {
    /// Returns `true` if an older copy was replaced.
    pub fn replaced(&self) -> bool {
        self.previous.is_some()
    }
}

/// Outcome of a keyed lookup.
#[derive(Debug)]
pub enum KeyedLookup<D> {
    /// The predicate does not assign every key field.
    Unkeyed,
    /// The key is fully pinned but not present in the store.
    Absent,
    /// The keyed document exists and satisfies the whole predicate.
    Found(Arc<D>),
    /// The keyed document exists but fails the rest of the predicate.
    Rejected,
}

impl<D> KeyedLookup<D> {
    /// The answer the lookup settled on, or `None` if resolution must go on.
    pub fn resolved(self) -> Option<Vec<Arc<D>>> {
        match self {
            Self::Found(doc) => Some(vec![doc]),
            Self::Rejected => Some(Vec::new()),
            Self::Unkeyed | Self::Absent => None,
        }
    }
}

/// The canonical in-memory copy of one document type.
///
/// Documents are keyed by the hash of their key fields. `upsert` and `delete`
/// are the only mutations; each one updates the map and every index under the
/// key's stripe lock, then emits its event after the lock is released.
pub struct DocumentStore<D> {
    schema: Schema,
    documents: RwLock<HashMap<KeyHash, Arc<D>>>,
    indexes: Vec<FieldIndex<D>>,
    locks: KeyLocks,
    events: EventRouter<D>,
    predicates: PredicateCache<D>,
}

impl<D: Document> DocumentStore<D> {
    /// Create a store for `D` using the schema it describes.
    pub fn for_document(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(Schema::of::<D>()?, config))
    }

    /// An empty store for documents described by `schema`.
    pub fn new(schema: Schema, config: &StoreConfig) -> Self {
        Self {
            schema,
            documents: RwLock::new(HashMap::new()),
            indexes: Vec::new(),
            locks: KeyLocks::new(config.key_lock_stripes),
            events: EventRouter::new(),
            predicates: PredicateCache::new(config.compiled_predicate_capacity),
        }
    }

    /// Schema of the stored type.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Document type name, for logs and errors.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    // ------------------------------------------------------------------
    // Index declaration
    // ------------------------------------------------------------------

    /// Declare a secondary index on `field`. Only allowed while empty.
    pub fn add_index(&mut self, field: &str) -> StoreResult<()> {
        if self.schema.field(field).is_none() {
            return Err(StoreError::UnknownIndexField {
                document: self.name().to_string(),
                field: field.to_string(),
            });
        }
        if self.indexes.iter().any(|i| i.field() == field) {
            return Err(StoreError::DuplicateIndex {
                document: self.name().to_string(),
                field: field.to_string(),
            });
        }
        let count = self.len();
        if count > 0 {
            return Err(StoreError::IndexAfterLoad {
                document: self.name().to_string(),
                field: field.to_string(),
                count,
            });
        }
        self.indexes.push(FieldIndex::new(field));
        Ok(())
    }

    /// Secondary indexes, in declaration order.
    pub fn indexes(&self) -> &[FieldIndex<D>] {
        &self.indexes
    }

    /// The secondary index on `field`, if declared.
    pub fn index(&self, field: &str) -> Option<&FieldIndex<D>> {
        self.indexes.iter().find(|i| i.field() == field)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert or replace a document and emit `Loaded` or `Updated`.
    pub fn upsert(&self, document: D) -> Upsert<D> {
        let key = self.schema.key_hash(&document);
        let document = Arc::new(document);

        let previous = {
            let _guard = self.locks.lock(&key);
            let previous = self.documents.write().insert(key, Arc::clone(&document));
            for index in &self.indexes {
                index.update(key, &document, previous.as_deref());
            }
            previous
        };

        match &previous {
            Some(old) => {
                debug!(document = self.name(), %key, "document replaced");
                self.events.emit(DocumentEvent::Updated {
                    new: Arc::clone(&document),
                    old: Arc::clone(old),
                });
            }
            None => self.events.emit(DocumentEvent::Loaded(Arc::clone(&document))),
        }

        Upsert { document, previous }
    }

    /// Remove the document sharing `document`'s key and emit `Deleted`.
    ///
    /// Returns the instance that was stored. Deleting an absent key is a no-op.
    pub fn delete(&self, document: &D) -> Option<Arc<D>> {
        self.delete_key(&self.schema.key_hash(document))
    }

    /// Remove the document stored under `key`.
    pub fn delete_key(&self, key: &KeyHash) -> Option<Arc<D>> {
        let removed = {
            let _guard = self.locks.lock(key);
            let removed = self.documents.write().remove(key)?;
            for index in &self.indexes {
                index.remove(*key, &removed);
            }
            removed
        };
        self.events.emit(DocumentEvent::Deleted(Arc::clone(&removed)));
        Some(removed)
    }

    /// Re-emit `Updated(doc, doc)` for every document matching `predicate`.
    ///
    /// The store is not modified. Returns the number of events emitted.
    pub fn trigger_update(&self, predicate: Option<&Predicate>) -> usize {
        let matching = self.query(predicate);
        for doc in &matching {
            self.events.emit(DocumentEvent::Updated {
                new: Arc::clone(doc),
                old: Arc::clone(doc),
            });
        }
        matching.len()
    }

    /// Drop every document and index entry without emitting events.
    pub fn clear(&self) {
        let mut documents = self.documents.write();
        documents.clear();
        for index in &self.indexes {
            index.clear();
        }
        self.predicates.clear();
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Key hash of `document`.
    pub fn key_of(&self, document: &D) -> KeyHash {
        self.schema.key_hash(document)
    }

    /// The document stored under `key`.
    pub fn get(&self, key: &KeyHash) -> Option<Arc<D>> {
        self.documents.read().get(key).cloned()
    }

    /// The stored document sharing `document`'s key.
    pub fn find(&self, document: &D) -> Option<Arc<D>> {
        self.get(&self.key_of(document))
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Snapshot of every stored document.
    pub fn documents(&self) -> Vec<Arc<D>> {
        self.documents.read().values().cloned().collect()
    }

    /// Answer a predicate from memory.
    ///
    /// With no predicate every document is returned. Otherwise the key sets of
    /// all indexes the predicate pins are intersected and the candidates are
    /// re-checked against the store and the compiled predicate; if no index
    /// helps, every document is scanned.
    pub fn query(&self, predicate: Option<&Predicate>) -> Vec<Arc<D>> {
        let Some(predicate) = predicate else {
            return self.documents();
        };
        if predicate.is_never() {
            return Vec::new();
        }

        let started = Instant::now();
        let compiled = self.predicates.get_or_compile(predicate);
        let results: Vec<Arc<D>> = match self.index_candidates(predicate) {
            Some(keys) => {
                let documents = self.documents.read();
                keys.iter()
                    .filter_map(|key| documents.get(key))
                    .filter(|doc| compiled.matches(doc))
                    .cloned()
                    .collect()
            }
            None => {
                debug!(document = self.name(), %predicate, "index miss; scanning store");
                self.documents
                    .read()
                    .values()
                    .filter(|doc| compiled.matches(doc))
                    .cloned()
                    .collect()
            }
        };
        trace!(
            document = self.name(),
            %predicate,
            count = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "memory query"
        );
        results
    }

    fn index_candidates(&self, predicate: &Predicate) -> Option<HashSet<KeyHash>> {
        let mut candidates: Option<HashSet<KeyHash>> = None;
        for keys in self.indexes.iter().filter_map(|i| i.matches(predicate)) {
            candidates = Some(match candidates {
                Some(current) => current.intersection(&keys).copied().collect(),
                None => keys,
            });
        }
        candidates
    }

    /// Resolve a predicate that pins every key field by direct lookup.
    pub fn find_by_key(&self, predicate: &Predicate) -> KeyedLookup<D> {
        let projected: D = project(predicate);
        if !self.schema.all_keys_assigned(&projected) {
            return KeyedLookup::Unkeyed;
        }

        let key = self.schema.key_hash(&projected);
        let Some(found) = self.get(&key) else {
            trace!(document = self.name(), %key, "keyed lookup absent");
            return KeyedLookup::Absent;
        };

        if self.predicates.get_or_compile(predicate).matches(&found) {
            KeyedLookup::Found(found)
        } else {
            debug!(
                document = self.name(),
                %predicate,
                stored = %self.schema.describe(&*found),
                "keyed near miss"
            );
            KeyedLookup::Rejected
        }
    }

    /// The compiled form of `predicate`, cached per store.
    pub fn compiled(&self, predicate: &Predicate) -> Arc<CompiledPredicate<D>> {
        self.predicates.get_or_compile(predicate)
    }

    /// Counters for the compiled predicate cache.
    pub fn predicate_stats(&self) -> CacheStats {
        self.predicates.stats()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a synchronous event handler.
    pub fn subscribe(&self, handler: EventHandler<D>) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Open a broadcast channel of subsequent events.
    pub fn channel(&self, capacity: usize) -> EventStream<D> {
        self.events.channel(capacity)
    }

    /// The router events are published through.
    pub fn events(&self) -> &EventRouter<D> {
        &self.events
    }
}
