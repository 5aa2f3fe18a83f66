use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use atlas_query::{normalize, Predicate, Query};
use atlas_types::{Document, KeyHash, Schema};
use parking_lot::{Mutex, RwLock};

use crate::error::{AtlasResult, SourceError, SourceResult};
use crate::flags::ExecutionFlags;
use crate::source::{Source, SourceRecord};

/// In-memory [`Source`] for tests and embedding.
///
/// Rows are keyed like the document store, so inserting a row with an
/// existing key replaces it. A declarative filter hides rows from ordinary
/// reads; with [`ExecutionFlags::BYPASS_FILTER`] the hidden rows are returned
/// as transient records instead.
pub struct InMemorySource<D> {
    schema: Schema,
    rows: RwLock<HashMap<KeyHash, D>>,
    filter: Option<Predicate>,
    caching: bool,
    latency: Option<Duration>,
    failure: Mutex<Option<String>>,
    fetches: AtomicUsize,
    disposed: AtomicBool,
}

impl<D: Document> InMemorySource<D> {
    /// An empty source.
    pub fn new() -> AtlasResult<Self> {
        Ok(Self {
            schema: Schema::of::<D>()?,
            rows: RwLock::new(HashMap::new()),
            filter: None,
            caching: true,
            latency: None,
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    /// A source holding `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = D>) -> AtlasResult<Self> {
        let source = Self::new()?;
        for row in rows {
            source.insert(row);
        }
        Ok(source)
    }

    /// Hide rows that do not match `filter` from ordinary reads.
    pub fn with_filter(mut self, filter: impl Into<Query>) -> AtlasResult<Self> {
        self.filter = normalize(&filter.into(), &self.schema)?;
        Ok(self)
    }

    /// Mark every record this source returns as not cacheable.
    pub fn without_cache(mut self) -> Self {
        self.caching = false;
        self
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a row, matched by key.
    pub fn insert(&self, row: D) {
        let key = self.schema.key_hash(&row);
        self.rows.write().insert(key, row);
    }

    /// Remove the row sharing `row`'s key. Returns `false` if absent.
    pub fn remove(&self, row: &D) -> bool {
        let key = self.schema.key_hash(row);
        self.rows.write().remove(&key).is_some()
    }

    /// Number of rows held, including filtered ones.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of fetches served, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fail every subsequent fetch with [`SourceError::Unavailable`].
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Clear a failure set with `fail_with`.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Returns `true` once the engine has disposed this source.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn visible(&self, row: &D) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(row))
    }
}

#[async_trait]
impl<D: Document> Source<D> for InMemorySource<D> {
    async fn fetch(
        &self,
        predicate: Option<&Predicate>,
        flags: ExecutionFlags,
    ) -> SourceResult<Vec<SourceRecord<D>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(SourceError::Unavailable(message));
        }

        let bypass = flags.contains(ExecutionFlags::BYPASS_FILTER);
        let rows = self.rows.read();
        let records = rows
            .values()
            .filter(|row| predicate.map_or(true, |p| p.matches(*row)))
            .filter_map(|row| {
                if self.visible(row) {
                    Some(SourceRecord {
                        cacheable: self.caching,
                        document: row.clone(),
                    })
                } else if bypass {
                    Some(SourceRecord::transient(row.clone()))
                } else {
                    None
                }
            })
            .collect();
        Ok(records)
    }

    fn supports_caching(&self) -> bool {
        self.caching
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}
