use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use atlas_query::Predicate;
use atlas_types::{Document, KeyHash, Value};
use parking_lot::RwLock;

type Bucket<D> = HashMap<KeyHash, Arc<D>>;

/// Secondary index from one field's value to the documents holding it.
///
/// Every indexed document sits in exactly one bucket, the one for its current
/// value. Documents whose value is null are not indexed. The owning store
/// serializes updates per key; readers may still observe a bucket that lags
/// the store and must verify candidates.
pub struct FieldIndex<D> {
    field: String,
    buckets: RwLock<HashMap<Value, Bucket<D>>>,
}

impl<D: Document> FieldIndex<D> {
    /// An empty index over `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// The indexed field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Move `document` into the bucket of its current value.
    ///
    /// `old` is the version being replaced, if any; it is removed from the
    /// bucket of its own value first.
    pub fn update(&self, key: KeyHash, document: &Arc<D>, old: Option<&D>) {
        let mut buckets = self.buckets.write();
        if let Some(old) = old {
            Self::evict(&mut buckets, key, self.value_of(old));
        }
        if let Some(value) = self.value_of(document) {
            buckets
                .entry(value)
                .or_default()
                .insert(key, Arc::clone(document));
        }
    }

    /// Remove `document` from the bucket of its current value.
    pub fn remove(&self, key: KeyHash, document: &D) {
        let mut buckets = self.buckets.write();
        Self::evict(&mut buckets, key, self.value_of(document));
    }

    /// Keys of documents the predicate pins this field to.
    ///
    /// Returns `None` when the predicate has no top-level equality on this
    /// field, meaning the index cannot narrow the search.
    pub fn matches(&self, predicate: &Predicate) -> Option<HashSet<KeyHash>> {
        let value = predicate.equality(&self.field)?;
        let buckets = self.buckets.read();
        Some(
            buckets
                .get(value)
                .map(|bucket| bucket.keys().copied().collect())
                .unwrap_or_default(),
        )
    }

    /// Documents currently in the bucket for `value`.
    pub fn bucket(&self, value: &Value) -> Vec<Arc<D>> {
        self.buckets
            .read()
            .get(value)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct indexed values.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Total number of indexed documents.
    pub fn len(&self) -> usize {
        self.buckets.read().values().map(HashMap::len).sum()
    }

    /// Returns `true` if no document is indexed.
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.buckets.write().clear();
    }

    fn value_of(&self, document: &D) -> Option<Value> {
        document.get(&self.field).filter(|v| !v.is_null())
    }

    fn evict(buckets: &mut HashMap<Value, Bucket<D>>, key: KeyHash, value: Option<Value>) {
        let Some(value) = value else { return };
        if let Some(bucket) = buckets.get_mut(&value) {
            bucket.remove(&key);
            if bucket.is_empty() {
                buckets.remove(&value);
            }
        }
    }
}
