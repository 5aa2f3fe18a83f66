use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use atlas_query::PredicateKey;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::trace;

/// An immutable, shared result set.
pub type DocumentSet<D> = Arc<Vec<Arc<D>>>;

type Slot = Arc<dyn Any + Send + Sync>;

/// Call-scoped memo of `(document type, predicate)` to result set.
///
/// One context is created per externally initiated read and is carried
/// through every relation that read navigates, so a sub-query repeated by
/// many documents runs once. Concurrent requests for a key that is still
/// being resolved wait for the first one instead of issuing their own.
///
/// Cloning a context shares its memo.
#[derive(Clone, Default)]
pub struct QueryContext {
    memo: Arc<Mutex<HashMap<(TypeId, PredicateKey), Slot>>>,
}

impl QueryContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized set for `key`, resolving it with `init` on first use.
    ///
    /// Every call for the same type and key returns the same `Arc`. A failed
    /// resolution is not memoized.
    pub async fn get_or_try_init<D, E, F, Fut>(
        &self,
        key: PredicateKey,
        init: F,
    ) -> Result<DocumentSet<D>, E>
    where
        D: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Arc<D>>, E>>,
    {
        let cell = self.slot::<D>(key);
        if let Some(set) = cell.get() {
            trace!(document = type_name::<D>(), "query context hit");
            return Ok(Arc::clone(set));
        }
        let set = cell
            .get_or_try_init(|| async move { init().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(set))
    }

    /// Returns `true` if a result for `key` has been memoized.
    pub fn contains<D: Send + Sync + 'static>(&self, key: &PredicateKey) -> bool {
        self.memo
            .lock()
            .get(&(TypeId::of::<D>(), key.clone()))
            .and_then(|slot| Arc::clone(slot).downcast::<OnceCell<DocumentSet<D>>>().ok())
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of memoized keys, including ones still resolving.
    pub fn len(&self) -> usize {
        self.memo.lock().len()
    }

    /// Returns `true` if nothing has been memoized.
    pub fn is_empty(&self) -> bool {
        self.memo.lock().is_empty()
    }

    fn slot<D: Send + Sync + 'static>(&self, key: PredicateKey) -> Arc<OnceCell<DocumentSet<D>>> {
        let mut memo = self.memo.lock();
        let entry = memo
            .entry((TypeId::of::<D>(), key))
            .or_insert_with(|| Arc::new(OnceCell::<DocumentSet<D>>::new()) as Slot);
        match Arc::clone(entry).downcast::<OnceCell<DocumentSet<D>>>() {
            Ok(cell) => cell,
            // The key embeds the type id, so this only replaces a foreign slot.
            Err(_) => {
                let cell = Arc::new(OnceCell::new());
                *entry = Arc::clone(&cell) as Slot;
                cell
            }
        }
    }
}
