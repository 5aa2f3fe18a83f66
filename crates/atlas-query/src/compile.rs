use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use atlas_types::Document;
use parking_lot::RwLock;
use tracing::trace;

use crate::eval::{compare_values, read};
use crate::predicate::{Predicate, Term};

type Filter<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;

/// A predicate turned into a tree of closures over one document type.
pub struct CompiledPredicate<D> {
    predicate: Predicate,
    filter: Filter<D>,
}

impl<D: Document> CompiledPredicate<D> {
    /// Build the closure tree for `predicate`.
    pub fn compile(predicate: &Predicate) -> Self {
        let filters: Vec<Filter<D>> = predicate.terms().iter().map(compile_term::<D>).collect();
        Self {
            predicate: predicate.clone(),
            filter: all_of(filters),
        }
    }

    /// Evaluate the predicate against `document`.
    pub fn matches(&self, document: &D) -> bool {
        (self.filter)(document)
    }

    /// The predicate this was compiled from.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl<D> fmt::Debug for CompiledPredicate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPredicate")
            .field(&self.predicate.to_string())
            .finish()
    }
}

fn all_of<D: Document>(mut filters: Vec<Filter<D>>) -> Filter<D> {
    if filters.len() == 1 {
        return filters.remove(0);
    }
    Box::new(move |d: &D| filters.iter().all(|f| f(d)))
}

fn compile_term<D: Document>(term: &Term) -> Filter<D> {
    match term {
        Term::Compare { field, op, value } => {
            let (field, op, value) = (field.clone(), *op, value.clone());
            Box::new(move |d: &D| compare_values(op, &read(d, &field), &value))
        }
        Term::Fields { left, op, right } => {
            let (left, op, right) = (left.clone(), *op, right.clone());
            Box::new(move |d: &D| compare_values(op, &read(d, &left), &read(d, &right)))
        }
        Term::And(children) => all_of(children.iter().map(compile_term::<D>).collect()),
        Term::Or(children) => {
            let filters: Vec<Filter<D>> = children.iter().map(compile_term::<D>).collect();
            Box::new(move |d: &D| filters.iter().any(|f| f(d)))
        }
        Term::Not(inner) => {
            let inner = compile_term::<D>(inner);
            Box::new(move |d: &D| !inner(d))
        }
        Term::Literal(b) => {
            let b = *b;
            Box::new(move |_: &D| b)
        }
    }
}

/// Point-in-time counters of a [`PredicateCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Bounded memo of compiled predicates, keyed by structural identity.
///
/// Lookups hash the predicate and then compare it structurally, so two
/// predicates that merely collide on hash never share a filter. When the cache
/// reaches capacity it is cleared and refilled.
pub struct PredicateCache<D> {
    entries: RwLock<HashMap<Predicate, Arc<CompiledPredicate<D>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<D: Document> PredicateCache<D> {
    /// A cache holding at most `capacity` compiled predicates.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The compiled form of `predicate`, compiling it on first use.
    pub fn get_or_compile(&self, predicate: &Predicate) -> Arc<CompiledPredicate<D>> {
        if let Some(compiled) = self.entries.read().get(predicate) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(compiled);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(CompiledPredicate::compile(predicate));

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(predicate) {
            trace!(evicted = entries.len(), "compiled predicate cache full; clearing");
            entries.clear();
        }
        Arc::clone(entries.entry(predicate.clone()).or_insert(compiled))
    }

    /// Number of cached predicates.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every cached predicate. Counters are kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Hit, miss and size counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}
