use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atlas_query::{normalize, PredicateKey, Query};
use atlas_store::{DocumentEvent, DocumentStore, EventStream, SubscriptionId, Upsert};
use atlas_types::Document;
use tracing::{info, trace};

use crate::builder::AtlasBuilder;
use crate::collection::{Collection, ErasedCollection};
use crate::config::AtlasConfig;
use crate::context::QueryContext;
use crate::entity::{Documents, Entity, Related, Scope};
use crate::error::{AtlasError, AtlasResult};
use crate::flags::QueryOptions;
use crate::relation::{Cardinality, Relation};
use crate::source::SourceRecord;

/// A registered document type, both typed and erased.
pub(crate) struct Registered {
    pub(crate) typed: Arc<dyn Any + Send + Sync>,
    pub(crate) erased: Arc<dyn ErasedCollection>,
}

struct AtlasInner {
    collections: HashMap<TypeId, Registered>,
    config: AtlasConfig,
    disposed: AtomicBool,
}

/// The cache context: every registered document type with its store,
/// source, and relations.
///
/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct Atlas {
    inner: Arc<AtlasInner>,
}

impl Atlas {
    /// Start configuring a new atlas.
    pub fn builder() -> AtlasBuilder {
        AtlasBuilder::new()
    }

    pub(crate) fn from_parts(collections: HashMap<TypeId, Registered>, config: AtlasConfig) -> Self {
        Self {
            inner: Arc::new(AtlasInner {
                collections,
                config,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// The configuration this atlas was built with.
    pub fn config(&self) -> &AtlasConfig {
        &self.inner.config
    }

    pub(crate) fn collection<D: Document>(&self) -> AtlasResult<Arc<Collection<D>>> {
        if self.is_disposed() {
            return Err(AtlasError::Disposed);
        }
        self.inner
            .collections
            .get(&TypeId::of::<D>())
            .and_then(|r| Arc::clone(&r.typed).downcast::<Collection<D>>().ok())
            .ok_or(AtlasError::UnknownDocument(type_name::<D>()))
    }

    // Reads
    // ------------------------------------------------------------------

    /// Every document matching `query`, in a fresh context.
    pub async fn get_documents<D: Document>(
        &self,
        query: impl Into<Query>,
    ) -> AtlasResult<Documents<D>> {
        self.get_documents_with(query, QueryOptions::default()).await
    }

    /// Every document matching `query`, with per-read options.
    pub async fn get_documents_with<D: Document>(
        &self,
        query: impl Into<Query>,
        options: QueryOptions,
    ) -> AtlasResult<Documents<D>> {
        self.get_documents_in(query, &QueryContext::new(), options)
            .await
    }

    /// Every document matching `query`, memoized in `context`.
    ///
    /// A second read of an equivalent query through the same context returns
    /// the same set without consulting the store or the source again.
    pub async fn get_documents_in<D: Document>(
        &self,
        query: impl Into<Query>,
        context: &QueryContext,
        options: QueryOptions,
    ) -> AtlasResult<Documents<D>> {
        let collection = self.collection::<D>()?;
        let predicate = normalize(&query.into(), collection.schema())?;
        let key = PredicateKey::of(predicate.as_ref());
        let cache = options.cache.unwrap_or(self.inner.config.default_cache_flag);
        let timeout = options.timeout.or_else(|| self.inner.config.source_timeout());
        trace!(document = collection.schema().name(), predicate = %key, ?cache, "read");

        let set = context
            .get_or_try_init::<D, AtlasError, _, _>(key, || {
                collection.resolve(predicate.as_ref(), cache, options.flags, timeout)
            })
            .await?;
        Ok(Documents::new(set, self.scope(context, options)))
    }

    /// The first document matching `query`, in a fresh context.
    pub async fn get_document<D: Document>(
        &self,
        query: impl Into<Query>,
    ) -> AtlasResult<Option<Entity<D>>> {
        self.get_document_with(query, QueryOptions::default()).await
    }

    /// The first document matching `query`, with per-read options.
    pub async fn get_document_with<D: Document>(
        &self,
        query: impl Into<Query>,
        options: QueryOptions,
    ) -> AtlasResult<Option<Entity<D>>> {
        self.get_document_in(query, &QueryContext::new(), options)
            .await
    }

    /// The first document matching `query`, memoized in `context`.
    pub async fn get_document_in<D: Document>(
        &self,
        query: impl Into<Query>,
        context: &QueryContext,
        options: QueryOptions,
    ) -> AtlasResult<Option<Entity<D>>> {
        Ok(self
            .get_documents_in::<D>(query, context, options)
            .await?
            .first())
    }

    pub(crate) async fn resolve_relation<D: Document, F: Document>(
        &self,
        document: &D,
        name: &str,
        scope: &Scope,
        expected: Option<Cardinality>,
    ) -> AtlasResult<Related<F>> {
        let collection = self.collection::<D>()?;
        let erased = collection
            .relation(name)
            .ok_or_else(|| AtlasError::UnknownRelation {
                document: collection.schema().name().to_string(),
                relation: name.to_string(),
            })?;
        let relation = erased
            .as_any()
            .downcast_ref::<Relation<D, F>>()
            .ok_or_else(|| AtlasError::RelationType {
                document: collection.schema().name().to_string(),
                relation: name.to_string(),
                actual: erased.target_name(),
                requested: type_name::<F>(),
            })?;
        if let Some(requested) = expected {
            if requested != relation.cardinality() {
                return Err(AtlasError::Cardinality {
                    document: collection.schema().name().to_string(),
                    relation: name.to_string(),
                    actual: relation.cardinality(),
                    requested,
                });
            }
        }

        let Some(query) = relation.query(document, collection.schema())? else {
            trace!(
                document = collection.schema().name(),
                relation = name,
                "null join value; nothing related"
            );
            return Ok(match relation.cardinality() {
                Cardinality::One => Related::One(None),
                Cardinality::Many => {
                    Related::Many(Documents::new(Arc::new(Vec::new()), scope.clone()))
                }
            });
        };

        let found = self
            .get_documents_in::<F>(query, &scope.context, scope.options.for_relation())
            .await?;
        Ok(match relation.cardinality() {
            Cardinality::One => Related::One(found.first()),
            Cardinality::Many => Related::Many(found),
        })
    }

    fn scope(&self, context: &QueryContext, options: QueryOptions) -> Scope {
        Scope {
            atlas: self.clone(),
            context: context.clone(),
            options,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert or replace a cached document.
    pub fn update_document<D: Document>(&self, document: D) -> AtlasResult<Upsert<D>> {
        Ok(self.collection::<D>()?.store().upsert(document))
    }

    /// Remove the cached document sharing `document`'s key.
    pub fn delete_document<D: Document>(&self, document: &D) -> AtlasResult<Option<Arc<D>>> {
        Ok(self.collection::<D>()?.store().delete(document))
    }

    /// Reconcile one source record: cache it, or evict the cached copy if it
    /// is transient.
    pub fn apply<D: Document>(&self, record: SourceRecord<D>) -> AtlasResult<Arc<D>> {
        Ok(self.collection::<D>()?.reconcile(record))
    }

    /// Re-emit `Updated` for every cached document matching `query`.
    pub fn trigger_update<D: Document>(&self, query: impl Into<Query>) -> AtlasResult<usize> {
        let collection = self.collection::<D>()?;
        let predicate = normalize(&query.into(), collection.schema())?;
        Ok(collection.store().trigger_update(predicate.as_ref()))
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a handler called synchronously for every change to `D`.
    pub fn subscribe<D, H>(&self, handler: H) -> AtlasResult<SubscriptionId>
    where
        D: Document,
        H: Fn(&DocumentEvent<D>) + Send + Sync + 'static,
    {
        Ok(self.collection::<D>()?.store().subscribe(Arc::new(handler)))
    }

    /// Remove a handler added with [`Atlas::subscribe`].
    pub fn unsubscribe<D: Document>(&self, id: SubscriptionId) -> AtlasResult<bool> {
        Ok(self.collection::<D>()?.store().unsubscribe(id))
    }

    /// A broadcast receiver of every change to `D`.
    pub fn events<D: Document>(&self) -> AtlasResult<EventStream<D>> {
        Ok(self
            .collection::<D>()?
            .store()
            .channel(self.inner.config.event_channel_capacity))
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// The in-memory store backing `D`.
    pub fn store<D: Document>(&self) -> AtlasResult<Arc<DocumentStore<D>>> {
        Ok(Arc::clone(self.collection::<D>()?.store()))
    }

    /// Load every cacheable document of `D` and answer later `Default` reads
    /// from memory.
    pub async fn preload<D: Document>(&self) -> AtlasResult<usize> {
        self.collection::<D>()?
            .preload(self.inner.config.source_timeout())
            .await
    }

    /// Whether `D` has been fully loaded into memory.
    pub fn is_preloaded<D: Document>(&self) -> AtlasResult<bool> {
        Ok(self.collection::<D>()?.is_preloaded())
    }

    /// Names of every registered document type.
    pub fn document_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .inner
            .collections
            .values()
            .map(|r| r.erased.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Clear every store and dispose every source. Later calls fail with
    /// [`AtlasError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for registered in self.inner.collections.values() {
            registered.erased.dispose();
        }
        info!(documents = self.inner.collections.len(), "atlas disposed");
    }

    /// Returns `true` once [`Atlas::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atlas")
            .field("documents", &self.document_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::error::SourceError;
    use crate::feed::Change;
    use crate::fixtures::{member, team, user, Member, Team, User};
    use crate::flags::ExecutionFlags;
    use crate::memory::InMemorySource;
    use atlas_query::{field, foreign, local};
    use atlas_store::EventKind;
    use atlas_types::Value;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn users_atlas(source: Arc<InMemorySource<User>>) -> Atlas {
        AtlasBuilder::new()
            .document(DocumentBuilder::<User>::new().shared_source(source).index("name"))
            .build()
            .await
            .unwrap()
    }

    fn names(docs: &Documents<User>) -> Vec<String> {
        let mut out: Vec<String> = docs.iter().map(|u| u.name.clone()).collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn upsert_events_and_keyed_read() {
        let source = Arc::new(InMemorySource::<User>::new().unwrap());
        let atlas = users_atlas(Arc::clone(&source)).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        atlas
            .subscribe::<User, _>(move |e: &DocumentEvent<User>| {
                sink.lock().push((e.kind(), e.document().name.clone()));
            })
            .unwrap();

        assert!(!atlas.update_document(user(1, "A")).unwrap().replaced());
        let replaced = atlas.update_document(user(1, "B")).unwrap();
        assert_eq!(replaced.previous.as_deref(), Some(&user(1, "A")));
        assert_eq!(
            *seen.lock(),
            [
                (EventKind::Loaded, "A".to_string()),
                (EventKind::Updated, "B".to_string())
            ]
        );

        let docs = atlas
            .get_documents::<User>(field("id").equals(1))
            .await
            .unwrap();
        assert_eq!(names(&docs), ["B"]);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn reads_return_the_stored_instances() {
        let source = Arc::new(InMemorySource::with_rows([user(1, "ann"), user(2, "bob")]).unwrap());
        let atlas = users_atlas(source).await;
        let store = atlas.store::<User>().unwrap();

        let all = atlas.get_documents::<User>(Query::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        for doc in all.to_vec() {
            assert!(Arc::ptr_eq(&doc, &store.find(&doc).unwrap()));
        }

        let bob = atlas
            .get_document_with::<User>(field("name").equals("bob"), QueryOptions::new().only_cache())
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(bob.document(), &store.find(&user(2, "")).unwrap()));
    }

    #[tokio::test]
    async fn writes_converge_with_indexes() {
        let source = Arc::new(InMemorySource::with_rows([user(1, "ann")]).unwrap());
        let atlas = users_atlas(source).await;
        atlas.get_documents::<User>(Query::all()).await.unwrap();
        atlas.update_document(user(1, "anne")).unwrap();

        let cached = QueryOptions::new().only_cache();
        let renamed = atlas
            .get_documents_with::<User>(field("name").equals("anne"), cached)
            .await
            .unwrap();
        assert_eq!(names(&renamed), ["anne"]);
        let old = atlas
            .get_documents_with::<User>(field("name").equals("ann"), cached)
            .await
            .unwrap();
        assert!(old.is_empty());

        let store = atlas.store::<User>().unwrap();
        let index = store.index("name").unwrap();
        assert!(index.bucket(&Value::from("ann")).is_empty());
        assert_eq!(index.bucket(&Value::from("anne")).len(), 1);

        let removed = atlas.delete_document(&user(1, "")).unwrap().unwrap();
        assert_eq!(removed.name, "anne");
        assert!(index.is_empty());
        assert!(atlas.delete_document(&user(1, "")).unwrap().is_none());
    }

    #[tokio::test]
    async fn context_memoizes_equivalent_reads() {
        let source = Arc::new(InMemorySource::with_rows([user(1, "ann"), user(2, "bob")]).unwrap());
        let atlas = users_atlas(Arc::clone(&source)).await;
        let ctx = QueryContext::new();
        let options = QueryOptions::default();

        let a = atlas
            .get_documents_in::<User>(field("name").equals("bob"), &ctx, options)
            .await
            .unwrap();
        let b = atlas
            .get_documents_in::<User>(
                Query::filter(field("name").equals("bob")).and_where(field("name").equals("bob")),
                &ctx,
                options,
            )
            .await
            .unwrap();
        assert!(a.same_set(&b));
        assert_eq!(source.fetch_count(), 1);

        let fresh = atlas
            .get_documents::<User>(field("name").equals("bob"))
            .await
            .unwrap();
        assert!(!a.same_set(&fresh));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_reads_in_one_context_fetch_once() {
        let source = Arc::new(
            InMemorySource::with_rows([user(1, "ann")])
                .unwrap()
                .with_latency(Duration::from_millis(20)),
        );
        let atlas = users_atlas(Arc::clone(&source)).await;
        let ctx = QueryContext::new();

        let (a, b) = tokio::join!(
            atlas.get_documents_in::<User>(Query::all(), &ctx, QueryOptions::default()),
            atlas.get_documents_in::<User>(Query::all(), &ctx, QueryOptions::default())
        );
        assert!(a.unwrap().same_set(&b.unwrap()));
        assert_eq!(source.fetch_count(), 1);
    }

    async fn team_atlas(
        members: Arc<InMemorySource<Member>>,
        teams: Arc<InMemorySource<Team>>,
    ) -> Atlas {
        AtlasBuilder::new()
            .document(DocumentBuilder::<Member>::new().shared_source(members).relation::<Team>(
                "team",
                Cardinality::One,
                local("team_id").equals(foreign("id")),
            ))
            .document(DocumentBuilder::<Team>::new().shared_source(teams).relation::<Member>(
                "members",
                Cardinality::Many,
                local("id").equals(foreign("team_id")),
            ))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn relations_share_the_read_context() {
        let members = Arc::new(
            InMemorySource::with_rows([
                member(1, "a", Some(1)),
                member(2, "b", Some(1)),
                member(3, "c", Some(1)),
                member(4, "d", None),
            ])
            .unwrap(),
        );
        let teams = Arc::new(InMemorySource::with_rows([team(1, "core"), team(2, "ops")]).unwrap());
        let atlas = team_atlas(Arc::clone(&members), Arc::clone(&teams)).await;

        let all = atlas.get_documents::<Member>(Query::all()).await.unwrap();
        let mut found = Vec::new();
        for m in all.iter() {
            found.push(m.one::<Team>("team").await.unwrap().map(|t| t.name.clone()));
        }
        found.sort();
        assert_eq!(
            found,
            [None, Some("core".to_string()), Some("core".to_string()), Some("core".to_string())]
        );
        assert_eq!(teams.fetch_count(), 1);

        let core = atlas
            .get_document::<Team>(field("id").equals(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(teams.fetch_count(), 1);
        let roster = core.many::<Member>("members").await.unwrap();
        assert_eq!(roster.len(), 3);
        assert!(matches!(
            core.related::<Member>("members").await.unwrap(),
            Related::Many(set) if set.same_set(&roster)
        ));
    }

    #[tokio::test]
    async fn relation_reads_share_one_fetch_per_foreign_value() {
        let members = Arc::new(
            InMemorySource::with_rows([
                member(1, "a", Some(1)),
                member(2, "b", Some(1)),
                member(3, "c", Some(1)),
                member(4, "d", Some(2)),
            ])
            .unwrap(),
        );
        let atlas = AtlasBuilder::new()
            .document(DocumentBuilder::<Member>::new().shared_source(members.clone()).relation::<Member>(
                "teammates",
                Cardinality::Many,
                local("team_id").equals(foreign("team_id")),
            ))
            .build()
            .await
            .unwrap();

        let all = atlas.get_documents::<Member>(Query::all()).await.unwrap();
        assert_eq!(members.fetch_count(), 1);
        let mut rosters = Vec::new();
        for m in all.iter() {
            rosters.push((m.id, m.many::<Member>("teammates").await.unwrap()));
        }
        rosters.sort_by_key(|(id, _)| *id);

        // One fetch per distinct team_id, however many members navigate it.
        assert_eq!(members.fetch_count(), 3);
        assert_eq!(rosters[0].1.len(), 3);
        assert!(rosters[0].1.same_set(&rosters[1].1));
        assert!(rosters[0].1.same_set(&rosters[2].1));
        assert_eq!(rosters[3].1.len(), 1);
    }

    #[tokio::test]
    async fn relation_reads_ignore_the_parent_read_flags() {
        let members = Arc::new(InMemorySource::with_rows([member(1, "a", Some(2))]).unwrap());
        let teams = Arc::new(
            InMemorySource::with_rows([team(1, "core"), team(2, "hidden")])
                .unwrap()
                .with_filter(field("name").not_equals("hidden"))
                .unwrap(),
        );
        let atlas = team_atlas(members, Arc::clone(&teams)).await;

        let reconcile = QueryOptions::new()
            .bypass_cache()
            .flags(ExecutionFlags::BYPASS_FILTER);
        let all = atlas
            .get_documents_with::<Member>(Query::all(), reconcile)
            .await
            .unwrap();
        let m = all.first().unwrap();
        assert!(m.one::<Team>("team").await.unwrap().is_none());
        assert!(m.one::<Team>("team").await.unwrap().is_none());
        assert_eq!(teams.fetch_count(), 1);

        let plain = atlas.get_documents::<Member>(Query::all()).await.unwrap();
        assert!(plain.first().unwrap().one::<Team>("team").await.unwrap().is_none());
        assert_eq!(teams.fetch_count(), 2);
        assert!(atlas.store::<Team>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relation_misuse_is_reported() {
        let members = Arc::new(InMemorySource::<Member>::new().unwrap());
        let teams = Arc::new(InMemorySource::with_rows([team(1, "core")]).unwrap());
        let atlas = team_atlas(members, teams).await;
        let core = atlas
            .get_document::<Team>(field("id").equals(1))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            core.one::<Member>("members").await,
            Err(AtlasError::Cardinality { .. })
        ));
        assert!(matches!(
            core.related::<Team>("members").await,
            Err(AtlasError::RelationType { .. })
        ));
        assert!(matches!(
            core.related::<Member>("owners").await,
            Err(AtlasError::UnknownRelation { relation, .. }) if relation == "owners"
        ));
    }

    #[tokio::test]
    async fn bypass_filter_evicts_hidden_rows() {
        let source = Arc::new(
            InMemorySource::with_rows([user(1, "ann"), user(2, "bob")])
                .unwrap()
                .with_filter(field("name").not_equals("bob"))
                .unwrap(),
        );
        let atlas = users_atlas(source).await;
        atlas.update_document(user(2, "bob")).unwrap();

        let all = atlas
            .get_documents_with::<User>(
                Query::all(),
                QueryOptions::new()
                    .bypass_cache()
                    .flags(ExecutionFlags::BYPASS_FILTER),
            )
            .await
            .unwrap();
        assert_eq!(names(&all), ["ann", "bob"]);

        let store = atlas.store::<User>().unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.find(&user(2, "")).is_none());
    }

    #[tokio::test]
    async fn source_failures_reach_the_caller() {
        let source = Arc::new(
            InMemorySource::with_rows([user(1, "ann")])
                .unwrap()
                .with_latency(Duration::from_millis(200)),
        );
        let atlas = AtlasBuilder::new()
            .with_config(AtlasConfig {
                source_timeout_ms: Some(10),
                ..AtlasConfig::default()
            })
            .document(DocumentBuilder::<User>::new().shared_source(source.clone()))
            .build()
            .await
            .unwrap();

        assert!(matches!(
            atlas.get_documents::<User>(Query::all()).await,
            Err(AtlasError::SourceTimeout { .. })
        ));
        let patient = QueryOptions::new().timeout(Duration::from_secs(5));
        assert_eq!(
            atlas
                .get_documents_with::<User>(Query::all(), patient)
                .await
                .unwrap()
                .len(),
            1
        );

        source.fail_with("offline");
        assert!(matches!(
            atlas.get_documents_with::<User>(Query::all(), patient.bypass_cache()).await,
            Err(AtlasError::Source {
                source: SourceError::Unavailable(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unregistered_types_are_rejected() {
        let atlas = users_atlas(Arc::new(InMemorySource::new().unwrap())).await;
        assert!(matches!(
            atlas.get_documents::<Team>(Query::all()).await,
            Err(AtlasError::UnknownDocument(_))
        ));
        assert!(matches!(
            atlas.update_document(team(1, "core")),
            Err(AtlasError::UnknownDocument(_))
        ));
    }

    #[tokio::test]
    async fn trigger_update_re_emits_matches() {
        let source = Arc::new(InMemorySource::<User>::new().unwrap());
        let atlas = users_atlas(source).await;
        atlas.update_document(user(1, "ann")).unwrap();
        atlas.update_document(user(2, "bob")).unwrap();

        let mut events = atlas.events::<User>().unwrap();
        assert_eq!(atlas.trigger_update::<User>(field("name").equals("bob")).unwrap(), 1);
        match events.try_recv().unwrap() {
            DocumentEvent::Updated { new, old } => {
                assert!(Arc::ptr_eq(&new, &old));
                assert_eq!(new.name, "bob");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn change_feed_applies_until_closed() {
        let source = Arc::new(InMemorySource::<User>::new().unwrap());
        let atlas = users_atlas(source).await;
        let mut events = atlas.events::<User>().unwrap();

        let (tx, rx) = mpsc::channel(8);
        let feed = atlas.spawn_change_feed::<User>(rx);
        for change in [
            Change::Upsert(user(1, "ann")),
            Change::Upsert(user(2, "bob")),
            Change::Delete(user(1, "")),
            Change::Record(SourceRecord::transient(user(2, "bob"))),
            Change::Touch(Query::all()),
        ] {
            tx.send(change).await.unwrap();
        }
        drop(tx);
        assert_eq!(feed.await.unwrap(), 5);
        assert!(atlas.store::<User>().unwrap().is_empty());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            [
                EventKind::Loaded,
                EventKind::Loaded,
                EventKind::Deleted,
                EventKind::Deleted
            ]
        );
    }

    #[tokio::test]
    async fn change_feed_skips_failed_changes() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let atlas = users_atlas(Arc::new(InMemorySource::new().unwrap())).await;
        let (tx, rx) = mpsc::channel(4);
        let feed = atlas.spawn_change_feed::<Team>(rx);
        tx.send(Change::Upsert(team(1, "core"))).await.unwrap();
        drop(tx);
        assert_eq!(feed.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dispose_is_final_and_idempotent() {
        let source = Arc::new(InMemorySource::with_rows([user(1, "ann")]).unwrap());
        let atlas = users_atlas(Arc::clone(&source)).await;
        atlas.preload::<User>().await.unwrap();
        let store = atlas.store::<User>().unwrap();

        atlas.dispose();
        atlas.dispose();
        assert!(atlas.is_disposed());
        assert!(source.is_disposed());
        assert!(store.is_empty());
        assert!(matches!(
            atlas.get_documents::<User>(Query::all()).await,
            Err(AtlasError::Disposed)
        ));
        assert!(matches!(
            atlas.update_document(user(2, "bob")),
            Err(AtlasError::Disposed)
        ));
    }
}
