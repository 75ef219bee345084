//! Cross-module lifecycle scenarios: concurrent callers, forced rebuilds,
//! and store failures in the middle of a promotion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use stowage_search::{
    CasOutcome, EnsureOutcome, IndexLifecycleManager, InMemorySearchStore, LifecycleConfig,
    SearchError, SearchResult, SearchStore, SequentialIndexNames, StoreEvent, VersionedDocument,
};
use stowage_types::{Cleanup, CleanupOutcome, ErrorKind, RecordingCleanupObserver};

fn config() -> LifecycleConfig {
    LifecycleConfig {
        retry_backoff_ms: 0,
        ..LifecycleConfig::for_alias("charms")
    }
}

fn manager(store: Arc<dyn SearchStore>, names: Arc<SequentialIndexNames>) -> IndexLifecycleManager {
    IndexLifecycleManager::with_names(store, config(), names).unwrap()
}

/// Store call after which another caller's whole `ensure_indexes` is run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    /// Right after a version document read.
    DocumentRead,
    /// Right after listing the alias, before the listing is returned.
    AliasList,
    /// Right before a retarget is forwarded.
    Retarget,
}

struct Interloper {
    at: Trigger,
    manager: Arc<IndexLifecycleManager>,
    force: bool,
}

/// Forwards everything to an in-memory store. Individual operations can be
/// made to fail, and another caller's whole `ensure_indexes` can be slotted
/// in at one chosen point.
#[derive(Default)]
struct ScriptedStore {
    inner: InMemorySearchStore,
    fail_cas: AtomicBool,
    always_conflict: AtomicBool,
    fail_delete: AtomicBool,
    fail_retarget: AtomicBool,
    interloper: Mutex<Option<Interloper>>,
    interloper_outcome: Mutex<Option<SearchResult<EnsureOutcome>>>,
}

impl ScriptedStore {
    fn interleave(&self, other: Arc<IndexLifecycleManager>) {
        self.interleave_at(Trigger::DocumentRead, other, false);
    }

    fn interleave_at(&self, at: Trigger, manager: Arc<IndexLifecycleManager>, force: bool) {
        *self.interloper.lock().unwrap() = Some(Interloper { at, manager, force });
    }

    fn interloper_outcome(&self) -> Option<SearchResult<EnsureOutcome>> {
        self.interloper_outcome.lock().unwrap().take()
    }

    async fn maybe_interleave(&self, at: Trigger) {
        let hook = {
            let mut slot = self.interloper.lock().unwrap();
            match slot.as_ref() {
                Some(i) if i.at == at => slot.take(),
                _ => None,
            }
        };
        if let Some(i) = hook {
            let outcome = i.manager.ensure_indexes(i.force).await;
            *self.interloper_outcome.lock().unwrap() = Some(outcome);
        }
    }
}

#[async_trait]
impl SearchStore for ScriptedStore {
    async fn get_document(&self, index: &str, id: &str) -> SearchResult<Option<VersionedDocument>> {
        let doc = self.inner.get_document(index, id).await?;
        self.maybe_interleave(Trigger::DocumentRead).await;
        Ok(doc)
    }

    async fn put_document_if(
        &self,
        index: &str,
        id: &str,
        body: &Value,
        expected_revision: u64,
    ) -> SearchResult<CasOutcome> {
        if self.fail_cas.load(Ordering::SeqCst) {
            return Err(SearchError::store(
                "put version document",
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
            ));
        }
        if self.always_conflict.load(Ordering::SeqCst) {
            return Ok(CasOutcome::Conflict {
                current: expected_revision + 1,
            });
        }
        self.inner
            .put_document_if(index, id, body, expected_revision)
            .await
    }

    async fn list_indexes_for_alias(&self, alias: &str) -> SearchResult<Vec<String>> {
        let targets = self.inner.list_indexes_for_alias(alias).await?;
        self.maybe_interleave(Trigger::AliasList).await;
        Ok(targets)
    }

    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        self.inner.index_exists(index).await
    }

    async fn create_index(&self, index: &str, schema: &Value) -> SearchResult<()> {
        self.inner.create_index(index, schema).await
    }

    async fn retarget_alias(&self, alias: &str, expected: &[String], index: &str) -> SearchResult<bool> {
        if self.fail_retarget.load(Ordering::SeqCst) {
            return Err(SearchError::store(
                format!("retarget alias {alias}"),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"),
            ));
        }
        self.maybe_interleave(Trigger::Retarget).await;
        self.inner.retarget_alias(alias, expected, index).await
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(SearchError::store(
                format!("delete index {index}"),
                std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
            ));
        }
        self.inner.delete_index(index).await
    }
}

#[tokio::test]
async fn sequential_calls_create_one_index() {
    let store = Arc::new(InMemorySearchStore::new());
    let mgr = manager(store.clone(), Arc::new(SequentialIndexNames::new()));

    mgr.ensure_indexes(false).await.unwrap();
    mgr.ensure_indexes(false).await.unwrap();

    assert_eq!(store.indexes(), vec!["charms-000001"]);
    assert_eq!(
        store.list_indexes_for_alias("charms").await.unwrap(),
        vec!["charms-000001"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_calls_converge_on_one_index() {
    let store = Arc::new(InMemorySearchStore::new());
    let names = Arc::new(SequentialIndexNames::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let mgr = manager(store.clone(), names.clone());
        handles.push(tokio::spawn(async move { mgr.ensure_indexes(false).await }));
    }

    let mut live = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().expect("every caller succeeds");
        live.push(outcome.index().to_string());
    }

    let targets = store.list_indexes_for_alias("charms").await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(store.indexes(), targets);
    assert!(live.iter().all(|index| *index == targets[0]));

    let promotions = store
        .events()
        .into_iter()
        .filter(|e| matches!(e, StoreEvent::AliasRetargeted { .. }))
        .count();
    assert_eq!(promotions, 1);
}

#[tokio::test]
async fn forced_rebuild_switches_index_and_keeps_alias_resolvable() {
    let store = Arc::new(InMemorySearchStore::new());
    let mgr = manager(store.clone(), Arc::new(SequentialIndexNames::new()));

    let first = mgr.ensure_indexes(false).await.unwrap();
    let second = mgr.ensure_indexes(true).await.unwrap();

    assert_ne!(first.index(), second.index());
    assert_eq!(second.generation(), 2);
    assert_eq!(mgr.current_index().await.unwrap(), second.index());
    assert!(!store.index_exists(first.index()).await.unwrap());

    // The alias moved before the old index went away.
    let events = store.events();
    let retarget = events
        .iter()
        .position(|e| matches!(e, StoreEvent::AliasRetargeted { index, .. } if index == second.index()))
        .unwrap();
    let delete = events
        .iter()
        .position(|e| matches!(e, StoreEvent::IndexDeleted { index } if index == first.index()))
        .unwrap();
    assert!(retarget < delete);
}

#[tokio::test]
async fn loser_discards_candidate_and_adopts_winner() {
    let store = Arc::new(ScriptedStore::default());
    let names = Arc::new(SequentialIndexNames::new());
    let observer = Arc::new(RecordingCleanupObserver::new());

    let a = Arc::new(manager(store.clone(), names.clone()));
    let b = manager(store.clone(), names.clone()).with_observer(observer.clone());

    // A runs to completion between B's first read and B's conditional write.
    store.interleave(a);
    let b_outcome = b.ensure_indexes(false).await.unwrap();

    let a_outcome = store.interloper_outcome().unwrap().unwrap();
    assert_eq!(
        a_outcome,
        EnsureOutcome::Promoted {
            index: "charms-000001".into(),
            generation: 1,
            superseded: vec![],
        }
    );
    assert_eq!(
        b_outcome,
        EnsureOutcome::AlreadyCurrent {
            index: "charms-000001".into(),
            generation: 1,
        }
    );

    assert_eq!(
        store.list_indexes_for_alias("charms").await.unwrap(),
        vec!["charms-000001"]
    );
    assert_eq!(store.inner.indexes(), vec!["charms-000001"]);

    let events = store.inner.events();
    assert!(events.contains(&StoreEvent::IndexCreated {
        index: "charms-000002".into()
    }));
    assert!(events.contains(&StoreEvent::IndexDeleted {
        index: "charms-000002".into()
    }));

    let records = observer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].cleanup,
        Cleanup::OrphanIndex {
            index: "charms-000002".into()
        }
    );
    assert_eq!(records[0].outcome, CleanupOutcome::Completed);

    let (version, revision) = b.versions().current_version().await.unwrap();
    assert_eq!(version.count, 1);
    assert_eq!(version.index_name, "charms-000001");
    assert_eq!(revision, 1);
}

#[tokio::test]
async fn failed_orphan_cleanup_does_not_fail_the_loser() {
    let store = Arc::new(ScriptedStore::default());
    store.fail_delete.store(true, Ordering::SeqCst);
    let names = Arc::new(SequentialIndexNames::new());
    let observer = Arc::new(RecordingCleanupObserver::new());

    let a = Arc::new(manager(store.clone(), names.clone()));
    let b = manager(store.clone(), names.clone()).with_observer(observer.clone());

    store.interleave(a);
    let outcome = b.ensure_indexes(false).await.unwrap();
    assert_eq!(outcome.index(), "charms-000001");

    assert_eq!(observer.failures(), 1);
    let records = observer.records();
    assert_eq!(
        records[0].cleanup,
        Cleanup::OrphanIndex {
            index: "charms-000002".into()
        }
    );
    assert!(records[0].outcome.is_failed());

    // The orphan is left behind but the alias is still correct.
    assert_eq!(store.inner.indexes(), vec!["charms-000001", "charms-000002"]);
    assert_eq!(
        store.list_indexes_for_alias("charms").await.unwrap(),
        vec!["charms-000001"]
    );
}

#[tokio::test]
async fn store_error_during_promotion_discards_candidate() {
    let store = Arc::new(ScriptedStore::default());
    store.fail_cas.store(true, Ordering::SeqCst);
    let observer = Arc::new(RecordingCleanupObserver::new());
    let mgr = manager(store.clone(), Arc::new(SequentialIndexNames::new()))
        .with_observer(observer.clone());

    let err = mgr.ensure_indexes(false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.to_string().contains("connection reset"));

    assert!(store.inner.indexes().is_empty());
    assert!(store.list_indexes_for_alias("charms").await.unwrap().is_empty());
    assert_eq!(
        observer.records()[0].cleanup,
        Cleanup::OrphanIndex {
            index: "charms-000001".into()
        }
    );
}

#[tokio::test]
async fn endless_conflicts_end_in_contention() {
    let store = Arc::new(ScriptedStore::default());
    store.always_conflict.store(true, Ordering::SeqCst);
    let observer = Arc::new(RecordingCleanupObserver::new());
    let mgr = manager(store.clone(), Arc::new(SequentialIndexNames::new()))
        .with_observer(observer.clone());

    let err = mgr.ensure_indexes(true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Contention);
    assert!(matches!(
        err,
        SearchError::Contention { ref alias, attempts: 5 } if alias == "charms"
    ));

    assert!(store.inner.indexes().is_empty());
    assert_eq!(observer.records().len(), 5);
    assert_eq!(observer.failures(), 0);
}

#[tokio::test]
async fn retargets_of_other_aliases_are_untouched() {
    let store = Arc::new(InMemorySearchStore::new());
    let names = Arc::new(SequentialIndexNames::new());
    let charms = manager(store.clone(), names.clone());
    let bundles = IndexLifecycleManager::with_names(
        store.clone(),
        LifecycleConfig::for_alias("bundles"),
        names,
    )
    .unwrap();

    charms.ensure_indexes(false).await.unwrap();
    bundles.ensure_indexes(false).await.unwrap();
    charms.ensure_indexes(true).await.unwrap();

    assert_eq!(bundles.current_index().await.unwrap(), "bundles-000002");
    assert_eq!(charms.current_index().await.unwrap(), "charms-000003");
    assert_eq!(store.indexes(), vec!["bundles-000002", "charms-000003"]);
}

/// A forced rebuild overtaken by a second forced rebuild while moving the
/// alias. Runs the second rebuild at `at` inside the first one's promotion.
async fn overtaken_rebuild(at: Trigger) {
    let store = Arc::new(ScriptedStore::default());
    let names = Arc::new(SequentialIndexNames::new());
    let observer = Arc::new(RecordingCleanupObserver::new());

    let a = manager(store.clone(), names.clone()).with_observer(observer.clone());
    let c = Arc::new(manager(store.clone(), names.clone()));

    a.ensure_indexes(false).await.unwrap();
    store.interleave_at(at, c, true);
    let a_outcome = a.ensure_indexes(true).await.unwrap();

    let c_outcome = store.interloper_outcome().unwrap().unwrap();
    assert_eq!(
        c_outcome,
        EnsureOutcome::Promoted {
            index: "charms-000003".into(),
            generation: 3,
            superseded: vec!["charms-000001".into(), "charms-000002".into()],
        }
    );
    // A's generation lost the alias to C's, so A settles on C's index.
    assert_eq!(
        a_outcome,
        EnsureOutcome::AlreadyCurrent {
            index: "charms-000003".into(),
            generation: 3,
        }
    );

    assert_eq!(
        store.list_indexes_for_alias("charms").await.unwrap(),
        vec!["charms-000003"]
    );
    assert_eq!(store.inner.indexes(), vec!["charms-000003"]);
    let records = observer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].cleanup,
        Cleanup::OrphanIndex {
            index: "charms-000002".into()
        }
    );
    assert_eq!(records[0].outcome, CleanupOutcome::Completed);

    let again = a.ensure_indexes(false).await.unwrap();
    assert_eq!(again.index(), "charms-000003");
    assert_eq!(a.current_index().await.unwrap(), "charms-000003");
}

#[tokio::test]
async fn overtaken_rebuild_never_moves_alias_back() {
    overtaken_rebuild(Trigger::Retarget).await;
}

#[tokio::test]
async fn overtaken_rebuild_with_stale_alias_listing() {
    overtaken_rebuild(Trigger::AliasList).await;
}

#[tokio::test]
async fn failed_retarget_is_repaired_by_next_call() {
    let store = Arc::new(ScriptedStore::default());
    let mgr = manager(store.clone(), Arc::new(SequentialIndexNames::new()));

    store.fail_retarget.store(true, Ordering::SeqCst);
    let err = mgr.ensure_indexes(false).await.unwrap_err();
    assert!(err.to_string().contains("broken pipe"));

    // The generation was recorded but the alias never moved.
    let (version, _) = mgr.versions().current_version().await.unwrap();
    assert_eq!(version.index_name, "charms-000001");
    assert!(store.list_indexes_for_alias("charms").await.unwrap().is_empty());
    assert_eq!(store.inner.indexes(), vec!["charms-000001"]);

    store.fail_retarget.store(false, Ordering::SeqCst);
    let out = mgr.ensure_indexes(false).await.unwrap();
    assert_eq!(
        out,
        EnsureOutcome::AlreadyCurrent {
            index: "charms-000001".into(),
            generation: 1,
        }
    );
    assert_eq!(mgr.current_index().await.unwrap(), "charms-000001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_forced_rebuilds_leave_one_live_index() {
    let store = Arc::new(InMemorySearchStore::new());
    let names = Arc::new(SequentialIndexNames::new());
    let config = LifecycleConfig {
        max_attempts: 10,
        ..config()
    };
    let build = |store: Arc<InMemorySearchStore>| {
        IndexLifecycleManager::with_names(store, config.clone(), names.clone()).unwrap()
    };

    build(store.clone()).ensure_indexes(false).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let mgr = build(store.clone());
        handles.push(tokio::spawn(async move { mgr.ensure_indexes(true).await }));
    }
    for handle in handles {
        handle.await.unwrap().expect("every caller succeeds");
    }

    let checker = build(store.clone());
    let (version, _) = checker.versions().current_version().await.unwrap();
    let targets = store.list_indexes_for_alias("charms").await.unwrap();
    assert_eq!(targets, vec![version.index_name.clone()]);
    assert_eq!(store.indexes(), targets);
    assert!(version.count >= 2);
}
