//! Index promotion without a lock service.
//!
//! [`IndexLifecycleManager::ensure_indexes`] guarantees that, on success,
//! the alias resolves to exactly one schema-current physical index. Racing
//! callers in any number of processes are reconciled by the conditional
//! write on the alias's version document: exactly one of them wins each
//! generation, and every loser discards its candidate and re-reads.
//!
//! The alias itself only ever moves through a conditional retarget, and
//! only while the version document still names the index being moved to.
//! A caller whose generation has been overtaken therefore never drags the
//! alias back to an older index.

use std::collections::BTreeSet;
use std::sync::Arc;

use stowage_types::{Cleanup, CleanupObserver, CleanupOutcome, TracingCleanupObserver};
use tracing::{debug, info, instrument};

use crate::config::LifecycleConfig;
use crate::error::{SearchError, SearchResult};
use crate::names::{IndexNameGenerator, UniqueIndexNames};
use crate::store::SearchStore;
use crate::version::{IndexVersion, IndexVersionStore};

/// What a successful [`IndexLifecycleManager::ensure_indexes`] call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A live index already satisfied the request; nothing was created.
    AlreadyCurrent { index: String, generation: u64 },
    /// This call won a promotion and retargeted the alias to `index`.
    Promoted {
        index: String,
        generation: u64,
        /// Indexes the alias pointed at before, now retired.
        superseded: Vec<String>,
    },
}

impl EnsureOutcome {
    /// The physical index the alias resolves to after the call.
    pub fn index(&self) -> &str {
        match self {
            EnsureOutcome::AlreadyCurrent { index, .. } | EnsureOutcome::Promoted { index, .. } => {
                index
            }
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            EnsureOutcome::AlreadyCurrent { generation, .. }
            | EnsureOutcome::Promoted { generation, .. } => *generation,
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, EnsureOutcome::Promoted { .. })
    }
}

/// Result of pointing the alias at the index a version document names.
#[derive(Debug)]
enum AliasSync {
    /// The alias resolves to the index alone. `displaced` are the indexes
    /// this call moved it away from.
    Settled { displaced: Vec<String> },
    /// The version document moved on; a newer generation owns the alias.
    Overtaken,
}

/// Creates, promotes and retires the physical indexes behind one alias.
pub struct IndexLifecycleManager {
    versions: IndexVersionStore,
    config: LifecycleConfig,
    observer: Arc<dyn CleanupObserver>,
}

impl IndexLifecycleManager {
    /// Manage `config.alias` in `store`, with unique index names and
    /// cleanup failures logged through `tracing`.
    pub fn new(store: Arc<dyn SearchStore>, config: LifecycleConfig) -> SearchResult<Self> {
        Self::with_names(store, config, Arc::new(UniqueIndexNames))
    }

    /// Like [`new`](Self::new), drawing physical index names from `names`.
    pub fn with_names(
        store: Arc<dyn SearchStore>,
        config: LifecycleConfig,
        names: Arc<dyn IndexNameGenerator>,
    ) -> SearchResult<Self> {
        config.validate()?;
        let versions = IndexVersionStore::new(
            store,
            config.metadata_index.clone(),
            config.alias.clone(),
            config.index_schema.clone(),
            names,
        );
        Ok(Self {
            versions,
            config,
            observer: Arc::new(TracingCleanupObserver),
        })
    }

    /// Report cleanup outcomes to `observer` instead of the log.
    pub fn with_observer(mut self, observer: Arc<dyn CleanupObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn versions(&self) -> &IndexVersionStore {
        &self.versions
    }

    fn store(&self) -> &dyn SearchStore {
        self.versions.store().as_ref()
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Make sure the alias resolves to exactly one schema-current index.
    ///
    /// With `force`, a fresh index is promoted even if a live one exists.
    /// Losing a race to another caller is not an error: the loser discards
    /// its candidate and settles on the winner's index. If the alias has
    /// drifted from the recorded index (a promotion that died between the
    /// version write and the alias move), it is pointed back at it. A
    /// [`SearchError::Contention`] is returned only after `max_attempts`
    /// lost races in a row.
    #[instrument(skip(self), fields(alias = %self.config.alias))]
    pub async fn ensure_indexes(&self, force: bool) -> SearchResult<EnsureOutcome> {
        let max_attempts = self.max_attempts();
        let mut force = force;

        for attempt in 1..=max_attempts {
            let (current, revision) = self.versions.current_version().await?;

            if !force && current.has_index() && self.store().index_exists(&current.index_name).await? {
                match self.settle_alias(&current.index_name, revision).await? {
                    AliasSync::Settled { displaced } => {
                        if !displaced.is_empty() {
                            info!(index = %current.index_name, "repointed drifted alias");
                        }
                        self.retire(displaced).await;
                        debug!(
                            index = %current.index_name,
                            generation = current.count,
                            "alias already has a live index"
                        );
                        return Ok(EnsureOutcome::AlreadyCurrent {
                            index: current.index_name,
                            generation: current.count,
                        });
                    }
                    AliasSync::Overtaken => {
                        self.pause(attempt, max_attempts, "version moved while repairing alias")
                            .await;
                        continue;
                    }
                }
            }

            let candidate = self.versions.new_index().await?;
            let next = current.successor(candidate.clone());

            match self.versions.update_version(&next, revision).await {
                Ok(true) => {
                    if let Some(outcome) = self.promote(&current, next, revision + 1).await? {
                        return Ok(outcome);
                    }
                    // A newer generation overtook ours before the alias moved.
                    self.discard(Cleanup::OrphanIndex { index: candidate }).await;
                }
                Ok(false) => {
                    self.discard(Cleanup::OrphanIndex { index: candidate }).await;
                }
                Err(e) => {
                    self.discard(Cleanup::OrphanIndex { index: candidate }).await;
                    return Err(e);
                }
            }
            // The winner's fresh index satisfies a forced rebuild too.
            force = false;
            self.pause(attempt, max_attempts, "lost promotion race").await;
        }

        Err(self.contention(max_attempts))
    }

    /// The single physical index the alias resolves to right now.
    pub async fn current_index(&self) -> SearchResult<String> {
        let mut targets = self.store().list_indexes_for_alias(&self.config.alias).await?;
        match targets.len() {
            0 => Err(SearchError::not_found(format!("alias {}", self.config.alias))),
            1 => Ok(targets.remove(0)),
            n => Err(SearchError::store(
                format!("resolve alias {}", self.config.alias),
                format!("alias resolves to {n} indexes: {}", targets.join(", ")),
            )),
        }
    }

    /// Runs after winning the conditional write at `revision`. Returns
    /// `None` if a newer generation won before the alias could be moved,
    /// leaving the candidate for the caller to discard.
    async fn promote(
        &self,
        previous: &IndexVersion,
        next: IndexVersion,
        revision: u64,
    ) -> SearchResult<Option<EnsureOutcome>> {
        let candidate = next.index_name;

        let displaced = match self.settle_alias(&candidate, revision).await? {
            AliasSync::Settled { displaced } => displaced,
            AliasSync::Overtaken => {
                debug!(index = %candidate, generation = next.count, "promotion overtaken");
                return Ok(None);
            }
        };

        let mut superseded: BTreeSet<String> = displaced.into_iter().collect();
        if previous.has_index() {
            superseded.insert(previous.index_name.clone());
        }
        superseded.remove(&candidate);
        let superseded: Vec<String> = superseded.into_iter().collect();

        info!(
            index = %candidate,
            generation = next.count,
            superseded = superseded.len(),
            "promoted physical index"
        );
        self.retire(superseded.clone()).await;

        Ok(Some(EnsureOutcome::Promoted {
            index: candidate,
            generation: next.count,
            superseded,
        }))
    }

    /// Point the alias at `index` alone, for as long as the version
    /// document is still at `revision`.
    ///
    /// The alias is listed before the document is checked, so a retarget
    /// that succeeds was based on a target set no newer generation had
    /// touched yet.
    async fn settle_alias(&self, index: &str, revision: u64) -> SearchResult<AliasSync> {
        let alias = &self.config.alias;
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let targets = self.store().list_indexes_for_alias(alias).await?;
            if targets.len() == 1 && targets[0] == index {
                return Ok(AliasSync::Settled { displaced: vec![] });
            }

            let (_, now) = self.versions.current_version().await?;
            if now != revision {
                return Ok(AliasSync::Overtaken);
            }

            match self.store().retarget_alias(alias, &targets, index).await {
                Ok(true) => {
                    let displaced = targets.into_iter().filter(|t| t != index).collect();
                    return Ok(AliasSync::Settled { displaced });
                }
                // The index was retired by an overtaken caller; the re-read
                // on the next pass sees the newer revision.
                Err(e) if e.is_not_found() => {}
                Ok(false) => {}
                Err(e) => return Err(e),
            }
            debug!(attempt, index, "alias moved while retargeting; retrying");
        }

        Err(self.contention(max_attempts))
    }

    async fn pause(&self, attempt: u32, max_attempts: u32, reason: &str) {
        if attempt < max_attempts {
            debug!(attempt, reason, "retrying");
            tokio::time::sleep(self.config.backoff_after(attempt)).await;
        }
    }

    fn contention(&self, attempts: u32) -> SearchError {
        SearchError::Contention {
            alias: self.config.alias.clone(),
            attempts,
        }
    }

    async fn retire(&self, indexes: Vec<String>) {
        for index in indexes {
            self.discard(Cleanup::SupersededIndex { index }).await;
        }
    }

    /// Best-effort index deletion. An index that is already gone counts as
    /// cleaned up.
    async fn discard(&self, cleanup: Cleanup) {
        let result = match self.store().delete_index(cleanup.target()).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        };
        self.observer
            .observe(&cleanup, &CleanupOutcome::from_result(&result));
    }
}

impl std::fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("versions", &self.versions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
