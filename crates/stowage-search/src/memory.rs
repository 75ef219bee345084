//! In-memory search store for testing and ephemeral use.
//!
//! [`InMemorySearchStore`] keeps documents, indexes and aliases in maps
//! behind a single `Mutex`, so every trait method is atomic. Document
//! revisions and conditional writes behave like a real store: an absent
//! document is revision 0 and each successful write increments it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SearchError, SearchResult};
use crate::store::{CasOutcome, SearchStore, VersionedDocument};

/// A mutation recorded by [`InMemorySearchStore`], in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    IndexCreated { index: String },
    IndexDeleted { index: String },
    AliasRetargeted { alias: String, index: String },
    DocumentWritten { index: String, id: String, revision: u64 },
}

#[derive(Debug, Default)]
struct PhysicalIndex {
    schema: Value,
    aliases: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<(String, String), VersionedDocument>,
    indexes: BTreeMap<String, PhysicalIndex>,
    events: Vec<StoreEvent>,
}

/// An in-memory implementation of [`SearchStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemorySearchStore {
    state: Mutex<State>,
}

impl InMemorySearchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SearchResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| SearchError::store("in-memory search store", format!("lock poisoned: {e}")))
    }

    /// Sorted names of every physical index.
    pub fn indexes(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Schema an index was created with.
    pub fn schema_of(&self, index: &str) -> Option<Value> {
        self.lock()
            .ok()
            .and_then(|s| s.indexes.get(index).map(|i| i.schema.clone()))
    }

    /// Every mutation so far, oldest first.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    /// Remove a document outright, bypassing revision checks.
    pub fn delete_document(&self, index: &str, id: &str) -> bool {
        self.lock()
            .map(|mut s| s.documents.remove(&(index.to_string(), id.to_string())).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SearchStore for InMemorySearchStore {
    async fn get_document(&self, index: &str, id: &str) -> SearchResult<Option<VersionedDocument>> {
        let state = self.lock()?;
        Ok(state
            .documents
            .get(&(index.to_string(), id.to_string()))
            .cloned())
    }

    async fn put_document_if(
        &self,
        index: &str,
        id: &str,
        body: &Value,
        expected_revision: u64,
    ) -> SearchResult<CasOutcome> {
        let mut state = self.lock()?;
        let key = (index.to_string(), id.to_string());
        let current = state.documents.get(&key).map_or(0, |d| d.revision);
        if current != expected_revision {
            return Ok(CasOutcome::Conflict { current });
        }

        let revision = current + 1;
        state.documents.insert(
            key,
            VersionedDocument {
                body: body.clone(),
                revision,
            },
        );
        state.events.push(StoreEvent::DocumentWritten {
            index: index.to_string(),
            id: id.to_string(),
            revision,
        });
        Ok(CasOutcome::Applied { revision })
    }

    async fn list_indexes_for_alias(&self, alias: &str) -> SearchResult<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .indexes
            .iter()
            .filter(|(_, idx)| idx.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        Ok(self.lock()?.indexes.contains_key(index))
    }

    async fn create_index(&self, index: &str, schema: &Value) -> SearchResult<()> {
        let mut state = self.lock()?;
        if state.indexes.contains_key(index) {
            return Err(SearchError::AlreadyExists {
                name: index.to_string(),
            });
        }
        if state.indexes.values().any(|i| i.aliases.contains(index)) {
            return Err(SearchError::InvalidName {
                name: index.to_string(),
                reason: "an alias with this name exists".into(),
            });
        }
        state.indexes.insert(
            index.to_string(),
            PhysicalIndex {
                schema: schema.clone(),
                aliases: BTreeSet::new(),
            },
        );
        state.events.push(StoreEvent::IndexCreated {
            index: index.to_string(),
        });
        Ok(())
    }

    async fn retarget_alias(
        &self,
        alias: &str,
        expected: &[String],
        index: &str,
    ) -> SearchResult<bool> {
        let mut state = self.lock()?;
        if state.indexes.contains_key(alias) {
            return Err(SearchError::InvalidName {
                name: alias.to_string(),
                reason: "an index with this name exists".into(),
            });
        }
        let current: BTreeSet<&String> = state
            .indexes
            .iter()
            .filter(|(_, idx)| idx.aliases.contains(alias))
            .map(|(name, _)| name)
            .collect();
        if current != expected.iter().collect::<BTreeSet<_>>() {
            return Ok(false);
        }
        if !state.indexes.contains_key(index) {
            return Err(SearchError::not_found(format!("index {index}")));
        }
        for (name, idx) in state.indexes.iter_mut() {
            if name == index {
                idx.aliases.insert(alias.to_string());
            } else {
                idx.aliases.remove(alias);
            }
        }
        state.events.push(StoreEvent::AliasRetargeted {
            alias: alias.to_string(),
            index: index.to_string(),
        });
        Ok(true)
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        let mut state = self.lock()?;
        if state.indexes.remove(index).is_none() {
            return Err(SearchError::not_found(format!("index {index}")));
        }
        state.events.push(StoreEvent::IndexDeleted {
            index: index.to_string(),
        });
        Ok(())
    }
}
