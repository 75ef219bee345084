//! The per-alias version document and the store that reads and writes it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{SearchError, SearchResult};
use crate::names::{validate_index_name, IndexNameGenerator};
use crate::store::{CasOutcome, SearchStore};

/// The logical pointer for one alias: which physical index is live, and
/// how many generations have been promoted so far.
///
/// Serialised with the field names existing version documents use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexVersion {
    /// Number of successful promotions. Strictly increasing.
    #[serde(rename = "Version")]
    pub count: u64,
    /// Name of the live physical index; empty before the first promotion.
    #[serde(rename = "Index", default)]
    pub index_name: String,
}

impl IndexVersion {
    pub fn new(count: u64, index_name: impl Into<String>) -> Self {
        Self {
            count,
            index_name: index_name.into(),
        }
    }

    /// Whether this version names a physical index.
    pub fn has_index(&self) -> bool {
        !self.index_name.is_empty()
    }

    /// The version that would promote `index` on top of this one.
    pub fn successor(&self, index: impl Into<String>) -> Self {
        Self::new(self.count + 1, index)
    }
}

/// Reads and conditionally writes the version document for one alias, and
/// provisions fresh physical indexes for it.
///
/// The document lives in `metadata_index` under the alias name. A missing
/// document is the normal state of a pristine alias.
pub struct IndexVersionStore {
    store: Arc<dyn SearchStore>,
    metadata_index: String,
    alias: String,
    schema: Value,
    names: Arc<dyn IndexNameGenerator>,
}

impl IndexVersionStore {
    pub fn new(
        store: Arc<dyn SearchStore>,
        metadata_index: impl Into<String>,
        alias: impl Into<String>,
        schema: Value,
        names: Arc<dyn IndexNameGenerator>,
    ) -> Self {
        Self {
            store,
            metadata_index: metadata_index.into(),
            alias: alias.into(),
            schema,
            names,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn metadata_index(&self) -> &str {
        &self.metadata_index
    }

    /// The underlying search store.
    pub fn store(&self) -> &Arc<dyn SearchStore> {
        &self.store
    }

    /// Read the alias's current version and the document revision it was
    /// read at.
    ///
    /// A missing document yields `(IndexVersion::default(), 0)`.
    pub async fn current_version(&self) -> SearchResult<(IndexVersion, u64)> {
        let doc = self
            .store
            .get_document(&self.metadata_index, &self.alias)
            .await?;
        let Some(doc) = doc else {
            return Ok((IndexVersion::default(), 0));
        };
        let version: IndexVersion =
            serde_json::from_value(doc.body).map_err(|source| SearchError::MalformedDocument {
                alias: self.alias.clone(),
                source,
            })?;
        Ok((version, doc.revision))
    }

    /// Write `version` only if the document is still at `expected_revision`.
    ///
    /// Returns `Ok(false)` if another writer got there first. That is an
    /// expected outcome of racing, not an error.
    pub async fn update_version(
        &self,
        version: &IndexVersion,
        expected_revision: u64,
    ) -> SearchResult<bool> {
        let body = serde_json::to_value(version).map_err(|source| {
            SearchError::MalformedDocument {
                alias: self.alias.clone(),
                source,
            }
        })?;
        let outcome = self
            .store
            .put_document_if(&self.metadata_index, &self.alias, &body, expected_revision)
            .await?;
        match outcome {
            CasOutcome::Applied { revision } => {
                debug!(
                    alias = %self.alias,
                    generation = version.count,
                    index = %version.index_name,
                    revision,
                    "version document updated"
                );
                Ok(true)
            }
            CasOutcome::Conflict { current } => {
                debug!(
                    alias = %self.alias,
                    expected_revision,
                    current_revision = current,
                    "version document changed underneath us"
                );
                Ok(false)
            }
        }
    }

    /// Create a brand-new, empty physical index with the configured schema.
    ///
    /// The alias is not touched.
    pub async fn new_index(&self) -> SearchResult<String> {
        let name = self.names.next_name(&self.alias);
        validate_index_name(&name)?;
        self.store.create_index(&name, &self.schema).await?;
        info!(alias = %self.alias, index = %name, "created physical index");
        Ok(name)
    }
}

impl std::fmt::Debug for IndexVersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexVersionStore")
            .field("metadata_index", &self.metadata_index)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}
