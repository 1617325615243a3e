//! Read-only view of the existing catalog consulted during validation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::split_version_ref;

/// Infrastructure failure of a catalog lookup.
#[derive(Debug, Error)]
#[error("catalog lookup failed: {source}")]
pub struct CatalogError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl CatalogError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A published version revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishedVersion {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub status: String,
    /// Set when the version was soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PublishedVersion {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A stored version comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredComparison {
    pub comparison_id: String,
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub previous_package_id: String,
    pub previous_version: String,
    pub previous_revision: i32,
}

/// Lookups the ingestion core needs from the catalog.
///
/// `Ok(None)` is a domain-level "not found"; `Err` is an infrastructure
/// failure and aborts ingestion unchanged.
pub trait CatalogLookup {
    /// Latest active revision of `(package_id, version)`.
    fn get_version(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<PublishedVersion>, CatalogError>;

    /// Exact active revision.
    fn get_version_by_revision(
        &self,
        package_id: &str,
        version: &str,
        revision: i32,
    ) -> Result<Option<PublishedVersion>, CatalogError>;

    /// Version by `<version>@<revision>` key, soft-deleted ones included.
    fn get_version_including_deleted(
        &self,
        package_id: &str,
        version_ref: &str,
    ) -> Result<Option<PublishedVersion>, CatalogError>;

    fn get_version_comparison(
        &self,
        comparison_id: &str,
    ) -> Result<Option<StoredComparison>, CatalogError>;
}

/// Catalog held in memory, loadable from a JSON snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCatalog {
    pub versions: Vec<PublishedVersion>,
    pub comparisons: Vec<StoredComparison>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: PublishedVersion) -> Self {
        self.versions.push(version);
        self
    }

    pub fn with_comparison(mut self, comparison: StoredComparison) -> Self {
        self.comparisons.push(comparison);
        self
    }

    /// Parse a snapshot: `{"versions": [...], "comparisons": [...]}`.
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(content).map_err(CatalogError::new)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(CatalogError::new)?;
        Self::from_json(&content)
    }

    fn latest<'a>(
        candidates: impl Iterator<Item = &'a PublishedVersion>,
    ) -> Option<PublishedVersion> {
        candidates.max_by_key(|v| v.revision).cloned()
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn get_version(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<PublishedVersion>, CatalogError> {
        Ok(Self::latest(self.versions.iter().filter(|v| {
            v.package_id == package_id && v.version == version && !v.is_deleted()
        })))
    }

    fn get_version_by_revision(
        &self,
        package_id: &str,
        version: &str,
        revision: i32,
    ) -> Result<Option<PublishedVersion>, CatalogError> {
        Ok(self
            .versions
            .iter()
            .find(|v| {
                v.package_id == package_id
                    && v.version == version
                    && v.revision == revision
                    && !v.is_deleted()
            })
            .cloned())
    }

    fn get_version_including_deleted(
        &self,
        package_id: &str,
        version_ref: &str,
    ) -> Result<Option<PublishedVersion>, CatalogError> {
        let (version, revision) = split_version_ref(version_ref);
        Ok(Self::latest(self.versions.iter().filter(|v| {
            v.package_id == package_id
                && v.version == version
                && (revision == 0 || v.revision == revision)
        })))
    }

    fn get_version_comparison(
        &self,
        comparison_id: &str,
    ) -> Result<Option<StoredComparison>, CatalogError> {
        Ok(self
            .comparisons
            .iter()
            .find(|c| c.comparison_id == comparison_id)
            .cloned())
    }
}
