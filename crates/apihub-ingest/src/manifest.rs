//! Build-result manifests (`info.json`, `documents.json`, ...) and their reader.
//!
//! All manifests are camelCase JSON. Unknown fields are ignored and absent
//! fields take their default so that the validators, not the decoder, decide
//! what is required.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::archive::{ArchiveIndex, ManifestSlot};
use crate::error::IngestError;
use crate::metadata::Metadata;
use crate::options::IngestOptions;

/// `info.json`: identity and lineage of the built version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInfo {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub kind: String,
    pub status: String,
    pub previous_version: String,
    pub previous_version_package_id: String,
    pub previous_version_revision: i32,
    pub build_type: String,
    pub format: String,
    pub api_type: String,
    pub group_name: String,
    pub refs: Vec<PackageRef>,
    pub migration_build: bool,
    pub migration_id: String,
    pub no_changelog: bool,
    pub builder_version: String,
    pub external_metadata: Option<ExternalMetadata>,
}

/// A version of another package referenced by a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageRef {
    pub ref_id: String,
    pub version: String,
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalMetadata {
    pub operations: Vec<OperationExternalMetadata>,
}

/// Extra tags for one operation, keyed by `(apiType, method, path)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationExternalMetadata {
    pub api_type: String,
    pub method: String,
    pub path: String,
    pub external_metadata: Map<String, Value>,
}

/// `documents.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageDocuments {
    pub documents: Vec<PackageDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageDocument {
    pub file_id: String,
    pub filename: String,
    pub slug: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub format: String,
    pub description: String,
    pub version: String,
    pub operation_ids: Vec<String>,
    pub metadata: Metadata,
}

/// `operations.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageOperations {
    pub operations: Vec<PackageOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageOperation {
    pub operation_id: String,
    pub data_hash: String,
    pub api_type: String,
    pub api_kind: String,
    pub api_audience: String,
    pub title: String,
    pub deprecated: bool,
    pub deprecated_items: Vec<Value>,
    pub deprecated_info: String,
    pub previous_release_versions: Vec<String>,
    pub models: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub search_scopes: BTreeMap<String, Value>,
    pub metadata: Metadata,
}

/// `comparisons.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageComparisons {
    pub comparisons: Vec<PackageComparison>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageComparison {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub previous_version_package_id: String,
    pub previous_version: String,
    pub previous_version_revision: i32,
    pub operation_types: Vec<OperationTypeChanges>,
    pub comparison_file_id: String,
    pub from_cache: bool,
}

/// Per-API-type change counters of one comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationTypeChanges {
    pub api_type: String,
    pub changes_summary: ChangeSummary,
    pub number_of_impacted_operations: ChangeSummary,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeSummary {
    pub breaking: i32,
    pub semi_breaking: i32,
    pub deprecated: i32,
    pub non_breaking: i32,
    pub annotation: i32,
    pub unclassified: i32,
}

/// Content of a `comparisons/<comparisonFileId>` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageOperationChanges {
    pub operation_comparisons: Vec<OperationChanges>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationChanges {
    pub operation_id: String,
    pub previous_operation_id: String,
    pub data_hash: String,
    pub previous_data_hash: String,
    pub change_summary: ChangeSummary,
    pub changes: Vec<Value>,
    pub json_path: Vec<String>,
}

/// `notifications.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderNotifications {
    pub notifications: Vec<BuilderNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderNotification {
    pub severity: i32,
    pub message: String,
    pub file_id: String,
}

/// Decode one manifest slot.
///
/// An empty slot is an error when `required`, otherwise it reads as `T::default()`.
pub fn read_manifest<T, R>(
    index: &mut ArchiveIndex<R>,
    slot: ManifestSlot,
    required: bool,
) -> Result<T, IngestError>
where
    T: DeserializeOwned + Default,
    R: Read + Seek,
{
    let Some(bytes) = index.read_manifest_bytes(slot)? else {
        if required {
            return Err(IngestError::FileMissingFromSources {
                file_id: slot.file_name().to_string(),
            });
        }
        return Ok(T::default());
    };

    decode_json(slot.file_name(), &bytes)
}

/// Decode a JSON payload, keeping the parser detail in the debug field.
pub(crate) fn decode_json<T: DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T, IngestError> {
    serde_json::from_slice(bytes).map_err(|e| {
        IngestError::archived(file, "failed to unmarshal file", Some(e.to_string()))
    })
}

/// The five typed manifests of one build result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifests {
    pub info: PackageInfo,
    pub documents: PackageDocuments,
    pub operations: PackageOperations,
    pub comparisons: PackageComparisons,
    pub notifications: BuilderNotifications,
}

impl Manifests {
    /// Read every manifest; only `info.json` is mandatory.
    pub fn load<R: Read + Seek>(index: &mut ArchiveIndex<R>) -> Result<Self, IngestError> {
        Ok(Self {
            info: read_manifest(index, ManifestSlot::Info, true)?,
            documents: read_manifest(index, ManifestSlot::Documents, false)?,
            operations: read_manifest(index, ManifestSlot::Operations, false)?,
            comparisons: read_manifest(index, ManifestSlot::Comparisons, false)?,
            notifications: read_manifest(index, ManifestSlot::Notifications, false)?,
        })
    }
}

/// An indexed build-result archive together with its decoded manifests.
#[derive(Debug)]
pub struct BuildResult<R> {
    pub index: ArchiveIndex<R>,
    pub manifests: Manifests,
}

impl BuildResult<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>, options: &IngestOptions) -> Result<Self, IngestError> {
        Self::open(Cursor::new(bytes), options)
    }
}

impl<R: Read + Seek> BuildResult<R> {
    pub fn open(reader: R, options: &IngestOptions) -> Result<Self, IngestError> {
        let mut index = ArchiveIndex::new(reader, options)?;
        let manifests = Manifests::load(&mut index)?;
        tracing::debug!(
            package_id = %manifests.info.package_id,
            version = %manifests.info.version,
            documents = manifests.documents.documents.len(),
            operations = manifests.operations.operations.len(),
            comparisons = manifests.comparisons.comparisons.len(),
            "build result manifests loaded"
        );
        Ok(Self { index, manifests })
    }

    pub fn info(&self) -> &PackageInfo {
        &self.manifests.info
    }
}
