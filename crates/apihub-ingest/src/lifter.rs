//! Lift a validated build result into entity records.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use serde_json::{Map, Value};

use crate::archive::{COMPARISONS_DIR, OPERATIONS_FILE};
use crate::entities::{
    BuilderNotificationEntity, ComparisonIdentity, ContentMetadata, OperationComparisonEntity,
    OperationDataEntity, OperationEntity, OperationMetadata, PublishedContent,
    PublishedContentData, VersionComparisonEntity,
};
use crate::error::IngestError;
use crate::ids::content_checksum;
use crate::manifest::{
    decode_json, BuildResult, Manifests, OperationChanges, PackageDocument, PackageInfo,
    PackageOperation, PackageOperationChanges,
};
use crate::options::CancelToken;
use crate::sniff::detect_media_type;
use crate::types::ApiType;

/// Content rows and their payloads, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiftedDocuments {
    pub contents: Vec<PublishedContent>,
    pub data: Vec<PublishedContentData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiftedOperations {
    pub operations: Vec<OperationEntity>,
    pub data: Vec<OperationDataEntity>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiftedComparisons {
    pub versions: Vec<VersionComparisonEntity>,
    pub operations: Vec<OperationComparisonEntity>,
    /// Ids of comparisons the builder took from the catalog cache.
    pub cached_ids: Vec<String>,
}

/// Build content and content-data rows for every packaged document.
///
/// Documents whose file is absent are skipped.
pub fn read_documents<R: Read + Seek>(
    result: &mut BuildResult<R>,
    cancel: &CancelToken,
) -> Result<LiftedDocuments, IngestError> {
    let info = &result.manifests.info;
    let mut lifted = LiftedDocuments::default();

    for (position, document) in result.manifests.documents.documents.iter().enumerate() {
        cancel.check()?;
        let Some(data) = result.index.read_document(&document.filename)? else {
            tracing::debug!(file_id = %document.file_id, "document file absent, skipped");
            continue;
        };

        let media_type = detect_media_type(&data);
        let checksum = content_checksum(&data, &document.file_id, media_type);
        let (path, name) = split_file_id(&document.file_id);

        let index = if info.migration_build {
            document.metadata.get_int("index").unwrap_or(position as i64)
        } else {
            position as i64
        };

        lifted.contents.push(PublishedContent {
            package_id: info.package_id.clone(),
            version: info.version.clone(),
            revision: info.revision,
            file_id: document.file_id.clone(),
            checksum: checksum.clone(),
            index,
            slug: document.slug.clone(),
            name: name.to_string(),
            path: path.to_string(),
            title: document.title.clone(),
            doc_type: document.doc_type.clone(),
            format: document.format.clone(),
            filename: document.filename.clone(),
            operation_ids: document.operation_ids.clone(),
            metadata: content_metadata(document)?,
        });
        lifted.data.push(PublishedContentData {
            package_id: info.package_id.clone(),
            checksum,
            media_type: media_type.to_string(),
            data,
        });
    }

    Ok(lifted)
}

/// `dir/sub/file.yaml` splits into `("dir/sub", "file.yaml")`.
fn split_file_id(file_id: &str) -> (&str, &str) {
    file_id.rsplit_once('/').unwrap_or(("", file_id))
}

/// Only malformed `tags` reject the document; other malformed keys are dropped.
fn content_metadata(document: &PackageDocument) -> Result<ContentMetadata, IngestError> {
    let metadata = &document.metadata;
    let lenient = |key: &str, e: crate::metadata::MetadataError| {
        tracing::debug!(
            file_id = %document.file_id,
            key,
            error = %e,
            "malformed metadata ignored"
        );
    };
    Ok(ContentMetadata {
        description: document.description.clone(),
        version: document.version.clone(),
        labels: metadata.get_string_array("labels").unwrap_or_else(|e| {
            lenient("labels", e);
            Vec::new()
        }),
        blob_id: metadata.get_string("blobId"),
        info: metadata.get_object("info").unwrap_or_else(|e| {
            lenient("info", e);
            None
        }),
        external_docs: metadata.get_object("externalDocs").unwrap_or_else(|e| {
            lenient("externalDocs", e);
            None
        }),
        tags: metadata
            .get_object_array("tags")
            .map_err(|e| IngestError::packaged(document.slug.as_str(), e.to_string()))?,
    })
}

/// `(apiType, lowercased method, path)` key of external operation metadata.
type ExternalKey = (String, String, String);

fn external_metadata_index(info: &PackageInfo) -> HashMap<ExternalKey, &Map<String, Value>> {
    let Some(external) = &info.external_metadata else {
        return HashMap::new();
    };
    external
        .operations
        .iter()
        .map(|op| {
            (
                (op.api_type.clone(), op.method.to_lowercase(), op.path.clone()),
                &op.external_metadata,
            )
        })
        .collect()
}

/// Build operation and operation-data rows for every packaged operation.
///
/// Operations whose file is absent are skipped.
pub fn read_operations<R: Read + Seek>(
    result: &mut BuildResult<R>,
    cancel: &CancelToken,
) -> Result<LiftedOperations, IngestError> {
    let info = &result.manifests.info;
    let external = external_metadata_index(info);
    let mut lifted = LiftedOperations::default();

    for operation in &result.manifests.operations.operations {
        cancel.check()?;
        let Some(data) = result.index.read_operation(&operation.operation_id)? else {
            tracing::debug!(operation_id = %operation.operation_id, "operation file absent, skipped");
            continue;
        };

        let mut custom_tags = operation
            .metadata
            .get_custom_tags()
            .map_err(|e| IngestError::packaged(OPERATIONS_FILE, e.to_string()))?;

        let key = (
            operation.api_type.clone(),
            operation.metadata.get_method().to_lowercase(),
            operation.metadata.get_original_path(),
        );
        if let Some(extra) = external.get(&key).filter(|extra| !extra.is_empty()) {
            custom_tags
                .get_or_insert_with(Map::new)
                .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        lifted.operations.push(OperationEntity {
            package_id: info.package_id.clone(),
            version: info.version.clone(),
            revision: info.revision,
            operation_id: operation.operation_id.clone(),
            data_hash: operation.data_hash.clone(),
            api_type: operation.api_type.clone(),
            kind: operation.api_kind.clone(),
            api_audience: operation.api_audience.clone(),
            title: operation.title.clone(),
            deprecated: operation.deprecated,
            deprecated_info: operation.deprecated_info.clone(),
            deprecated_items: operation.deprecated_items.clone(),
            previous_release_versions: operation.previous_release_versions.clone(),
            models: operation.models.clone(),
            metadata: operation_metadata(operation)?,
            custom_tags,
        });
        lifted.data.push(OperationDataEntity {
            package_id: info.package_id.clone(),
            data_hash: operation.data_hash.clone(),
            data,
            search_scopes: operation.search_scopes.clone(),
        });
    }

    Ok(lifted)
}

fn operation_metadata(operation: &PackageOperation) -> Result<OperationMetadata, IngestError> {
    let metadata = &operation.metadata;
    let api_type = ApiType::parse(&operation.api_type).ok_or_else(|| {
        IngestError::packaged(
            OPERATIONS_FILE,
            format!(
                "operation '{}' has invalid apiType '{}'",
                operation.operation_id, operation.api_type
            ),
        )
    })?;
    Ok(match api_type {
        ApiType::Rest => OperationMetadata::Rest {
            tags: operation.tags.clone(),
            path: metadata.get_path(),
            method: metadata.get_method(),
        },
        ApiType::GraphQl => OperationMetadata::GraphQl {
            tags: operation.tags.clone(),
            operation_type: metadata.get_type(),
            method: metadata.get_method(),
        },
        ApiType::Protobuf => OperationMetadata::Protobuf {
            operation_type: metadata.get_type(),
            method: metadata.get_method(),
        },
    })
}

/// Index of the comparison describing the published version itself.
/// Revision `0` matches any revision.
fn main_comparison(manifests: &Manifests) -> Option<usize> {
    let info = &manifests.info;
    manifests.comparisons.comparisons.iter().position(|c| {
        c.package_id == info.package_id
            && c.version == info.version
            && (c.revision == 0 || c.revision == info.revision)
    })
}

/// Build version and operation comparison rows.
///
/// Cached comparisons only contribute their id; the main comparison lists
/// every other comparison id as a ref.
pub fn read_comparisons<R: Read + Seek>(
    result: &mut BuildResult<R>,
    cancel: &CancelToken,
) -> Result<LiftedComparisons, IngestError> {
    let comparisons = &result.manifests.comparisons.comparisons;
    let main = main_comparison(&result.manifests);
    if comparisons.len() > 1 && main.is_none() {
        return Err(IngestError::packaged(
            "comparisons",
            format!(
                "none of {} comparisons matches the published version",
                comparisons.len()
            ),
        ));
    }

    let identities: Vec<ComparisonIdentity> =
        comparisons.iter().map(ComparisonIdentity::of).collect();
    let ids: Vec<String> = identities.iter().map(ComparisonIdentity::id).collect();

    let main_id = main.map(|i| ids[i].as_str());
    let mut refs = Vec::new();
    let mut seen_refs = HashSet::new();
    for id in &ids {
        if Some(id.as_str()) != main_id && seen_refs.insert(id.as_str()) {
            refs.push(id.clone());
        }
    }
    if let Some(i) = main.filter(|&i| comparisons[i].from_cache && !refs.is_empty()) {
        tracing::warn!(
            comparison_id = %ids[i],
            dropped_refs = refs.len(),
            "main comparison is cached, its refs are not recorded"
        );
    }

    let mut lifted = LiftedComparisons::default();
    let mut emitted = HashSet::new();
    for (i, comparison) in comparisons.iter().enumerate() {
        cancel.check()?;
        let id = &ids[i];
        if comparison.from_cache {
            if !lifted.cached_ids.contains(id) {
                lifted.cached_ids.push(id.clone());
            }
            continue;
        }
        if !emitted.insert(id.as_str()) {
            continue;
        }

        let identity = identities[i].clone();
        let file_id = comparison.comparison_file_id.as_str();
        if !file_id.is_empty() {
            let Some(bytes) = result.index.read_comparison(file_id)? else {
                return Err(IngestError::FileMissing {
                    file_ids: vec![file_id.to_string()],
                    location: COMPARISONS_DIR.to_string(),
                });
            };
            let changes: PackageOperationChanges = decode_json(file_id, &bytes)?;
            for (row, change) in changes.operation_comparisons.into_iter().enumerate() {
                check_operation_changes(&change)
                    .map_err(|reason| IngestError::packaged(file_id, format!("row {row}: {reason}")))?;
                lifted.operations.push(OperationComparisonEntity {
                    comparison_id: id.clone(),
                    identity: identity.clone(),
                    operation_id: change.operation_id,
                    previous_operation_id: change.previous_operation_id,
                    data_hash: change.data_hash,
                    previous_data_hash: change.previous_data_hash,
                    change_summary: change.change_summary,
                    changes: change.changes,
                    json_path: change.json_path,
                });
            }
        }

        lifted.versions.push(VersionComparisonEntity {
            comparison_id: id.clone(),
            identity,
            operation_types: comparison.operation_types.clone(),
            refs: if Some(i) == main {
                refs.clone()
            } else {
                Vec::new()
            },
        });
    }

    Ok(lifted)
}

/// An operation id and its data hash are either both set or both empty,
/// and at least one side of the pair is set.
fn check_operation_changes(change: &OperationChanges) -> Result<(), &'static str> {
    if change.operation_id.is_empty() && change.previous_operation_id.is_empty() {
        return Err("operationId and previousOperationId are both empty");
    }
    if change.operation_id.is_empty() != change.data_hash.is_empty() {
        return Err("operationId and dataHash must be set together");
    }
    if change.previous_operation_id.is_empty() != change.previous_data_hash.is_empty() {
        return Err("previousOperationId and previousDataHash must be set together");
    }
    Ok(())
}

/// Stamp builder notifications with the publish id.
pub fn read_notifications(manifests: &Manifests, publish_id: &str) -> Vec<BuilderNotificationEntity> {
    manifests
        .notifications
        .notifications
        .iter()
        .map(|n| BuilderNotificationEntity {
            build_id: publish_id.to_string(),
            severity: n.severity,
            message: n.message.clone(),
            file_id: n.file_id.clone(),
        })
        .collect()
}
