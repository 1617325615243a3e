//! Zip assembly for build results and transformed bundles.
//!
//! Output is deterministic: entries are written in a fixed order with a
//! fixed timestamp, so identical inputs produce identical bytes.

use std::io::{Cursor, Write};

use serde::Serialize;
use serde_json::{json, Map, Value};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::archive::{ArchiveIndex, ManifestSlot, COMPARISONS_DIR, DOCUMENTS_DIR, OPERATIONS_DIR};
use crate::entities::{
    OperationComparisonEntity, OperationDataEntity, OperationEntity, OperationMetadata,
    PublishedContent, TransformedContentData,
};
use crate::error::IngestError;
use crate::manifest::{
    BuilderNotification, BuilderNotifications, OperationChanges, PackageComparison,
    PackageComparisons, PackageDocument, PackageDocuments, PackageInfo, PackageOperation,
    PackageOperationChanges, PackageOperations,
};
use crate::metadata::Metadata;
use crate::options::IngestOptions;
use crate::pipeline::IngestResult;
use crate::types::BuildType;

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Pack `(name, bytes)` pairs into a zip, in the given order.
pub fn pack_files(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>, IngestError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer.start_file(name.as_str(), file_options())?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Assembles a build-result archive from manifests and payloads.
#[derive(Debug, Clone, Default)]
pub struct BuildResultWriter {
    info: PackageInfo,
    documents: Vec<(PackageDocument, Vec<u8>)>,
    operations: Vec<(PackageOperation, Vec<u8>)>,
    comparisons: Vec<(PackageComparison, Option<PackageOperationChanges>)>,
    notifications: Vec<BuilderNotification>,
    extra_files: Vec<(String, Vec<u8>)>,
    changelog: Option<Vec<u8>>,
}

impl BuildResultWriter {
    pub fn new(info: PackageInfo) -> Self {
        Self {
            info,
            ..Self::default()
        }
    }

    /// Add a document, stored under `documents/<filename>`.
    pub fn document(mut self, document: PackageDocument, data: impl Into<Vec<u8>>) -> Self {
        self.documents.push((document, data.into()));
        self
    }

    /// Add an operation, stored under `operations/<operationId>`.
    pub fn operation(mut self, operation: PackageOperation, data: impl Into<Vec<u8>>) -> Self {
        self.operations.push((operation, data.into()));
        self
    }

    /// Add a comparison; `changes` is stored under `comparisons/<comparisonFileId>`.
    pub fn comparison(
        mut self,
        comparison: PackageComparison,
        changes: Option<PackageOperationChanges>,
    ) -> Self {
        self.comparisons.push((comparison, changes));
        self
    }

    pub fn notification(mut self, notification: BuilderNotification) -> Self {
        self.notifications.push(notification);
        self
    }

    /// Add an arbitrary entry, bypassing the manifests.
    pub fn raw_file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.extra_files.push((name.into(), data.into()));
        self
    }

    pub fn changelog(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.changelog = Some(data.into());
        self
    }

    /// Encode lifted entities back into a build result for `info`.
    ///
    /// Identity and build type come from `lifted`; the other `info` fields are
    /// kept as given. Cached comparisons are known by id only and are not
    /// re-encoded.
    pub fn from_entities(
        mut info: PackageInfo,
        lifted: &IngestResult,
    ) -> Result<Self, IngestError> {
        info.package_id = lifted.package_id.clone();
        info.version = lifted.version.clone();
        info.revision = lifted.revision;
        info.build_type = lifted.build_type.as_str().to_string();
        let migration = info.migration_build;
        let mut writer = Self::new(info);

        for (content, data) in lifted.documents.iter().zip(&lifted.document_data) {
            writer = writer.document(encode_document(content, migration), data.data.clone());
        }
        for (operation, data) in lifted.operations.iter().zip(&lifted.operation_data) {
            writer = writer.operation(encode_operation(operation, data), data.data.clone());
        }

        for version in &lifted.version_comparisons {
            let rows: Vec<OperationChanges> = lifted
                .operation_comparisons
                .iter()
                .filter(|row| row.comparison_id == version.comparison_id)
                .map(encode_change)
                .collect();
            let identity = &version.identity;
            let comparison = PackageComparison {
                package_id: identity.package_id.clone(),
                version: identity.version.clone(),
                revision: identity.revision,
                previous_version_package_id: identity.previous_package_id.clone(),
                previous_version: identity.previous_version.clone(),
                previous_version_revision: identity.previous_revision,
                operation_types: version.operation_types.clone(),
                comparison_file_id: if rows.is_empty() {
                    String::new()
                } else {
                    format!("{}.json", version.comparison_id)
                },
                from_cache: false,
            };
            let changes = (!rows.is_empty()).then_some(PackageOperationChanges {
                operation_comparisons: rows,
            });
            writer = writer.comparison(comparison, changes);
        }

        if let Some(transformed) = &lifted.transformed {
            writer = writer.transformed_documents(lifted.build_type, transformed)?;
        }

        for notification in &lifted.notifications {
            writer = writer.notification(BuilderNotification {
                severity: notification.severity,
                message: notification.message.clone(),
                file_id: notification.file_id.clone(),
            });
        }
        if let Some(changelog) = &lifted.changelog {
            writer = writer.changelog(changelog.clone());
        }
        Ok(writer)
    }

    /// Recover the documents a transformed artifact was assembled from.
    fn transformed_documents(
        mut self,
        build_type: BuildType,
        transformed: &TransformedContentData,
    ) -> Result<Self, IngestError> {
        if build_type == BuildType::MergedSpecification {
            if let Some(document) = transformed.documents_info.first() {
                self = self.document(document.clone(), transformed.data.clone());
            }
            return Ok(self);
        }

        let mut bundle =
            ArchiveIndex::from_bytes(transformed.data.clone(), &IngestOptions::default())?;
        for document in &transformed.documents_info {
            if let Some(data) = bundle.read_entry(&document.filename)? {
                self = self.document(document.clone(), data);
            }
        }
        Ok(self)
    }

    /// Write the archive.
    pub fn finish(self) -> Result<Vec<u8>, IngestError> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        files.push((ManifestSlot::Info.file_name().to_string(), to_json(&self.info)?));

        if !self.documents.is_empty() {
            let manifest = PackageDocuments {
                documents: self.documents.iter().map(|(d, _)| d.clone()).collect(),
            };
            files.push((ManifestSlot::Documents.file_name().to_string(), to_json(&manifest)?));
        }
        if !self.operations.is_empty() {
            let manifest = PackageOperations {
                operations: self.operations.iter().map(|(o, _)| o.clone()).collect(),
            };
            files.push((ManifestSlot::Operations.file_name().to_string(), to_json(&manifest)?));
        }
        if !self.comparisons.is_empty() {
            let manifest = PackageComparisons {
                comparisons: self.comparisons.iter().map(|(c, _)| c.clone()).collect(),
            };
            files.push((ManifestSlot::Comparisons.file_name().to_string(), to_json(&manifest)?));
        }
        if !self.notifications.is_empty() {
            let manifest = BuilderNotifications {
                notifications: self.notifications,
            };
            files.push((
                ManifestSlot::Notifications.file_name().to_string(),
                to_json(&manifest)?,
            ));
        }
        if let Some(changelog) = self.changelog {
            files.push((ManifestSlot::Changelog.file_name().to_string(), changelog));
        }

        for (document, data) in self.documents {
            files.push((format!("{DOCUMENTS_DIR}{}", document.filename), data));
        }
        for (operation, data) in self.operations {
            files.push((format!("{OPERATIONS_DIR}{}", operation.operation_id), data));
        }
        for (comparison, changes) in self.comparisons {
            if let Some(changes) = changes {
                files.push((
                    format!("{COMPARISONS_DIR}{}", comparison.comparison_file_id),
                    to_json(&changes)?,
                ));
            }
        }
        files.extend(self.extra_files);

        pack_files(&files)
    }
}

fn encode_document(content: &PublishedContent, migration: bool) -> PackageDocument {
    let projected = &content.metadata;
    let mut metadata = Map::new();
    if !projected.labels.is_empty() {
        metadata.insert("labels".to_string(), json!(projected.labels));
    }
    if !projected.blob_id.is_empty() {
        metadata.insert("blobId".to_string(), json!(projected.blob_id));
    }
    if let Some(info) = &projected.info {
        metadata.insert("info".to_string(), Value::Object(info.clone()));
    }
    if let Some(external_docs) = &projected.external_docs {
        metadata.insert("externalDocs".to_string(), Value::Object(external_docs.clone()));
    }
    if !projected.tags.is_empty() {
        metadata.insert("tags".to_string(), json!(projected.tags));
    }
    if migration {
        metadata.insert("index".to_string(), json!(content.index));
    }

    PackageDocument {
        file_id: content.file_id.clone(),
        filename: content.filename.clone(),
        slug: content.slug.clone(),
        title: content.title.clone(),
        doc_type: content.doc_type.clone(),
        format: content.format.clone(),
        description: projected.description.clone(),
        version: projected.version.clone(),
        operation_ids: content.operation_ids.clone(),
        metadata: Metadata::new(metadata),
    }
}

fn encode_operation(operation: &OperationEntity, data: &OperationDataEntity) -> PackageOperation {
    let mut metadata = Map::new();
    let tags = match &operation.metadata {
        OperationMetadata::Rest { tags, path, method } => {
            metadata.insert("path".to_string(), json!(path));
            metadata.insert("method".to_string(), json!(method));
            tags.clone()
        }
        OperationMetadata::GraphQl {
            tags,
            operation_type,
            method,
        } => {
            metadata.insert("type".to_string(), json!(operation_type));
            metadata.insert("method".to_string(), json!(method));
            tags.clone()
        }
        OperationMetadata::Protobuf {
            operation_type,
            method,
        } => {
            metadata.insert("type".to_string(), json!(operation_type));
            metadata.insert("method".to_string(), json!(method));
            Vec::new()
        }
    };
    if let Some(custom_tags) = &operation.custom_tags {
        metadata.insert("customTags".to_string(), Value::Object(custom_tags.clone()));
    }

    PackageOperation {
        operation_id: operation.operation_id.clone(),
        data_hash: operation.data_hash.clone(),
        api_type: operation.api_type.clone(),
        api_kind: operation.kind.clone(),
        api_audience: operation.api_audience.clone(),
        title: operation.title.clone(),
        deprecated: operation.deprecated,
        deprecated_items: operation.deprecated_items.clone(),
        deprecated_info: operation.deprecated_info.clone(),
        previous_release_versions: operation.previous_release_versions.clone(),
        models: operation.models.clone(),
        tags,
        search_scopes: data.search_scopes.clone(),
        metadata: Metadata::new(metadata),
    }
}

fn encode_change(row: &OperationComparisonEntity) -> OperationChanges {
    OperationChanges {
        operation_id: row.operation_id.clone(),
        previous_operation_id: row.previous_operation_id.clone(),
        data_hash: row.data_hash.clone(),
        previous_data_hash: row.previous_data_hash.clone(),
        change_summary: row.change_summary,
        changes: row.changes.clone(),
        json_path: row.json_path.clone(),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, IngestError> {
    Ok(serde_json::to_vec_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::BuildResult;

    #[test]
    fn pack_files_is_deterministic() {
        let files = vec![
            ("b.txt".to_string(), b"second".to_vec()),
            ("a.txt".to_string(), b"first".to_vec()),
        ];
        assert_eq!(pack_files(&files).unwrap(), pack_files(&files).unwrap());
    }

    #[test]
    fn writes_manifests_and_payloads() {
        let info = PackageInfo {
            package_id: "pkg".to_string(),
            version: "1.0".to_string(),
            ..PackageInfo::default()
        };
        let document = PackageDocument {
            file_id: "api.yaml".to_string(),
            filename: "api.yaml".to_string(),
            ..PackageDocument::default()
        };
        let bytes = BuildResultWriter::new(info.clone())
            .document(document.clone(), b"openapi: 3.0.0".to_vec())
            .changelog(b"{}".to_vec())
            .finish()
            .unwrap();

        let mut result = BuildResult::from_bytes(bytes, &IngestOptions::default()).unwrap();
        assert_eq!(result.manifests.info, info);
        assert_eq!(result.manifests.documents.documents, vec![document]);
        assert!(result.index.manifest(ManifestSlot::Changelog).is_some());
        assert_eq!(
            result.index.read_document("api.yaml").unwrap().unwrap(),
            b"openapi: 3.0.0"
        );
    }
}
