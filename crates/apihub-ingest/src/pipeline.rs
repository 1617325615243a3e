//! Orchestration of the ingestion stages per build type.

use std::io::{Cursor, Read, Seek};

use apihub_telemetry::{
    log_entities_lifted, log_ingest_completed, log_ingest_started, log_stage_passed,
    log_validation_failure,
};
use serde::Serialize;

use crate::archive::{ArchiveIndex, ManifestSlot, INFO_FILE};
use crate::bundler::read_transformed;
use crate::catalog::CatalogLookup;
use crate::config::BuildConfig;
use crate::entities::{
    BuilderNotificationEntity, OperationComparisonEntity, OperationDataEntity, OperationEntity,
    PublishedContent, PublishedContentData, TransformedContentData, VersionComparisonEntity,
};
use crate::error::IngestError;
use crate::lifter::{read_comparisons, read_documents, read_notifications, read_operations};
use crate::manifest::BuildResult;
use crate::options::{CancelToken, IngestOptions};
use crate::semantic::{validate_build_result_against_config, validate_changes, validate_package};
use crate::structural::{validate_build_result_files, validate_sources};
use crate::types::BuildType;

/// Every entity produced from one build result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub build_type: BuildType,
    pub documents: Vec<PublishedContent>,
    pub document_data: Vec<PublishedContentData>,
    pub operations: Vec<OperationEntity>,
    pub operation_data: Vec<OperationDataEntity>,
    pub version_comparisons: Vec<VersionComparisonEntity>,
    pub operation_comparisons: Vec<OperationComparisonEntity>,
    pub cached_comparison_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed: Option<TransformedContentData>,
    pub notifications: Vec<BuilderNotificationEntity>,
    /// `changelog.json`, passed through unread.
    #[serde(skip)]
    pub changelog: Option<Vec<u8>>,
}

impl IngestResult {
    fn empty(build_type: BuildType) -> Self {
        Self {
            package_id: String::new(),
            version: String::new(),
            revision: 0,
            build_type,
            documents: Vec::new(),
            document_data: Vec::new(),
            operations: Vec::new(),
            operation_data: Vec::new(),
            version_comparisons: Vec::new(),
            operation_comparisons: Vec::new(),
            cached_comparison_ids: Vec::new(),
            transformed: None,
            notifications: Vec::new(),
            changelog: None,
        }
    }
}

/// Drives validation and lifting of build results against one catalog.
pub struct Ingestor<'a> {
    catalog: &'a dyn CatalogLookup,
    options: IngestOptions,
    cancel: CancelToken,
}

impl<'a> Ingestor<'a> {
    pub fn new(catalog: &'a dyn CatalogLookup) -> Self {
        Self {
            catalog,
            options: IngestOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Check a sources archive against the files listed in `config`.
    pub fn validate_sources(&self, sources: Vec<u8>, config: &BuildConfig) -> Result<(), IngestError> {
        let outcome = ArchiveIndex::from_bytes(sources, &self.options)
            .and_then(|index| validate_sources(&index, config));
        if let Err(e) = &outcome {
            report_failure(e);
        }
        outcome
    }

    /// Index a build-result archive and decode its manifests.
    pub fn open(&self, bytes: Vec<u8>) -> Result<BuildResult<Cursor<Vec<u8>>>, IngestError> {
        let outcome = BuildResult::from_bytes(bytes, &self.options);
        if let Err(e) = &outcome {
            report_failure(e);
        }
        outcome
    }

    /// Run every validation stage that applies to the result's build type.
    pub fn validate<R: Read + Seek>(
        &self,
        result: &BuildResult<R>,
        config: &BuildConfig,
    ) -> Result<BuildType, IngestError> {
        let outcome = self.check(result, config);
        if let Err(e) = &outcome {
            report_failure(e);
        }
        outcome
    }

    fn check<R: Read + Seek>(
        &self,
        result: &BuildResult<R>,
        config: &BuildConfig,
    ) -> Result<BuildType, IngestError> {
        let manifests = &result.manifests;
        let build_type = BuildType::parse(&manifests.info.build_type).ok_or_else(|| {
            IngestError::packaged(
                INFO_FILE,
                format!("invalid buildType '{}'", manifests.info.build_type),
            )
        })?;

        self.cancel.check()?;
        validate_build_result_files(result)?;
        log_stage_passed!(stage = "file_set");

        self.cancel.check()?;
        match build_type {
            BuildType::Build => {
                validate_package(manifests, config, self.catalog)?;
                self.cancel.check()?;
                validate_build_result_against_config(manifests, config)?;
            }
            BuildType::Changelog => {
                validate_build_result_against_config(manifests, config)?;
                self.cancel.check()?;
                validate_changes(manifests, self.catalog)?;
            }
            BuildType::ReducedSourceSpecifications | BuildType::MergedSpecification => {
                validate_build_result_against_config(manifests, config)?;
            }
        }
        Ok(build_type)
    }

    /// Open, validate and lift a build-result archive held in memory.
    pub fn ingest(&self, bytes: Vec<u8>, config: &BuildConfig) -> Result<IngestResult, IngestError> {
        let mut result = self.open(bytes)?;
        self.ingest_build_result(&mut result, config)
    }

    /// Validate and lift an already opened build result.
    pub fn ingest_build_result<R: Read + Seek>(
        &self,
        result: &mut BuildResult<R>,
        config: &BuildConfig,
    ) -> Result<IngestResult, IngestError> {
        let info = result.info();
        log_ingest_started!(
            package_id = %info.package_id,
            version = %info.version,
            revision = info.revision,
            build_type = %info.build_type
        );

        let outcome = self.run(result, config);
        match &outcome {
            Ok(lifted) => log_ingest_completed!(
                package_id = %lifted.package_id,
                version = %lifted.version,
                revision = lifted.revision,
                build_type = lifted.build_type.as_str()
            ),
            Err(e) => report_failure(e),
        }
        outcome
    }

    fn run<R: Read + Seek>(
        &self,
        result: &mut BuildResult<R>,
        config: &BuildConfig,
    ) -> Result<IngestResult, IngestError> {
        let build_type = self.check(result, config)?;

        let info = result.info();
        let mut lifted = IngestResult {
            package_id: info.package_id.clone(),
            version: info.version.clone(),
            revision: info.revision,
            ..IngestResult::empty(build_type)
        };

        match build_type {
            BuildType::Build => {
                let documents = read_documents(result, &self.cancel)?;
                lifted.documents = documents.contents;
                lifted.document_data = documents.data;

                let operations = read_operations(result, &self.cancel)?;
                lifted.operations = operations.operations;
                lifted.operation_data = operations.data;

                self.lift_comparisons(result, &mut lifted)?;
            }
            BuildType::Changelog => self.lift_comparisons(result, &mut lifted)?,
            BuildType::ReducedSourceSpecifications | BuildType::MergedSpecification => {
                lifted.transformed = Some(read_transformed(result, &self.cancel)?);
            }
        }

        self.cancel.check()?;
        lifted.notifications = read_notifications(&result.manifests, &config.publish_id);
        lifted.changelog = result.index.read_manifest_bytes(ManifestSlot::Changelog)?;

        log_entities_lifted!(
            documents = lifted.documents.len(),
            operations = lifted.operations.len(),
            version_comparisons = lifted.version_comparisons.len(),
            operation_comparisons = lifted.operation_comparisons.len(),
            cached_comparisons = lifted.cached_comparison_ids.len(),
            notifications = lifted.notifications.len()
        );
        Ok(lifted)
    }

    fn lift_comparisons<R: Read + Seek>(
        &self,
        result: &mut BuildResult<R>,
        lifted: &mut IngestResult,
    ) -> Result<(), IngestError> {
        let comparisons = read_comparisons(result, &self.cancel)?;
        lifted.version_comparisons = comparisons.versions;
        lifted.operation_comparisons = comparisons.operations;
        lifted.cached_comparison_ids = comparisons.cached_ids;
        Ok(())
    }
}

/// Log a failed ingestion once, with its error code.
fn report_failure(error: &IngestError) {
    if error.is_validation() {
        log_validation_failure!(code = error.code().as_str(), error = %error);
    } else {
        tracing::error!(code = error.code().as_str(), error = %error, "ingestion failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, PublishedVersion};
    use crate::config::BuildConfigFile;
    use crate::error::ErrorCode;
    use crate::manifest::{
        BuilderNotification, OperationChanges, PackageComparison, PackageDocument, PackageInfo,
        PackageOperation, PackageOperationChanges,
    };
    use crate::metadata::Metadata;
    use crate::writer::{pack_files, BuildResultWriter};
    use apihub_telemetry::logging::events::VALIDATION_FAILURE;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn info() -> PackageInfo {
        PackageInfo {
            package_id: "pkg".to_string(),
            version: "2.0".to_string(),
            revision: 1,
            kind: "package".to_string(),
            status: "release".to_string(),
            previous_version: "1.0".to_string(),
            build_type: "build".to_string(),
            api_type: "rest".to_string(),
            ..PackageInfo::default()
        }
    }

    fn config_for(info: &PackageInfo, file_ids: &[&str]) -> BuildConfig {
        BuildConfig {
            package_id: info.package_id.clone(),
            version: info.version.clone(),
            build_type: info.build_type.clone(),
            status: info.status.clone(),
            previous_version: info.previous_version.clone(),
            previous_version_package_id: info.previous_version_package_id.clone(),
            format: info.format.clone(),
            publish_id: "publish-1".to_string(),
            files: file_ids
                .iter()
                .map(|id| BuildConfigFile {
                    file_id: id.to_string(),
                    ..BuildConfigFile::default()
                })
                .collect(),
            ..BuildConfig::default()
        }
    }

    fn document(file_id: &str) -> PackageDocument {
        PackageDocument {
            file_id: file_id.to_string(),
            filename: file_id.to_string(),
            slug: file_id.replace('.', "-"),
            doc_type: "openapi-3-0".to_string(),
            ..PackageDocument::default()
        }
    }

    fn operation() -> PackageOperation {
        PackageOperation {
            operation_id: "get-pets".to_string(),
            data_hash: "hash-2".to_string(),
            api_type: "rest".to_string(),
            api_audience: "internal".to_string(),
            metadata: serde_json::from_value::<Metadata>(json!({"path": "/pets", "method": "get"}))
                .unwrap(),
            ..PackageOperation::default()
        }
    }

    fn main_comparison() -> PackageComparison {
        PackageComparison {
            package_id: "pkg".to_string(),
            version: "2.0".to_string(),
            revision: 0,
            previous_version_package_id: "pkg".to_string(),
            previous_version: "1.0".to_string(),
            previous_version_revision: 1,
            comparison_file_id: "main.json".to_string(),
            ..PackageComparison::default()
        }
    }

    fn changes() -> PackageOperationChanges {
        PackageOperationChanges {
            operation_comparisons: vec![OperationChanges {
                operation_id: "get-pets".to_string(),
                previous_operation_id: "get-pets".to_string(),
                data_hash: "hash-2".to_string(),
                previous_data_hash: "hash-1".to_string(),
                ..OperationChanges::default()
            }],
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new().with_version(PublishedVersion {
            package_id: "pkg".to_string(),
            version: "1.0".to_string(),
            revision: 1,
            status: "release".to_string(),
            deleted_at: None,
        })
    }

    fn build_archive(info: PackageInfo) -> Vec<u8> {
        BuildResultWriter::new(info)
            .document(document("api.yaml"), b"openapi: 3.0.0".to_vec())
            .operation(operation(), br#"{"get": {}}"#.to_vec())
            .comparison(main_comparison(), Some(changes()))
            .notification(BuilderNotification {
                severity: 1,
                message: "unused schema".to_string(),
                file_id: "api.yaml".to_string(),
            })
            .changelog(br#"{"changes": []}"#.to_vec())
            .finish()
            .unwrap()
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
        }
    }

    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, CapturedLogs) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(logs.clone())
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        (value, logs)
    }

    #[test]
    fn build_result_is_lifted() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let result = Ingestor::new(&catalog)
            .ingest(build_archive(info), &config)
            .unwrap();

        assert_eq!(result.build_type, BuildType::Build);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.document_data.len(), 1);
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.version_comparisons.len(), 1);
        assert_eq!(result.operation_comparisons.len(), 1);
        assert_eq!(
            result.operation_comparisons[0].identity,
            result.version_comparisons[0].identity
        );
        assert_eq!(result.notifications[0].build_id, "publish-1");
        assert_eq!(result.changelog.as_deref(), Some(&br#"{"changes": []}"#[..]));
        assert!(result.transformed.is_none());
    }

    #[test]
    fn ingestion_is_deterministic() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let ingestor = Ingestor::new(&catalog);
        let first = ingestor.ingest(build_archive(info.clone()), &config).unwrap();
        let second = ingestor.ingest(build_archive(info), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn lifted_entities_re_encode_to_the_same_entities() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let ingestor = Ingestor::new(&catalog);

        let mut document = document("api.yaml");
        document.description = "Pet store".to_string();
        document.metadata = serde_json::from_value::<Metadata>(json!({
            "labels": ["pets"],
            "blobId": "blob-1",
            "info": {"contact": {"name": "team"}},
            "tags": [{"name": "pets"}]
        }))
        .unwrap();
        let mut operation = operation();
        operation.tags = vec!["pets".to_string()];
        operation.api_kind = "bwc".to_string();
        operation.search_scopes = [("all".to_string(), json!("get pets"))].into();
        operation.metadata = serde_json::from_value::<Metadata>(json!({
            "path": "/pets",
            "method": "get",
            "customTags": {"x-team": "core"}
        }))
        .unwrap();

        let bytes = BuildResultWriter::new(info.clone())
            .document(document, b"openapi: 3.0.0".to_vec())
            .operation(operation, br#"{"get": {}}"#.to_vec())
            .comparison(main_comparison(), Some(changes()))
            .notification(BuilderNotification {
                severity: 1,
                message: "unused schema".to_string(),
                file_id: "api.yaml".to_string(),
            })
            .changelog(br#"{"changes": []}"#.to_vec())
            .finish()
            .unwrap();
        let lifted = ingestor.ingest(bytes, &config).unwrap();
        assert_eq!(lifted.documents[0].metadata.labels, vec!["pets"]);
        assert!(lifted.operations[0].custom_tags.is_some());

        let encoded = BuildResultWriter::from_entities(info, &lifted)
            .unwrap()
            .finish()
            .unwrap();
        let again = ingestor.ingest(encoded, &config).unwrap();
        assert_eq!(lifted, again);
    }

    #[test]
    fn reduced_export_re_encodes_from_its_bundle() {
        let (bytes, config) =
            group_export(BuildType::ReducedSourceSpecifications, &["a.json", "b.json"]);
        let catalog = catalog();
        let ingestor = Ingestor::new(&catalog);
        let info = ingestor.open(bytes.clone()).unwrap().info().clone();
        let lifted = ingestor.ingest(bytes, &config).unwrap();

        let encoded = BuildResultWriter::from_entities(info, &lifted)
            .unwrap()
            .finish()
            .unwrap();
        let again = ingestor.ingest(encoded, &config).unwrap();
        assert_eq!(lifted.transformed, again.transformed);
        assert_eq!(again.transformed.unwrap().documents_info.len(), 2);
    }

    #[test]
    fn empty_package_is_rejected() {
        let info = info();
        let config = config_for(&info, &[]);
        let bytes = BuildResultWriter::new(info).finish().unwrap();
        let err = Ingestor::new(&catalog()).ingest(bytes, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyDataForPublish);
    }

    #[test]
    fn group_with_documents_is_rejected() {
        let mut info = info();
        info.kind = "group".to_string();
        let config = config_for(&info, &["api.yaml"]);
        let err = Ingestor::new(&catalog())
            .ingest(build_archive(info), &config)
            .unwrap_err();
        let record = err.to_record();
        assert_eq!(record.code, ErrorCode::InvalidPackagedFile);
        assert_eq!(record.params["file"], json!("documents"));
    }

    #[test]
    fn duplicate_source_files_are_rejected() {
        let info = info();
        let config = config_for(&info, &["api.yaml", "api.yaml"]);
        let sources = pack_files(&[("api.yaml".to_string(), b"openapi: 3.0.0".to_vec())]).unwrap();
        let err = Ingestor::new(&catalog())
            .validate_sources(sources, &config)
            .unwrap_err();
        assert_eq!(err.to_record().params["fileIds"], json!(["api.yaml"]));
    }

    #[test]
    fn at_sign_in_comparison_version_is_rejected() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let mut comparison = main_comparison();
        comparison.version = "1.0@r2".to_string();
        comparison.comparison_file_id.clear();
        let bytes = BuildResultWriter::new(info)
            .document(document("api.yaml"), b"openapi: 3.0.0".to_vec())
            .comparison(comparison, None)
            .finish()
            .unwrap();
        match Ingestor::new(&catalog()).ingest(bytes, &config) {
            Err(IngestError::InvalidComparisonField { field, .. }) => assert_eq!(field, "version"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn migration_build_without_prior_version() {
        let mut info = info();
        info.migration_build = true;
        let config = config_for(&info, &["api.yaml"]);
        let err = Ingestor::new(&catalog())
            .ingest(build_archive(info), &config)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PublishedPackageVersionNotFound);
        assert_eq!(err.status(), 404);
    }

    fn group_export(build_type: BuildType, documents: &[&str]) -> (Vec<u8>, BuildConfig) {
        let info = PackageInfo {
            package_id: "group".to_string(),
            version: "2024.1".to_string(),
            revision: 1,
            kind: "group".to_string(),
            status: "release".to_string(),
            build_type: build_type.as_str().to_string(),
            api_type: "rest".to_string(),
            group_name: "public".to_string(),
            ..PackageInfo::default()
        };
        let config = config_for(&info, &[]);
        let mut writer = BuildResultWriter::new(info);
        for name in documents {
            writer = writer.document(document(name), b"{}".to_vec());
        }
        (writer.finish().unwrap(), config)
    }

    #[test]
    fn merged_specification_with_three_documents() {
        let (bytes, config) = group_export(
            BuildType::MergedSpecification,
            &["a.json", "b.json", "c.json"],
        );
        let err = Ingestor::new(&catalog()).ingest(bytes, &config).unwrap_err();
        match err {
            IngestError::InvalidPackageArchivedFile { error, .. } => {
                assert!(error.starts_with("expected exactly 1 document"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn merged_specification_is_transformed() {
        let (bytes, config) = group_export(BuildType::MergedSpecification, &["merged.json"]);
        let result = Ingestor::new(&catalog()).ingest(bytes, &config).unwrap();
        let transformed = result.transformed.unwrap();
        assert_eq!(transformed.data, b"{}");
        assert!(result.documents.is_empty());
    }

    #[test]
    fn changelog_build_lifts_comparisons_only() {
        let mut info = info();
        info.build_type = "changelog".to_string();
        info.previous_version_package_id = "pkg".to_string();
        info.previous_version_revision = 1;
        let mut config = config_for(&info, &["api.yaml"]);
        config.previous_version_package_id = "pkg".to_string();

        let result = Ingestor::new(&catalog())
            .ingest(build_archive(info), &config)
            .unwrap();
        assert_eq!(result.build_type, BuildType::Changelog);
        assert!(result.documents.is_empty());
        assert_eq!(result.version_comparisons.len(), 1);
    }

    #[test]
    fn unknown_build_type() {
        let mut info = info();
        info.build_type = "nightly".to_string();
        let config = config_for(&info, &["api.yaml"]);
        let err = Ingestor::new(&catalog())
            .ingest(build_archive(info), &config)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPackagedFile);
    }

    #[test]
    fn failures_are_logged_once_per_entry_point() {
        let mut info = info();
        info.build_type = "nightly".to_string();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let ingestor = Ingestor::new(&catalog);

        let (outcome, logs) = with_captured_logs(|| {
            let result = ingestor.open(build_archive(info.clone())).unwrap();
            ingestor.validate(&result, &config)
        });
        assert_eq!(outcome.unwrap_err().code(), ErrorCode::InvalidPackagedFile);
        assert_eq!(logs.count(VALIDATION_FAILURE), 1);

        let (outcome, logs) = with_captured_logs(|| ingestor.ingest(build_archive(info), &config));
        assert!(outcome.is_err());
        assert_eq!(logs.count(VALIDATION_FAILURE), 1);

        let (outcome, logs) = with_captured_logs(|| ingestor.open(b"not a zip".to_vec()));
        assert!(outcome.is_err());
        assert_eq!(logs.count(VALIDATION_FAILURE), 1);
    }

    #[test]
    fn cancelled_ingestion() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Ingestor::new(&catalog)
            .with_cancel_token(cancel)
            .ingest(build_archive(info), &config)
            .unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
    }

    #[test]
    fn oversized_entries_are_rejected() {
        let info = info();
        let config = config_for(&info, &["api.yaml"]);
        let catalog = catalog();
        let err = Ingestor::new(&catalog)
            .with_options(IngestOptions::new().with_max_entry_size(8))
            .ingest(build_archive(info), &config)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPackageArchivedFile);
    }
}
