//! BuildFixture: on-disk build results for end-to-end tests.

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use thiserror::Error;

use apihub_ingest::config::BuildConfigFile;
use apihub_ingest::manifest::{
    BuilderNotification, OperationChanges, PackageComparison, PackageDocument, PackageOperation,
    PackageOperationChanges,
};
use apihub_ingest::{
    pack_files, BuildConfig, BuildResultWriter, InMemoryCatalog, IngestError, Metadata,
    PackageInfo, PublishedVersion,
};

/// Errors from fixture assembly.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("archive assembly failed: {0}")]
    Archive(#[from] IngestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A build result under construction.
///
/// Starts from a valid REST release build of `pets` 2.0 with one document,
/// one operation and a comparison against the published 1.0. Tweaks are
/// applied before the files are written.
pub struct BuildFixture {
    info: PackageInfo,
    documents: Vec<(PackageDocument, Vec<u8>)>,
    operations: Vec<(PackageOperation, Vec<u8>)>,
    comparisons: Vec<(PackageComparison, Option<PackageOperationChanges>)>,
    notifications: Vec<BuilderNotification>,
    extra_sources: Vec<String>,
    catalog: Option<InMemoryCatalog>,
    config_tweaks: Vec<Box<dyn FnOnce(&mut BuildConfig)>>,
}

/// Paths of a written fixture. The files live as long as this value.
pub struct FixtureFiles {
    pub config: PathBuf,
    pub result: PathBuf,
    pub sources: PathBuf,
    /// Absent when the fixture was written without a catalog.
    pub catalog: Option<PathBuf>,
    dir: TempDir,
}

impl FixtureFiles {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl BuildFixture {
    pub fn rest_release() -> Self {
        let info = PackageInfo {
            package_id: "pets".to_string(),
            version: "2.0".to_string(),
            revision: 1,
            kind: "package".to_string(),
            status: "release".to_string(),
            previous_version: "1.0".to_string(),
            build_type: "build".to_string(),
            api_type: "rest".to_string(),
            format: "json".to_string(),
            ..PackageInfo::default()
        };

        let document = PackageDocument {
            file_id: "openapi.yaml".to_string(),
            filename: "openapi.yaml".to_string(),
            slug: "openapi-yaml".to_string(),
            title: "Pets API".to_string(),
            doc_type: "openapi-3-0".to_string(),
            format: "yaml".to_string(),
            operation_ids: vec!["get-pets".to_string()],
            ..PackageDocument::default()
        };

        let operation = PackageOperation {
            operation_id: "get-pets".to_string(),
            data_hash: "hash-v2".to_string(),
            api_type: "rest".to_string(),
            api_kind: "bwc".to_string(),
            api_audience: "external".to_string(),
            title: "List pets".to_string(),
            metadata: metadata(json!({"path": "/pets", "method": "get"})),
            ..PackageOperation::default()
        };

        let comparison = PackageComparison {
            package_id: "pets".to_string(),
            version: "2.0".to_string(),
            revision: 0,
            previous_version_package_id: "pets".to_string(),
            previous_version: "1.0".to_string(),
            previous_version_revision: 1,
            comparison_file_id: "pets-2.0.json".to_string(),
            ..PackageComparison::default()
        };
        let changes = PackageOperationChanges {
            operation_comparisons: vec![OperationChanges {
                operation_id: "get-pets".to_string(),
                previous_operation_id: "get-pets".to_string(),
                data_hash: "hash-v2".to_string(),
                previous_data_hash: "hash-v1".to_string(),
                ..OperationChanges::default()
            }],
        };

        let catalog = InMemoryCatalog::new().with_version(PublishedVersion {
            package_id: "pets".to_string(),
            version: "1.0".to_string(),
            revision: 1,
            status: "release".to_string(),
            deleted_at: None,
        });

        Self {
            info,
            documents: vec![(document, b"openapi: 3.0.0\npaths: {}\n".to_vec())],
            operations: vec![(operation, br#"{"get":{"summary":"List pets"}}"#.to_vec())],
            comparisons: vec![(comparison, Some(changes))],
            notifications: vec![BuilderNotification {
                severity: 1,
                message: "unused schema Pet".to_string(),
                file_id: "openapi.yaml".to_string(),
            }],
            extra_sources: Vec::new(),
            catalog: Some(catalog),
            config_tweaks: Vec::new(),
        }
    }

    pub fn with_info(mut self, tweak: impl FnOnce(&mut PackageInfo)) -> Self {
        tweak(&mut self.info);
        self
    }

    pub fn with_config(mut self, tweak: impl FnOnce(&mut BuildConfig) + 'static) -> Self {
        self.config_tweaks.push(Box::new(tweak));
        self
    }

    pub fn with_document(mut self, document: PackageDocument, data: impl Into<Vec<u8>>) -> Self {
        self.documents.push((document, data.into()));
        self
    }

    pub fn without_documents(mut self) -> Self {
        self.documents.clear();
        self
    }

    /// A sources entry no build config file refers to.
    pub fn with_extra_source(mut self, name: impl Into<String>) -> Self {
        self.extra_sources.push(name.into());
        self
    }

    pub fn without_catalog(mut self) -> Self {
        self.catalog = None;
        self
    }

    fn config(&self) -> BuildConfig {
        BuildConfig {
            package_id: self.info.package_id.clone(),
            version: self.info.version.clone(),
            build_type: self.info.build_type.clone(),
            status: self.info.status.clone(),
            previous_version: self.info.previous_version.clone(),
            previous_version_package_id: self.info.previous_version_package_id.clone(),
            format: self.info.format.clone(),
            api_type: self.info.api_type.clone(),
            group_name: self.info.group_name.clone(),
            publish_id: "publish-42".to_string(),
            created_by: "ci".to_string(),
            files: self
                .documents
                .iter()
                .map(|(document, _)| BuildConfigFile {
                    file_id: document.file_id.clone(),
                    slug: document.slug.clone(),
                    ..BuildConfigFile::default()
                })
                .collect(),
            ..BuildConfig::default()
        }
    }

    /// Write config, build result, sources and catalog snapshot to a temp dir.
    pub fn write(self) -> Result<FixtureFiles, TestError> {
        let dir = TempDir::new()?;

        let mut config = self.config();
        for tweak in self.config_tweaks {
            tweak(&mut config);
        }
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config)?)?;

        let mut sources: Vec<(String, Vec<u8>)> = self
            .documents
            .iter()
            .map(|(document, data)| (document.file_id.clone(), data.clone()))
            .collect();
        sources.extend(
            self.extra_sources
                .into_iter()
                .map(|name| (name, b"stray".to_vec())),
        );
        let sources_path = dir.path().join("sources.zip");
        std::fs::write(&sources_path, pack_files(&sources)?)?;

        let mut writer = BuildResultWriter::new(self.info);
        for (document, data) in self.documents {
            writer = writer.document(document, data);
        }
        for (operation, data) in self.operations {
            writer = writer.operation(operation, data);
        }
        for (comparison, changes) in self.comparisons {
            writer = writer.comparison(comparison, changes);
        }
        for notification in self.notifications {
            writer = writer.notification(notification);
        }
        let result_path = dir.path().join("result.zip");
        std::fs::write(&result_path, writer.finish()?)?;

        let catalog_path = match self.catalog {
            Some(catalog) => {
                let path = dir.path().join("catalog.json");
                std::fs::write(&path, serde_json::to_vec_pretty(&catalog)?)?;
                Some(path)
            }
            None => None,
        };

        Ok(FixtureFiles {
            config: config_path,
            result: result_path,
            sources: sources_path,
            catalog: catalog_path,
            dir,
        })
    }
}

fn metadata(value: serde_json::Value) -> Metadata {
    serde_json::from_value(value).unwrap_or_default()
}
