use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::catalog::CatalogError;

/// Stable machine-readable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    FileMissingFromSources,
    InvalidPackageArchivedFile,
    InvalidPackagedFile,
    FileDuplicate,
    FileMissing,
    FileRedundant,
    EmptyDataForPublish,
    InvalidDocumentType,
    #[serde(rename = "InvalidGraphQLOperationType")]
    InvalidGraphQlOperationType,
    InvalidProtobufOperationType,
    ChangesAreNotEmpty,
    ExcludedComparisonReference,
    InvalidComparisonField,
    InvalidPreviousVersionPackage,
    VersionIsEqualToPreviousVersion,
    ReferenceMissingFromPackage,
    DocumentMissingFromPackage,
    PackageForBuildConfigDiscrepancy,
    PublishedPackageVersionNotFound,
    PublishedVersionRevisionNotFound,
    ComparisonNotFound,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileMissingFromSources => "FileMissingFromSources",
            Self::InvalidPackageArchivedFile => "InvalidPackageArchivedFile",
            Self::InvalidPackagedFile => "InvalidPackagedFile",
            Self::FileDuplicate => "FileDuplicate",
            Self::FileMissing => "FileMissing",
            Self::FileRedundant => "FileRedundant",
            Self::EmptyDataForPublish => "EmptyDataForPublish",
            Self::InvalidDocumentType => "InvalidDocumentType",
            Self::InvalidGraphQlOperationType => "InvalidGraphQLOperationType",
            Self::InvalidProtobufOperationType => "InvalidProtobufOperationType",
            Self::ChangesAreNotEmpty => "ChangesAreNotEmpty",
            Self::ExcludedComparisonReference => "ExcludedComparisonReference",
            Self::InvalidComparisonField => "InvalidComparisonField",
            Self::InvalidPreviousVersionPackage => "InvalidPreviousVersionPackage",
            Self::VersionIsEqualToPreviousVersion => "VersionIsEqualToPreviousVersion",
            Self::ReferenceMissingFromPackage => "ReferenceMissingFromPackage",
            Self::DocumentMissingFromPackage => "DocumentMissingFromPackage",
            Self::PackageForBuildConfigDiscrepancy => "PackageForBuildConfigDiscrepancy",
            Self::PublishedPackageVersionNotFound => "PublishedPackageVersionNotFound",
            Self::PublishedVersionRevisionNotFound => "PublishedVersionRevisionNotFound",
            Self::ComparisonNotFound => "ComparisonNotFound",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while ingesting a build result.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("required file '{file_id}' is missing from the archive")]
    FileMissingFromSources { file_id: String },

    #[error("archived file '{file}' is invalid: {error}")]
    InvalidPackageArchivedFile {
        file: String,
        error: String,
        /// Parser or decompressor detail, kept out of the message.
        debug: Option<String>,
    },

    #[error("packaged file '{file}' is invalid: {error}")]
    InvalidPackagedFile { file: String, error: String },

    #[error("duplicate files in '{config_name}': {}", .file_ids.join(", "))]
    FileDuplicate {
        file_ids: Vec<String>,
        config_name: String,
    },

    #[error("files missing from '{location}': {}", .file_ids.join(", "))]
    FileMissing {
        file_ids: Vec<String>,
        location: String,
    },

    #[error("unexpected files in '{location}': {}", .file_ids.join(", "))]
    FileRedundant {
        file_ids: Vec<String>,
        location: String,
    },

    #[error("package contains neither documents nor refs")]
    EmptyDataForPublish,

    #[error("document '{slug}' has unknown type '{document_type}'")]
    InvalidDocumentType { slug: String, document_type: String },

    #[error("operation '{operation_id}' has invalid GraphQL operation type '{operation_type}'")]
    InvalidGraphQlOperationType {
        operation_id: String,
        operation_type: String,
    },

    #[error("operation '{operation_id}' has invalid Protobuf operation type '{operation_type}'")]
    InvalidProtobufOperationType {
        operation_id: String,
        operation_type: String,
    },

    #[error("changes must be empty when noChangelog is set")]
    ChangesAreNotEmpty,

    #[error("comparison references excluded ref '{package_id}' version '{version}'")]
    ExcludedComparisonReference { package_id: String, version: String },

    #[error("comparison field '{field}' is invalid: {reason}")]
    InvalidComparisonField { field: String, reason: String },

    #[error("previous version package '{previous_version_package_id}' must differ from package '{package_id}'")]
    InvalidPreviousVersionPackage {
        previous_version_package_id: String,
        package_id: String,
    },

    #[error("version '{version}' is equal to previous version '{previous_version}'")]
    VersionIsEqualToPreviousVersion {
        version: String,
        previous_version: String,
    },

    #[error("ref '{ref_id}' version '{version}' from build config is missing from the package")]
    ReferenceMissingFromPackage { ref_id: String, version: String },

    #[error("file '{file_id}' from build config is missing from package documents")]
    DocumentMissingFromPackage { file_id: String },

    #[error("build result '{param}' is '{actual}' but build config expects '{expected}'")]
    PackageForBuildConfigDiscrepancy {
        param: String,
        expected: String,
        actual: String,
    },

    #[error("published version '{version}' of package '{package_id}' not found")]
    PublishedPackageVersionNotFound { package_id: String, version: String },

    #[error("published version '{version}' revision {revision} of package '{package_id}' not found")]
    PublishedVersionRevisionNotFound {
        package_id: String,
        version: String,
        revision: i32,
    },

    #[error("cached comparison '{comparison_id}' not found")]
    ComparisonNotFound { comparison_id: String },

    #[error("ingestion cancelled")]
    Cancelled,

    /// Catalog infrastructure failure, propagated unchanged.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl IngestError {
    /// Shorthand for a packaged-file error.
    pub(crate) fn packaged(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self::InvalidPackagedFile {
            file: file.into(),
            error: error.into(),
        }
    }

    /// Shorthand for an archived-file error.
    pub(crate) fn archived(
        file: impl Into<String>,
        error: impl Into<String>,
        debug: Option<String>,
    ) -> Self {
        Self::InvalidPackageArchivedFile {
            file: file.into(),
            error: error.into(),
            debug,
        }
    }

    pub(crate) fn comparison_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidComparisonField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FileMissingFromSources { .. } => ErrorCode::FileMissingFromSources,
            Self::InvalidPackageArchivedFile { .. } => ErrorCode::InvalidPackageArchivedFile,
            Self::InvalidPackagedFile { .. } => ErrorCode::InvalidPackagedFile,
            Self::FileDuplicate { .. } => ErrorCode::FileDuplicate,
            Self::FileMissing { .. } => ErrorCode::FileMissing,
            Self::FileRedundant { .. } => ErrorCode::FileRedundant,
            Self::EmptyDataForPublish => ErrorCode::EmptyDataForPublish,
            Self::InvalidDocumentType { .. } => ErrorCode::InvalidDocumentType,
            Self::InvalidGraphQlOperationType { .. } => ErrorCode::InvalidGraphQlOperationType,
            Self::InvalidProtobufOperationType { .. } => ErrorCode::InvalidProtobufOperationType,
            Self::ChangesAreNotEmpty => ErrorCode::ChangesAreNotEmpty,
            Self::ExcludedComparisonReference { .. } => ErrorCode::ExcludedComparisonReference,
            Self::InvalidComparisonField { .. } => ErrorCode::InvalidComparisonField,
            Self::InvalidPreviousVersionPackage { .. } => ErrorCode::InvalidPreviousVersionPackage,
            Self::VersionIsEqualToPreviousVersion { .. } => {
                ErrorCode::VersionIsEqualToPreviousVersion
            }
            Self::ReferenceMissingFromPackage { .. } => ErrorCode::ReferenceMissingFromPackage,
            Self::DocumentMissingFromPackage { .. } => ErrorCode::DocumentMissingFromPackage,
            Self::PackageForBuildConfigDiscrepancy { .. } => {
                ErrorCode::PackageForBuildConfigDiscrepancy
            }
            Self::PublishedPackageVersionNotFound { .. } => {
                ErrorCode::PublishedPackageVersionNotFound
            }
            Self::PublishedVersionRevisionNotFound { .. } => {
                ErrorCode::PublishedVersionRevisionNotFound
            }
            Self::ComparisonNotFound { .. } => ErrorCode::ComparisonNotFound,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Catalog(_) | Self::Io(_) | Self::Json(_) | Self::Zip(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status the surrounding service reports for this error.
    pub fn status(&self) -> u16 {
        match self.code() {
            ErrorCode::PublishedPackageVersionNotFound
            | ErrorCode::PublishedVersionRevisionNotFound
            | ErrorCode::ComparisonNotFound => 404,
            ErrorCode::Cancelled | ErrorCode::Internal => 500,
            _ => 400,
        }
    }

    /// Whether this is a domain validation failure rather than an infrastructure one.
    pub fn is_validation(&self) -> bool {
        !matches!(self.code(), ErrorCode::Cancelled | ErrorCode::Internal)
    }

    fn params(&self) -> BTreeMap<&'static str, Value> {
        let mut params = BTreeMap::new();
        match self {
            Self::FileMissingFromSources { file_id } | Self::DocumentMissingFromPackage { file_id } => {
                params.insert("fileId", json!(file_id));
            }
            Self::InvalidPackageArchivedFile { file, error, .. }
            | Self::InvalidPackagedFile { file, error } => {
                params.insert("file", json!(file));
                params.insert("error", json!(error));
            }
            Self::FileDuplicate {
                file_ids,
                config_name,
            } => {
                params.insert("fileIds", json!(file_ids));
                params.insert("configName", json!(config_name));
            }
            Self::FileMissing { file_ids, location } | Self::FileRedundant { file_ids, location } => {
                params.insert("fileIds", json!(file_ids));
                params.insert("location", json!(location));
            }
            Self::InvalidDocumentType {
                slug,
                document_type,
            } => {
                params.insert("slug", json!(slug));
                params.insert("type", json!(document_type));
            }
            Self::InvalidGraphQlOperationType {
                operation_id,
                operation_type,
            }
            | Self::InvalidProtobufOperationType {
                operation_id,
                operation_type,
            } => {
                params.insert("operationId", json!(operation_id));
                params.insert("type", json!(operation_type));
            }
            Self::ExcludedComparisonReference {
                package_id,
                version,
            }
            | Self::PublishedPackageVersionNotFound {
                package_id,
                version,
            } => {
                params.insert("packageId", json!(package_id));
                params.insert("version", json!(version));
            }
            Self::InvalidComparisonField { field, reason } => {
                params.insert("field", json!(field));
                params.insert("reason", json!(reason));
            }
            Self::InvalidPreviousVersionPackage {
                previous_version_package_id,
                package_id,
            } => {
                params.insert("previousVersionPackageId", json!(previous_version_package_id));
                params.insert("packageId", json!(package_id));
            }
            Self::VersionIsEqualToPreviousVersion {
                version,
                previous_version,
            } => {
                params.insert("version", json!(version));
                params.insert("previousVersion", json!(previous_version));
            }
            Self::ReferenceMissingFromPackage { ref_id, version } => {
                params.insert("refId", json!(ref_id));
                params.insert("version", json!(version));
            }
            Self::PackageForBuildConfigDiscrepancy {
                param,
                expected,
                actual,
            } => {
                params.insert("param", json!(param));
                params.insert("expected", json!(expected));
                params.insert("actual", json!(actual));
            }
            Self::PublishedVersionRevisionNotFound {
                package_id,
                version,
                revision,
            } => {
                params.insert("packageId", json!(package_id));
                params.insert("version", json!(version));
                params.insert("revision", json!(revision));
            }
            Self::ComparisonNotFound { comparison_id } => {
                params.insert("comparisonId", json!(comparison_id));
            }
            Self::EmptyDataForPublish
            | Self::ChangesAreNotEmpty
            | Self::Cancelled
            | Self::Catalog(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Zip(_) => {}
        }
        params
    }

    /// Render the structured record handed to the surrounding service.
    pub fn to_record(&self) -> ErrorRecord {
        let debug = match self {
            Self::InvalidPackageArchivedFile { debug, .. } => debug.clone(),
            Self::Catalog(e) => Some(e.to_string()),
            _ => None,
        };
        ErrorRecord {
            status: self.status(),
            code: self.code(),
            message: self.to_string(),
            params: self
                .params()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            debug,
        }
    }
}

/// Serializable error record: `{status, code, message, params, debug}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}
