//! Ingestion core for API build results.
//!
//! Indexes the sources and build-result archives produced by an external
//! builder, validates them against the build configuration and the existing
//! catalog, and lifts them into persistence-ready entity records.

pub mod archive;
pub mod bundler;
pub mod catalog;
pub mod config;
pub mod entities;
pub mod error;
pub mod ids;
pub mod lifter;
pub mod manifest;
pub mod metadata;
pub mod options;
pub mod pipeline;
pub mod semantic;
pub mod sniff;
pub mod structural;
pub mod types;
pub mod writer;

pub use archive::{ArchiveIndex, Bucket, EntryHandle, ManifestSlot};
pub use bundler::read_transformed;
pub use catalog::{CatalogError, CatalogLookup, InMemoryCatalog, PublishedVersion, StoredComparison};
pub use config::{BuildConfig, BuildConfigFile, BuildConfigRef};
pub use entities::{
    BuilderNotificationEntity, ComparisonIdentity, ContentMetadata, OperationComparisonEntity,
    OperationDataEntity, OperationEntity, OperationMetadata, PublishedContent,
    PublishedContentData, TransformedContentData, VersionComparisonEntity,
};
pub use error::{ErrorCode, ErrorRecord, IngestError};
pub use lifter::{
    read_comparisons, read_documents, read_notifications, read_operations, LiftedComparisons,
    LiftedDocuments, LiftedOperations,
};
pub use manifest::{BuildResult, Manifests, PackageInfo};
pub use metadata::{Metadata, MetadataError};
pub use options::{CancelToken, IngestOptions};
pub use pipeline::{IngestResult, Ingestor};
pub use semantic::{validate_build_result_against_config, validate_changes, validate_package};
pub use structural::{validate_build_result_files, validate_file_set, validate_sources, FileSetReport};
pub use types::{ApiAudience, ApiType, BuildType, PackageKind, VersionStatus};
pub use writer::{pack_files, BuildResultWriter};
