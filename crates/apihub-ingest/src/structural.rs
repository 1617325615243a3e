//! File-set consistency of the sources archive and of the build-result folders.

use std::collections::BTreeSet;
use std::io::{Read, Seek};

use crate::archive::{
    ArchiveIndex, Bucket, COMPARISONS_DIR, COMPARISONS_FILE, DOCUMENTS_DIR, DOCUMENTS_FILE,
    OPERATIONS_DIR, OPERATIONS_FILE,
};
use crate::config::BuildConfig;
use crate::error::IngestError;
use crate::manifest::BuildResult;

/// Location reported for sources-archive file-set errors.
pub const SOURCES_LOCATION: &str = "sources";
/// Location reported for unknown build-result entries.
pub const BUILD_RESULT_LOCATION: &str = "build result";

/// Outcome of comparing a bucket against the expected ids.
///
/// Only the first non-empty class is populated: duplicates win over missing,
/// missing wins over unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSetReport {
    pub duplicates: Vec<String>,
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

impl FileSetReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.missing.is_empty() && self.unknown.is_empty()
    }
}

/// Compare the names in `bucket` with `expected`.
pub fn validate_file_set(bucket: &Bucket, expected: &[&str]) -> FileSetReport {
    let mut seen = BTreeSet::new();
    let mut duplicates: BTreeSet<&str> = bucket.collisions().collect();
    for id in expected {
        if !seen.insert(*id) {
            duplicates.insert(*id);
        }
    }
    if !duplicates.is_empty() {
        return FileSetReport {
            duplicates: to_owned(duplicates),
            ..FileSetReport::default()
        };
    }

    let missing: BTreeSet<&str> = seen.iter().copied().filter(|id| !bucket.contains(id)).collect();
    if !missing.is_empty() {
        return FileSetReport {
            missing: to_owned(missing),
            ..FileSetReport::default()
        };
    }

    let unknown: BTreeSet<&str> = bucket.names().filter(|name| !seen.contains(name)).collect();
    FileSetReport {
        unknown: to_owned(unknown),
        ..FileSetReport::default()
    }
}

fn to_owned(set: BTreeSet<&str>) -> Vec<String> {
    set.into_iter().map(str::to_string).collect()
}

/// Check that the sources archive holds exactly the files listed in the build config.
pub fn validate_sources<R: Read + Seek>(
    sources: &ArchiveIndex<R>,
    config: &BuildConfig,
) -> Result<(), IngestError> {
    let report = validate_file_set(sources.entries(), &config.file_ids());
    if !report.duplicates.is_empty() {
        return Err(IngestError::FileDuplicate {
            file_ids: report.duplicates,
            config_name: "files".to_string(),
        });
    }
    if !report.missing.is_empty() {
        return Err(IngestError::FileMissing {
            file_ids: report.missing,
            location: SOURCES_LOCATION.to_string(),
        });
    }
    if !report.unknown.is_empty() {
        return Err(IngestError::FileRedundant {
            file_ids: report.unknown,
            location: SOURCES_LOCATION.to_string(),
        });
    }
    tracing::debug!(files = config.files.len(), "sources archive file set is consistent");
    Ok(())
}

/// Check each build-result folder against its manifest.
///
/// Unknown entries from all folders are collected, together with uncategorized
/// entries, and reported once after every folder passed the other checks.
pub fn validate_build_result_files<R: Read + Seek>(
    result: &BuildResult<R>,
) -> Result<(), IngestError> {
    let manifests = &result.manifests;
    let index = &result.index;

    let documents: Vec<&str> = manifests
        .documents
        .documents
        .iter()
        .map(|d| d.filename.as_str())
        .collect();
    let operations: Vec<&str> = manifests
        .operations
        .operations
        .iter()
        .map(|o| o.operation_id.as_str())
        .collect();
    let comparisons: Vec<&str> = manifests
        .comparisons
        .comparisons
        .iter()
        .map(|c| c.comparison_file_id.as_str())
        .filter(|id| !id.is_empty())
        .collect();

    let folders = [
        (index.document_files(), documents, DOCUMENTS_FILE, DOCUMENTS_DIR),
        (index.operation_files(), operations, OPERATIONS_FILE, OPERATIONS_DIR),
        (index.comparison_files(), comparisons, COMPARISONS_FILE, COMPARISONS_DIR),
    ];

    let mut unknown = Vec::new();
    for (bucket, expected, config_name, folder) in folders {
        let report = validate_file_set(bucket, &expected);
        if !report.duplicates.is_empty() {
            return Err(IngestError::FileDuplicate {
                file_ids: report.duplicates,
                config_name: config_name.to_string(),
            });
        }
        if !report.missing.is_empty() {
            return Err(IngestError::FileMissing {
                file_ids: report.missing,
                location: folder.to_string(),
            });
        }
        unknown.extend(report.unknown.into_iter().map(|name| format!("{folder}{name}")));
        tracing::debug!(folder, files = expected.len(), "build result folder checked");
    }

    unknown.extend(index.uncategorized().names().map(str::to_string));
    if !unknown.is_empty() {
        return Err(IngestError::FileRedundant {
            file_ids: unknown,
            location: BUILD_RESULT_LOCATION.to_string(),
        });
    }
    Ok(())
}
