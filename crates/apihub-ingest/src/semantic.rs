//! Cross-manifest validation of a build result.
//!
//! Runs after the file-set checks. Every stage fails fast; the catalog is
//! only read, never written.

use std::collections::HashSet;

use apihub_telemetry::log_stage_passed;

use crate::archive::{COMPARISONS_FILE, INFO_FILE, OPERATIONS_FILE};
use crate::catalog::{CatalogLookup, PublishedVersion};
use crate::config::BuildConfig;
use crate::error::IngestError;
use crate::ids::{comparison_id, version_ref_key};
use crate::manifest::{Manifests, PackageComparison, PackageInfo, PackageOperation};
use crate::types::{
    is_document_type, ApiAudience, ApiType, BuildType, PackageKind, VersionStatus, DEFAULT_FORMAT,
    GRAPHQL_OPERATION_TYPES, PROTOBUF_OPERATION_TYPES,
};

/// Which catalog variant resolves versions referenced by comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionLookup {
    IncludingDeleted,
    ActiveOnly,
}

/// `(refId, version)` pairs of refs excluded from the package.
type ExcludedRefs<'a> = HashSet<(&'a str, &'a str)>;

/// Validate a `build` result: package info, kind, documents, operations and comparisons.
pub fn validate_package(
    manifests: &Manifests,
    config: &BuildConfig,
    catalog: &dyn CatalogLookup,
) -> Result<(), IngestError> {
    let info = &manifests.info;

    check_package_info(info, config, catalog)?;
    log_stage_passed!(stage = "package_info");

    check_kind(manifests)?;
    log_stage_passed!(stage = "kind");

    for document in &manifests.documents.documents {
        if !is_document_type(&document.doc_type) {
            return Err(IngestError::InvalidDocumentType {
                slug: document.slug.clone(),
                document_type: document.doc_type.clone(),
            });
        }
    }
    log_stage_passed!(stage = "documents");

    for operation in &manifests.operations.operations {
        check_operation(operation)?;
    }
    log_stage_passed!(stage = "operations");

    check_comparisons(manifests, catalog)?;
    log_stage_passed!(stage = "comparisons");

    Ok(())
}

fn check_package_info(
    info: &PackageInfo,
    config: &BuildConfig,
    catalog: &dyn CatalogLookup,
) -> Result<(), IngestError> {
    let required = [
        ("packageId", &info.package_id),
        ("version", &info.version),
        ("kind", &info.kind),
        ("status", &info.status),
        ("buildType", &info.build_type),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(IngestError::packaged(
                INFO_FILE,
                format!("field '{field}' is required"),
            ));
        }
    }

    if VersionStatus::parse(&info.status).is_none() {
        return Err(IngestError::packaged(
            INFO_FILE,
            format!("invalid status '{}'", info.status),
        ));
    }

    if info.previous_version_package_id == info.package_id {
        return Err(IngestError::InvalidPreviousVersionPackage {
            previous_version_package_id: info.previous_version_package_id.clone(),
            package_id: info.package_id.clone(),
        });
    }

    if info.version == info.previous_version && info.previous_version_package_id.is_empty() {
        return Err(IngestError::VersionIsEqualToPreviousVersion {
            version: info.version.clone(),
            previous_version: info.previous_version.clone(),
        });
    }

    for config_ref in &config.refs {
        let present = info
            .refs
            .iter()
            .any(|r| r.ref_id == config_ref.ref_id && r.version == config_ref.version);
        if !present {
            return Err(IngestError::ReferenceMissingFromPackage {
                ref_id: config_ref.ref_id.clone(),
                version: config_ref.version.clone(),
            });
        }
    }

    if info.migration_build && catalog.get_version(&info.package_id, &info.version)?.is_none() {
        return Err(IngestError::PublishedPackageVersionNotFound {
            package_id: info.package_id.clone(),
            version: info.version.clone(),
        });
    }

    Ok(())
}

fn check_kind(manifests: &Manifests) -> Result<(), IngestError> {
    let info = &manifests.info;
    let has_documents = !manifests.documents.documents.is_empty();
    let has_refs = !info.refs.is_empty();

    if !has_documents && !has_refs {
        return Err(IngestError::EmptyDataForPublish);
    }

    let kind = PackageKind::parse(&info.kind).ok_or_else(|| {
        IngestError::packaged(INFO_FILE, format!("invalid kind '{}'", info.kind))
    })?;

    match kind {
        PackageKind::Group if has_documents => Err(IngestError::packaged(
            "documents",
            "a group must not contain documents",
        )),
        PackageKind::Package if has_refs || !has_documents => Err(IngestError::packaged(
            "refs",
            "a package must contain documents and no refs",
        )),
        _ => Ok(()),
    }
}

fn check_operation(operation: &PackageOperation) -> Result<(), IngestError> {
    let id = &operation.operation_id;
    let invalid = |reason: String| IngestError::packaged(OPERATIONS_FILE, reason);

    let api_type = ApiType::parse(&operation.api_type).ok_or_else(|| {
        invalid(format!(
            "operation '{id}' has invalid apiType '{}'",
            operation.api_type
        ))
    })?;

    if ApiAudience::parse(&operation.api_audience).is_none() {
        return Err(invalid(format!(
            "operation '{id}' has invalid apiAudience '{}'",
            operation.api_audience
        )));
    }

    let metadata = &operation.metadata;
    let method = metadata.get_method();
    let (key_field, key_value) = match api_type {
        ApiType::Rest => ("path", metadata.get_path()),
        ApiType::GraphQl | ApiType::Protobuf => ("type", metadata.get_type()),
    };
    for (field, value) in [(key_field, &key_value), ("method", &method)] {
        if value.is_empty() {
            return Err(invalid(format!(
                "operation '{id}' has empty metadata field '{field}'"
            )));
        }
    }

    match api_type {
        ApiType::GraphQl if !GRAPHQL_OPERATION_TYPES.contains(&key_value.as_str()) => {
            return Err(IngestError::InvalidGraphQlOperationType {
                operation_id: id.clone(),
                operation_type: key_value,
            });
        }
        ApiType::Protobuf if !PROTOBUF_OPERATION_TYPES.contains(&key_value.as_str()) => {
            return Err(IngestError::InvalidProtobufOperationType {
                operation_id: id.clone(),
                operation_type: key_value,
            });
        }
        _ => {}
    }

    if matches!(api_type, ApiType::Rest | ApiType::GraphQl) {
        let allowed = api_type.search_scopes();
        if let Some(scope) = operation
            .search_scopes
            .keys()
            .find(|scope| !allowed.contains(&scope.as_str()))
        {
            return Err(invalid(format!(
                "operation '{id}' has invalid {} search scope '{scope}'",
                api_type.as_str()
            )));
        }
    }

    Ok(())
}

fn check_comparisons(manifests: &Manifests, catalog: &dyn CatalogLookup) -> Result<(), IngestError> {
    let info = &manifests.info;
    let comparisons = &manifests.comparisons.comparisons;

    if info.no_changelog && !comparisons.is_empty() {
        return Err(IngestError::ChangesAreNotEmpty);
    }

    if !info.no_changelog && !info.previous_version.is_empty() && comparisons.is_empty() {
        let previous_package = if info.previous_version_package_id.is_empty() {
            &info.package_id
        } else {
            &info.previous_version_package_id
        };
        let key = version_ref_key(&info.previous_version, info.previous_version_revision);
        match catalog.get_version_including_deleted(previous_package, &key)? {
            None => {
                return Err(IngestError::PublishedPackageVersionNotFound {
                    package_id: previous_package.clone(),
                    version: info.previous_version.clone(),
                })
            }
            Some(previous) if !previous.is_deleted() => {
                return Err(IngestError::packaged(
                    COMPARISONS_FILE,
                    format!(
                        "comparisons with previous version '{}' are required",
                        info.previous_version
                    ),
                ))
            }
            // A deleted previous version has nothing to compare against.
            Some(_) => {}
        }
    }

    let excluded = excluded_refs(info);
    for comparison in comparisons {
        check_comparison(
            info,
            comparison,
            &excluded,
            catalog,
            VersionLookup::IncludingDeleted,
        )?;
    }
    Ok(())
}

fn excluded_refs(info: &PackageInfo) -> ExcludedRefs<'_> {
    info.refs
        .iter()
        .filter(|r| r.excluded)
        .map(|r| (r.ref_id.as_str(), r.version.as_str()))
        .collect()
}

fn check_comparison(
    info: &PackageInfo,
    comparison: &PackageComparison,
    excluded: &ExcludedRefs<'_>,
    catalog: &dyn CatalogLookup,
    lookup: VersionLookup,
) -> Result<(), IngestError> {
    let package_id = comparison.package_id.as_str();
    let version = comparison.version.as_str();

    if !version.is_empty() {
        let revision_key = version_ref_key(version, comparison.revision);
        if excluded.contains(&(package_id, revision_key.as_str()))
            || excluded.contains(&(package_id, version))
        {
            return Err(IngestError::ExcludedComparisonReference {
                package_id: package_id.to_string(),
                version: revision_key,
            });
        }
    }

    check_comparison_fields(comparison)?;

    if !version.is_empty() && !refers_to(info, package_id, version, comparison.revision) {
        require_version(catalog, lookup, package_id, version, comparison.revision)?;
    }

    if !comparison.previous_version.is_empty()
        && !refers_to(
            info,
            &comparison.previous_version_package_id,
            &comparison.previous_version,
            comparison.previous_version_revision,
        )
    {
        require_version(
            catalog,
            lookup,
            &comparison.previous_version_package_id,
            &comparison.previous_version,
            comparison.previous_version_revision,
        )?;
    }

    if comparison.from_cache {
        let id = comparison_id(
            package_id,
            version,
            comparison.revision,
            &comparison.previous_version_package_id,
            &comparison.previous_version,
            comparison.previous_version_revision,
        );
        if catalog.get_version_comparison(&id)?.is_none() {
            return Err(IngestError::ComparisonNotFound { comparison_id: id });
        }
    }

    Ok(())
}

fn check_comparison_fields(comparison: &PackageComparison) -> Result<(), IngestError> {
    for (field, value) in [
        ("version", &comparison.version),
        ("previousVersion", &comparison.previous_version),
    ] {
        if value.contains('@') {
            return Err(IngestError::comparison_field(
                field,
                format!("'{value}' must not contain '@'"),
            ));
        }
    }

    if !comparison.version.is_empty() && comparison.package_id.is_empty() {
        return Err(IngestError::comparison_field(
            "packageId",
            "required when version is set",
        ));
    }
    if comparison.version.is_empty() && comparison.previous_version.is_empty() {
        return Err(IngestError::comparison_field(
            "version",
            "either version or previousVersion must be set",
        ));
    }
    if !comparison.previous_version.is_empty() {
        if comparison.previous_version_package_id.is_empty() {
            return Err(IngestError::comparison_field(
                "previousVersionPackageId",
                "required when previousVersion is set",
            ));
        }
        if comparison.previous_version_revision == 0 {
            return Err(IngestError::comparison_field(
                "previousVersionRevision",
                "required when previousVersion is set",
            ));
        }
    }
    Ok(())
}

/// Whether a comparison side points at the version being published.
/// Revision `0` stands for the current build.
fn refers_to(info: &PackageInfo, package_id: &str, version: &str, revision: i32) -> bool {
    package_id == info.package_id
        && version == info.version
        && (revision == 0 || revision == info.revision)
}

fn require_version(
    catalog: &dyn CatalogLookup,
    lookup: VersionLookup,
    package_id: &str,
    version: &str,
    revision: i32,
) -> Result<PublishedVersion, IngestError> {
    let found = match lookup {
        VersionLookup::IncludingDeleted => catalog
            .get_version_including_deleted(package_id, &version_ref_key(version, revision))?,
        VersionLookup::ActiveOnly if revision == 0 => catalog.get_version(package_id, version)?,
        VersionLookup::ActiveOnly => {
            catalog.get_version_by_revision(package_id, version, revision)?
        }
    };
    found.ok_or_else(|| IngestError::PublishedVersionRevisionNotFound {
        package_id: package_id.to_string(),
        version: version.to_string(),
        revision,
    })
}

/// Check that the build result describes the build the config asked for.
pub fn validate_build_result_against_config(
    manifests: &Manifests,
    config: &BuildConfig,
) -> Result<(), IngestError> {
    let info = &manifests.info;
    let pairs = [
        ("packageId", &config.package_id, &info.package_id),
        ("version", &config.version, &info.version),
        ("status", &config.status, &info.status),
        ("previousVersion", &config.previous_version, &info.previous_version),
        (
            "previousVersionPackageId",
            &config.previous_version_package_id,
            &info.previous_version_package_id,
        ),
        ("buildType", &config.build_type, &info.build_type),
    ];
    for (param, expected, actual) in pairs {
        if expected != actual {
            return Err(discrepancy(param, expected, actual));
        }
    }

    let format_matches = info.format == config.format
        || (info.format.is_empty() && config.format == DEFAULT_FORMAT);
    if !format_matches {
        return Err(discrepancy("format", &config.format, &info.format));
    }

    let is_package_build = BuildType::parse(&info.build_type) == Some(BuildType::Build)
        && PackageKind::parse(&info.kind) == Some(PackageKind::Package);
    if is_package_build {
        let packaged: HashSet<&str> = manifests
            .documents
            .documents
            .iter()
            .map(|d| d.file_id.as_str())
            .collect();
        if let Some(file) = config
            .files
            .iter()
            .find(|f| f.is_published() && !packaged.contains(f.file_id.as_str()))
        {
            return Err(IngestError::DocumentMissingFromPackage {
                file_id: file.file_id.clone(),
            });
        }
    }

    log_stage_passed!(stage = "build_config");
    Ok(())
}

fn discrepancy(param: &str, expected: &str, actual: &str) -> IngestError {
    IngestError::PackageForBuildConfigDiscrepancy {
        param: param.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Validate a `changelog` result: comparisons only, resolved against active versions.
pub fn validate_changes(
    manifests: &Manifests,
    catalog: &dyn CatalogLookup,
) -> Result<(), IngestError> {
    let info = &manifests.info;
    let comparisons = &manifests.comparisons.comparisons;

    if info.revision == 0 {
        return Err(IngestError::packaged(
            INFO_FILE,
            "revision is required for a changelog build",
        ));
    }
    if info.previous_version_revision == 0 {
        return Err(IngestError::packaged(
            INFO_FILE,
            "previousVersionRevision is required for a changelog build",
        ));
    }
    if comparisons.is_empty() {
        return Err(IngestError::packaged(
            COMPARISONS_FILE,
            "a changelog build must contain at least one comparison",
        ));
    }

    let excluded = excluded_refs(info);
    for comparison in comparisons {
        check_comparison(info, comparison, &excluded, catalog, VersionLookup::ActiveOnly)?;
    }

    log_stage_passed!(stage = "changes", comparisons = comparisons.len());
    Ok(())
}
