//! Transformed artifact of group export builds.

use std::io::{Read, Seek};

use crate::archive::DOCUMENTS_DIR;
use crate::entities::TransformedContentData;
use crate::error::IngestError;
use crate::ids::group_id;
use crate::manifest::BuildResult;
use crate::options::CancelToken;
use crate::types::{BuildType, DEFAULT_FORMAT};
use crate::writer::pack_files;

/// Produce the transformed artifact.
///
/// A merged specification is the single document as-is; any other build
/// type re-zips every document under its filename.
pub fn read_transformed<R: Read + Seek>(
    result: &mut BuildResult<R>,
    cancel: &CancelToken,
) -> Result<TransformedContentData, IngestError> {
    let info = &result.manifests.info;
    let documents = &result.manifests.documents.documents;

    let data = if BuildType::parse(&info.build_type) == Some(BuildType::MergedSpecification) {
        if documents.len() != 1 {
            return Err(IngestError::archived(
                "documents",
                format!(
                    "expected exactly 1 document for {} build, found {}",
                    info.build_type,
                    documents.len()
                ),
                None,
            ));
        }
        let filename = &documents[0].filename;
        result
            .index
            .read_document(filename)?
            .ok_or_else(|| missing_document(filename))?
    } else {
        let mut files = Vec::with_capacity(documents.len());
        for document in documents {
            cancel.check()?;
            let bytes = result
                .index
                .read_document(&document.filename)?
                .ok_or_else(|| missing_document(&document.filename))?;
            files.push((document.filename.clone(), bytes));
        }
        pack_files(&files)?
    };

    let format = if info.format.is_empty() {
        DEFAULT_FORMAT.to_string()
    } else {
        info.format.clone()
    };

    tracing::debug!(
        build_type = %info.build_type,
        documents = documents.len(),
        bytes = data.len(),
        "transformed artifact assembled"
    );

    Ok(TransformedContentData {
        package_id: info.package_id.clone(),
        version: info.version.clone(),
        revision: info.revision,
        api_type: info.api_type.clone(),
        build_type: info.build_type.clone(),
        format,
        group_id: group_id(
            &info.package_id,
            &info.version,
            info.revision,
            &info.api_type,
            &info.group_name,
        ),
        data,
        documents_info: documents.clone(),
    })
}

fn missing_document(filename: &str) -> IngestError {
    IngestError::FileMissing {
        file_ids: vec![filename.to_string()],
        location: DOCUMENTS_DIR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveIndex;
    use crate::manifest::{PackageDocument, PackageInfo};
    use crate::options::IngestOptions;
    use crate::writer::BuildResultWriter;

    fn info(build_type: BuildType) -> PackageInfo {
        PackageInfo {
            package_id: "group".to_string(),
            version: "2024.1".to_string(),
            revision: 2,
            kind: "group".to_string(),
            build_type: build_type.as_str().to_string(),
            api_type: "rest".to_string(),
            group_name: "public".to_string(),
            ..PackageInfo::default()
        }
    }

    fn document(filename: &str) -> PackageDocument {
        PackageDocument {
            file_id: filename.to_string(),
            filename: filename.to_string(),
            ..PackageDocument::default()
        }
    }

    fn build(build_type: BuildType, filenames: &[&str]) -> Vec<u8> {
        let mut writer = BuildResultWriter::new(info(build_type));
        for name in filenames {
            writer = writer.document(document(name), format!("content of {name}").into_bytes());
        }
        writer.finish().unwrap()
    }

    #[test]
    fn merged_specification_is_the_single_document() {
        let bytes = build(BuildType::MergedSpecification, &["merged.json"]);
        let mut result = BuildResult::from_bytes(bytes, &IngestOptions::default()).unwrap();
        let transformed = read_transformed(&mut result, &CancelToken::new()).unwrap();

        assert_eq!(transformed.data, b"content of merged.json");
        assert_eq!(transformed.format, DEFAULT_FORMAT);
        assert_eq!(
            transformed.group_id,
            group_id("group", "2024.1", 2, "rest", "public")
        );
        assert_eq!(transformed.documents_info.len(), 1);
    }

    #[test]
    fn merged_specification_needs_exactly_one_document() {
        let bytes = build(BuildType::MergedSpecification, &["a.json", "b.json", "c.json"]);
        let mut result = BuildResult::from_bytes(bytes, &IngestOptions::default()).unwrap();
        match read_transformed(&mut result, &CancelToken::new()) {
            Err(IngestError::InvalidPackageArchivedFile { file, error, .. }) => {
                assert_eq!(file, "documents");
                assert!(error.starts_with("expected exactly 1 document"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reduced_specifications_are_rezipped() {
        let bytes = build(BuildType::ReducedSourceSpecifications, &["a.yaml", "b.yaml"]);
        let mut result = BuildResult::from_bytes(bytes, &IngestOptions::default()).unwrap();
        let transformed = read_transformed(&mut result, &CancelToken::new()).unwrap();

        let mut bundle =
            ArchiveIndex::from_bytes(transformed.data.clone(), &IngestOptions::default()).unwrap();
        assert_eq!(bundle.entries().len(), 2);
        assert_eq!(
            bundle.read_entry("b.yaml").unwrap().unwrap(),
            b"content of b.yaml"
        );

        // Deterministic output.
        let bytes = build(BuildType::ReducedSourceSpecifications, &["a.yaml", "b.yaml"]);
        let mut again = BuildResult::from_bytes(bytes, &IngestOptions::default()).unwrap();
        assert_eq!(
            read_transformed(&mut again, &CancelToken::new()).unwrap(),
            transformed
        );
    }
}
