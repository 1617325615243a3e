//! In-memory index over a build-result or sources zip.
//!
//! Entries are bucketed by well-known manifest names and folder prefixes
//! when the archive is opened; payloads are only decompressed on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Cursor, Read, Seek};

use zip::ZipArchive;

use crate::error::IngestError;
use crate::options::IngestOptions;

pub const INFO_FILE: &str = "info.json";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const OPERATIONS_FILE: &str = "operations.json";
pub const COMPARISONS_FILE: &str = "comparisons.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.json";
pub const CHANGELOG_FILE: &str = "changelog.json";

pub const DOCUMENTS_DIR: &str = "documents/";
pub const OPERATIONS_DIR: &str = "operations/";
pub const COMPARISONS_DIR: &str = "comparisons/";

/// Name used in errors that concern the zip container itself.
pub const ARCHIVE_NAME: &str = "archive";

/// Well-known manifest files at the archive root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestSlot {
    Info,
    Documents,
    Operations,
    Comparisons,
    Notifications,
    Changelog,
}

impl ManifestSlot {
    pub const ALL: [ManifestSlot; 6] = [
        Self::Info,
        Self::Documents,
        Self::Operations,
        Self::Comparisons,
        Self::Notifications,
        Self::Changelog,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Info => INFO_FILE,
            Self::Documents => DOCUMENTS_FILE,
            Self::Operations => OPERATIONS_FILE,
            Self::Comparisons => COMPARISONS_FILE,
            Self::Notifications => NOTIFICATIONS_FILE,
            Self::Changelog => CHANGELOG_FILE,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.file_name() == name)
    }
}

/// Opaque reference to one zip entry, decompressed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHandle {
    index: usize,
    size: u64,
}

impl EntryHandle {
    /// Declared uncompressed size.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Files keyed by name, remembering names that were indexed more than once.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    files: BTreeMap<String, EntryHandle>,
    collisions: BTreeSet<String>,
}

impl Bucket {
    fn insert(&mut self, name: String, handle: EntryHandle) {
        if self.files.contains_key(&name) {
            self.collisions.insert(name);
        } else {
            self.files.insert(name, handle);
        }
    }

    pub fn get(&self, name: &str) -> Option<EntryHandle> {
        self.files.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Names that appeared more than once in the archive.
    pub fn collisions(&self) -> impl Iterator<Item = &str> {
        self.collisions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Indexed view of one zip archive.
pub struct ArchiveIndex<R> {
    archive: ZipArchive<R>,
    max_entry_size: u64,
    entries: Bucket,
    manifests: BTreeMap<ManifestSlot, EntryHandle>,
    document_files: Bucket,
    operation_files: Bucket,
    comparison_files: Bucket,
    uncategorized: Bucket,
}

impl<R> fmt::Debug for ArchiveIndex<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveIndex")
            .field("entries", &self.entries.len())
            .field("manifests", &self.manifests.keys().collect::<Vec<_>>())
            .field("document_files", &self.document_files.len())
            .field("operation_files", &self.operation_files.len())
            .field("comparison_files", &self.comparison_files.len())
            .field("uncategorized", &self.uncategorized.len())
            .finish_non_exhaustive()
    }
}

impl ArchiveIndex<Cursor<Vec<u8>>> {
    /// Index an archive held in memory.
    pub fn from_bytes(bytes: Vec<u8>, options: &IngestOptions) -> Result<Self, IngestError> {
        Self::new(Cursor::new(bytes), options)
    }
}

impl<R: Read + Seek> ArchiveIndex<R> {
    /// Traverse the zip table and bucket every non-directory entry.
    pub fn new(reader: R, options: &IngestOptions) -> Result<Self, IngestError> {
        let mut archive = ZipArchive::new(reader).map_err(|e| {
            IngestError::archived(ARCHIVE_NAME, "not a readable zip archive", Some(e.to_string()))
        })?;

        if archive.len() > options.max_entries {
            return Err(IngestError::archived(
                ARCHIVE_NAME,
                format!(
                    "archive has {} entries, limit is {}",
                    archive.len(),
                    options.max_entries
                ),
                None,
            ));
        }

        let mut entries = Bucket::default();
        let mut manifests = BTreeMap::new();
        let mut document_files = Bucket::default();
        let mut operation_files = Bucket::default();
        let mut comparison_files = Bucket::default();
        let mut uncategorized = Bucket::default();

        for i in 0..archive.len() {
            let (raw_name, is_dir, size) = {
                let file = archive.by_index(i).map_err(|e| {
                    IngestError::archived(
                        ARCHIVE_NAME,
                        format!("unreadable entry #{}", i),
                        Some(e.to_string()),
                    )
                })?;
                (file.name().to_string(), file.is_dir(), file.size())
            };
            if is_dir {
                continue;
            }

            let name = normalize_entry_name(&raw_name);
            let handle = EntryHandle { index: i, size };
            entries.insert(name.clone(), handle);

            if let Some(slot) = ManifestSlot::from_name(&name) {
                if manifests.contains_key(&slot) {
                    // A second copy of a manifest is not addressable by slot.
                    uncategorized.insert(name, handle);
                } else {
                    manifests.insert(slot, handle);
                }
            } else if let Some(rest) = strip_folder(&name, DOCUMENTS_DIR) {
                document_files.insert(rest.to_string(), handle);
            } else if let Some(rest) = strip_folder(&name, OPERATIONS_DIR) {
                operation_files.insert(rest.to_string(), handle);
            } else if let Some(rest) = strip_folder(&name, COMPARISONS_DIR) {
                comparison_files.insert(rest.to_string(), handle);
            } else {
                uncategorized.insert(name, handle);
            }
        }

        tracing::debug!(
            entries = entries.len(),
            documents = document_files.len(),
            operations = operation_files.len(),
            comparisons = comparison_files.len(),
            uncategorized = uncategorized.len(),
            "archive indexed"
        );

        Ok(Self {
            archive,
            max_entry_size: options.max_entry_size,
            entries,
            manifests,
            document_files,
            operation_files,
            comparison_files,
            uncategorized,
        })
    }

    /// Every non-directory entry, keyed by normalized name.
    pub fn entries(&self) -> &Bucket {
        &self.entries
    }

    pub fn manifest(&self, slot: ManifestSlot) -> Option<EntryHandle> {
        self.manifests.get(&slot).copied()
    }

    pub fn document_files(&self) -> &Bucket {
        &self.document_files
    }

    pub fn operation_files(&self) -> &Bucket {
        &self.operation_files
    }

    pub fn comparison_files(&self) -> &Bucket {
        &self.comparison_files
    }

    pub fn uncategorized(&self) -> &Bucket {
        &self.uncategorized
    }

    /// Decompress one entry. `name` is only used for error reporting.
    pub fn read(&mut self, name: &str, handle: EntryHandle) -> Result<Vec<u8>, IngestError> {
        let limit = self.max_entry_size;
        if handle.size > limit {
            return Err(IngestError::archived(
                name,
                format!("entry is {} bytes, limit is {}", handle.size, limit),
                None,
            ));
        }

        let mut file = self
            .archive
            .by_index(handle.index)
            .map_err(|e| IngestError::archived(name, "failed to open entry", Some(e.to_string())))?;

        let mut data = Vec::with_capacity(handle.size as usize);
        file.by_ref()
            .take(limit + 1)
            .read_to_end(&mut data)
            .map_err(|e| IngestError::archived(name, "failed to decompress", Some(e.to_string())))?;

        // Declared sizes are not trusted.
        if data.len() as u64 > limit {
            return Err(IngestError::archived(
                name,
                format!("entry exceeds size limit of {} bytes", limit),
                None,
            ));
        }
        Ok(data)
    }

    /// Raw bytes of a manifest slot, `None` when the archive lacks it.
    pub fn read_manifest_bytes(&mut self, slot: ManifestSlot) -> Result<Option<Vec<u8>>, IngestError> {
        match self.manifest(slot) {
            Some(handle) => self.read(slot.file_name(), handle).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_document(&mut self, filename: &str) -> Result<Option<Vec<u8>>, IngestError> {
        match self.document_files.get(filename) {
            Some(handle) => self.read(&format!("{DOCUMENTS_DIR}{filename}"), handle).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_operation(&mut self, operation_id: &str) -> Result<Option<Vec<u8>>, IngestError> {
        match self.operation_files.get(operation_id) {
            Some(handle) => self
                .read(&format!("{OPERATIONS_DIR}{operation_id}"), handle)
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn read_comparison(&mut self, file_id: &str) -> Result<Option<Vec<u8>>, IngestError> {
        match self.comparison_files.get(file_id) {
            Some(handle) => self
                .read(&format!("{COMPARISONS_DIR}{file_id}"), handle)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Read any entry by its full normalized name.
    pub fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>, IngestError> {
        match self.entries.get(name) {
            Some(handle) => self.read(name, handle).map(Some),
            None => Ok(None),
        }
    }
}

/// Normalize separators and strip leading `./` and `/`.
fn normalize_entry_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut trimmed = name.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

fn strip_folder<'a>(name: &'a str, folder: &str) -> Option<&'a str> {
    name.strip_prefix(folder).filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::pack_files;

    fn index(files: &[(&str, &[u8])]) -> ArchiveIndex<Cursor<Vec<u8>>> {
        let owned: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_vec()))
            .collect();
        let bytes = pack_files(&owned).unwrap();
        ArchiveIndex::from_bytes(bytes, &IngestOptions::default()).unwrap()
    }

    #[test]
    fn buckets_entries_by_name_and_prefix() {
        let idx = index(&[
            ("info.json", b"{}"),
            ("documents.json", b"{}"),
            ("changelog.json", b"{}"),
            ("documents/api.yaml", b"openapi: 3.0.0"),
            ("operations/get-pets", b"{}"),
            ("comparisons/cmp-1.json", b"{}"),
            ("readme.txt", b"hello"),
        ]);

        assert!(idx.manifest(ManifestSlot::Info).is_some());
        assert!(idx.manifest(ManifestSlot::Changelog).is_some());
        assert!(idx.manifest(ManifestSlot::Operations).is_none());
        assert!(idx.document_files().contains("api.yaml"));
        assert!(idx.operation_files().contains("get-pets"));
        assert!(idx.comparison_files().contains("cmp-1.json"));
        assert_eq!(idx.uncategorized().names().collect::<Vec<_>>(), vec!["readme.txt"]);
        assert_eq!(idx.entries().len(), 7);
    }

    #[test]
    fn every_entry_lands_in_exactly_one_place() {
        let idx = index(&[
            ("info.json", b"{}"),
            ("documents/a.json", b"{}"),
            ("documents/nested/b.json", b"{}"),
            ("operations/op", b"{}"),
            ("other/file", b"x"),
            ("documents", b"not a folder"),
        ]);

        let mut rebuilt: Vec<String> = ManifestSlot::ALL
            .iter()
            .filter(|s| idx.manifest(**s).is_some())
            .map(|s| s.file_name().to_string())
            .collect();
        rebuilt.extend(idx.document_files().names().map(|n| format!("{DOCUMENTS_DIR}{n}")));
        rebuilt.extend(idx.operation_files().names().map(|n| format!("{OPERATIONS_DIR}{n}")));
        rebuilt.extend(idx.comparison_files().names().map(|n| format!("{COMPARISONS_DIR}{n}")));
        rebuilt.extend(idx.uncategorized().names().map(str::to_string));
        rebuilt.sort();

        let all: Vec<String> = idx.entries().names().map(str::to_string).collect();
        assert_eq!(rebuilt, all);
    }

    #[test]
    fn directory_entries_are_dropped() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("documents/", options).unwrap();
            writer.start_file("documents/a.md", options).unwrap();
            std::io::Write::write_all(&mut writer, b"# A").unwrap();
            writer.finish().unwrap();
        }
        let idx = ArchiveIndex::from_bytes(buf.into_inner(), &IngestOptions::default()).unwrap();
        assert_eq!(idx.entries().len(), 1);
        assert!(idx.document_files().contains("a.md"));
    }

    #[test]
    fn reads_entries_lazily() {
        let mut idx = index(&[("documents/api.yaml", b"openapi: 3.0.0")]);
        assert_eq!(idx.read_document("api.yaml").unwrap().unwrap(), b"openapi: 3.0.0");
        assert!(idx.read_document("missing.yaml").unwrap().is_none());
        assert!(idx.read_manifest_bytes(ManifestSlot::Info).unwrap().is_none());
    }

    #[test]
    fn enforces_entry_size_limit() {
        let owned = vec![("documents/big.txt".to_string(), vec![b'a'; 64])];
        let bytes = pack_files(&owned).unwrap();
        let options = IngestOptions::new().with_max_entry_size(16);
        let mut idx = ArchiveIndex::from_bytes(bytes, &options).unwrap();
        let err = idx.read_document("big.txt").unwrap_err();
        assert!(matches!(err, IngestError::InvalidPackageArchivedFile { .. }));
    }

    #[test]
    fn enforces_entry_count_limit() {
        let owned = vec![
            ("a".to_string(), vec![1]),
            ("b".to_string(), vec![2]),
        ];
        let bytes = pack_files(&owned).unwrap();
        let options = IngestOptions::new().with_max_entries(1);
        assert!(ArchiveIndex::from_bytes(bytes, &options).is_err());
    }

    #[test]
    fn rejects_non_zip_input() {
        let err = ArchiveIndex::from_bytes(b"not a zip".to_vec(), &IngestOptions::default())
            .err()
            .unwrap();
        match err {
            IngestError::InvalidPackageArchivedFile { file, debug, .. } => {
                assert_eq!(file, ARCHIVE_NAME);
                assert!(debug.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_entry_name("./documents/a.json"), "documents/a.json");
        assert_eq!(normalize_entry_name("/info.json"), "info.json");
        assert_eq!(normalize_entry_name("documents\\a.json"), "documents/a.json");
    }
}
