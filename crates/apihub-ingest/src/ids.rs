//! Checksums and deterministic composite identifiers.

use sha2::{Digest, Sha256};

/// Separates composite-id components so that `("ab", "c")` and `("a", "bc")` differ.
const SEPARATOR: u8 = 0x1f;

/// SHA-256 over the concatenation of `parts`, hex encoded.
pub fn checksum(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Content address of a published document payload.
pub fn content_checksum(data: &[u8], file_id: &str, media_type: &str) -> String {
    checksum(&[data, file_id.as_bytes(), media_type.as_bytes()])
}

fn composite_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([SEPARATOR]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Identity of a version comparison.
pub fn comparison_id(
    package_id: &str,
    version: &str,
    revision: i32,
    previous_package_id: &str,
    previous_version: &str,
    previous_revision: i32,
) -> String {
    composite_id(&[
        package_id,
        version,
        &revision.to_string(),
        previous_package_id,
        previous_version,
        &previous_revision.to_string(),
    ])
}

/// Identity of a transformed group export.
pub fn group_id(
    package_id: &str,
    version: &str,
    revision: i32,
    api_type: &str,
    group_name: &str,
) -> String {
    composite_id(&[
        package_id,
        version,
        &revision.to_string(),
        api_type,
        group_name,
    ])
}

/// `<version>@<revision>` lookup key; revision `0` means the latest revision.
pub fn version_ref_key(version: &str, revision: i32) -> String {
    if revision == 0 {
        version.to_string()
    } else {
        format!("{version}@{revision}")
    }
}

/// Inverse of [`version_ref_key`]. A missing or unparsable revision reads as `0`.
pub fn split_version_ref(key: &str) -> (&str, i32) {
    match key.rsplit_once('@') {
        Some((version, revision)) => match revision.parse() {
            Ok(revision) => (version, revision),
            Err(_) => (key, 0),
        },
        None => (key, 0),
    }
}
