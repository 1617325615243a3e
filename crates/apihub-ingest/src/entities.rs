//! Persistence-ready records produced by ingestion.
//!
//! Metadata rows and payload rows are kept apart: payloads are addressed by
//! checksum or data hash so identical bytes are stored once downstream.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ids::comparison_id;
use crate::manifest::{ChangeSummary, OperationTypeChanges, PackageComparison, PackageDocument};

/// Payload bytes are rendered as hex in serialized output.
fn as_hex<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

/// Document metadata row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedContent {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub file_id: String,
    pub checksum: String,
    pub index: i64,
    pub slug: String,
    pub name: String,
    pub path: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub format: String,
    pub filename: String,
    pub operation_ids: Vec<String>,
    pub metadata: ContentMetadata,
}

/// The subset of document metadata kept on the content row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub description: String,
    pub version: String,
    pub labels: Vec<String>,
    pub blob_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<Map<String, Value>>,
    pub tags: Vec<Map<String, Value>>,
}

/// Document payload row, addressed by checksum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedContentData {
    pub package_id: String,
    pub checksum: String,
    pub media_type: String,
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
}

/// Per-API-type operation metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationMetadata {
    Rest {
        tags: Vec<String>,
        path: String,
        method: String,
    },
    GraphQl {
        tags: Vec<String>,
        #[serde(rename = "type")]
        operation_type: String,
        method: String,
    },
    Protobuf {
        #[serde(rename = "type")]
        operation_type: String,
        method: String,
    },
}

/// Operation metadata row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEntity {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub operation_id: String,
    pub data_hash: String,
    pub api_type: String,
    pub kind: String,
    pub api_audience: String,
    pub title: String,
    pub deprecated: bool,
    pub deprecated_info: String,
    pub deprecated_items: Vec<Value>,
    pub previous_release_versions: Vec<String>,
    pub models: BTreeMap<String, String>,
    pub metadata: OperationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_tags: Option<Map<String, Value>>,
}

/// Operation payload row, addressed by data hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDataEntity {
    pub package_id: String,
    pub data_hash: String,
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
    pub search_scopes: BTreeMap<String, Value>,
}

/// The six fields that identify a version comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonIdentity {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub previous_package_id: String,
    pub previous_version: String,
    pub previous_revision: i32,
}

impl ComparisonIdentity {
    pub fn of(comparison: &PackageComparison) -> Self {
        Self {
            package_id: comparison.package_id.clone(),
            version: comparison.version.clone(),
            revision: comparison.revision,
            previous_package_id: comparison.previous_version_package_id.clone(),
            previous_version: comparison.previous_version.clone(),
            previous_revision: comparison.previous_version_revision,
        }
    }

    /// Deterministic comparison id.
    pub fn id(&self) -> String {
        comparison_id(
            &self.package_id,
            &self.version,
            self.revision,
            &self.previous_package_id,
            &self.previous_version,
            self.previous_revision,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionComparisonEntity {
    pub comparison_id: String,
    #[serde(flatten)]
    pub identity: ComparisonIdentity,
    pub operation_types: Vec<OperationTypeChanges>,
    /// Peer comparison ids; only set on the main comparison.
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationComparisonEntity {
    pub comparison_id: String,
    #[serde(flatten)]
    pub identity: ComparisonIdentity,
    pub operation_id: String,
    pub previous_operation_id: String,
    pub data_hash: String,
    pub previous_data_hash: String,
    pub change_summary: ChangeSummary,
    pub changes: Vec<Value>,
    pub json_path: Vec<String>,
}

/// The single artifact of a group export build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedContentData {
    pub package_id: String,
    pub version: String,
    pub revision: i32,
    pub api_type: String,
    pub build_type: String,
    pub format: String,
    pub group_id: String,
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
    pub documents_info: Vec<PackageDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderNotificationEntity {
    pub build_id: String,
    pub severity: i32,
    pub message: String,
    pub file_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloads_serialize_as_hex() {
        let data = PublishedContentData {
            package_id: "pkg".to_string(),
            checksum: "abc".to_string(),
            media_type: "text/plain; charset=utf-8".to_string(),
            data: b"hi".to_vec(),
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["data"], json!("6869"));
        assert_eq!(value["mediaType"], json!("text/plain; charset=utf-8"));
    }

    #[test]
    fn operation_metadata_shapes() {
        let rest = OperationMetadata::Rest {
            tags: vec!["pets".to_string()],
            path: "/pets".to_string(),
            method: "get".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&rest).unwrap(),
            json!({"tags": ["pets"], "path": "/pets", "method": "get"})
        );

        let protobuf = OperationMetadata::Protobuf {
            operation_type: "unary".to_string(),
            method: "GetPet".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&protobuf).unwrap(),
            json!({"type": "unary", "method": "GetPet"})
        );
    }

    #[test]
    fn comparison_identity_is_flattened() {
        let identity = ComparisonIdentity {
            package_id: "pkg".to_string(),
            version: "2.0".to_string(),
            revision: 1,
            ..ComparisonIdentity::default()
        };
        let entity = VersionComparisonEntity {
            comparison_id: identity.id(),
            identity,
            operation_types: Vec::new(),
            refs: Vec::new(),
        };
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["packageId"], json!("pkg"));
        assert_eq!(value["comparisonId"].as_str().unwrap().len(), 64);
    }
}
