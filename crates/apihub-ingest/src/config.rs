//! Build configuration submitted alongside a build job.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// The build job's configuration, as handed to the builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    pub package_id: String,
    pub version: String,
    pub build_type: String,
    pub previous_version: String,
    pub previous_version_package_id: String,
    pub status: String,
    pub refs: Vec<BuildConfigRef>,
    pub files: Vec<BuildConfigFile>,
    pub publish_id: String,
    pub format: String,
    pub api_type: String,
    pub group_name: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfigRef {
    pub ref_id: String,
    pub version: String,
}

/// A source file the builder was asked to process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfigFile {
    pub file_id: String,
    pub slug: String,
    pub labels: Vec<String>,
    /// `None` means published.
    pub publish: Option<bool>,
    pub blob_id: String,
}

impl BuildConfigFile {
    pub fn is_published(&self) -> bool {
        self.publish.unwrap_or(true)
    }
}

impl BuildConfig {
    /// Parse a build config from JSON.
    pub fn from_json(content: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a build config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// File ids listed in the config, in order and with repeats.
    pub fn file_ids(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file_id.as_str()).collect()
    }
}
