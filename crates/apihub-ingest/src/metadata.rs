//! Typed views over free-form manifest metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A metadata field has an unexpected JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("metadata field '{key}' is not {expected}")]
pub struct MetadataError {
    pub key: String,
    pub expected: &'static str,
}

impl MetadataError {
    fn new(key: &str, expected: &'static str) -> Self {
        Self {
            key: key.to_string(),
            expected,
        }
    }
}

/// Free-form key/value metadata attached to documents and operations.
///
/// Absent keys read as empty values; present keys with the wrong shape are errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// String value of `key`, empty when absent or not a string.
    pub fn get_string(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn get_path(&self) -> String {
        self.get_string("path")
    }

    /// Path as written in the source document, before any normalisation.
    pub fn get_original_path(&self) -> String {
        match self.get_string("originalPath") {
            p if p.is_empty() => self.get_path(),
            p => p,
        }
    }

    pub fn get_method(&self) -> String {
        self.get_string("method")
    }

    pub fn get_type(&self) -> String {
        self.get_string("type")
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>, MetadataError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| MetadataError::new(key, "an array of strings"))
                })
                .collect(),
            Some(_) => Err(MetadataError::new(key, "an array of strings")),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<Option<Map<String, Value>>, MetadataError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(obj)) => Ok(Some(obj.clone())),
            Some(_) => Err(MetadataError::new(key, "an object")),
        }
    }

    pub fn get_object_array(&self, key: &str) -> Result<Vec<Map<String, Value>>, MetadataError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| MetadataError::new(key, "an array of objects"))
                })
                .collect(),
            Some(_) => Err(MetadataError::new(key, "an array of objects")),
        }
    }

    /// `customTags` as a string-keyed map.
    pub fn get_custom_tags(&self) -> Result<Option<Map<String, Value>>, MetadataError> {
        self.get_object("customTags")
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
