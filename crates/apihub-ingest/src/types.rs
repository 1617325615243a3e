//! Closed vocabularies used by the manifests.
//!
//! Manifests carry these as plain strings so that a bad value is reported
//! by the validators with a precise error instead of a generic decode failure.

use serde::Serialize;

/// Format assumed when a build result leaves `format` empty.
pub const DEFAULT_FORMAT: &str = "json";

/// Package kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Package,
    Group,
}

impl PackageKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package" => Some(Self::Package),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// Version lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Release,
    Archived,
}

impl VersionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "release" => Some(Self::Release),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Kind of build that produced the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildType {
    /// Regular version publication.
    Build,
    /// Comparison-only rebuild of an already published revision.
    Changelog,
    /// Group export: every document re-zipped as-is.
    ReducedSourceSpecifications,
    /// Group export: documents merged into a single specification.
    MergedSpecification,
}

impl BuildType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "build" => Some(Self::Build),
            "changelog" => Some(Self::Changelog),
            "reducedSourceSpecifications" => Some(Self::ReducedSourceSpecifications),
            "mergedSpecification" => Some(Self::MergedSpecification),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Changelog => "changelog",
            Self::ReducedSourceSpecifications => "reducedSourceSpecifications",
            Self::MergedSpecification => "mergedSpecification",
        }
    }

    /// Build types whose output is a single transformed artifact.
    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            Self::ReducedSourceSpecifications | Self::MergedSpecification
        )
    }
}

/// API flavour of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiType {
    #[serde(rename = "rest")]
    Rest,
    #[serde(rename = "graphql")]
    GraphQl,
    #[serde(rename = "protobuf")]
    Protobuf,
}

impl ApiType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rest" => Some(Self::Rest),
            "graphql" => Some(Self::GraphQl),
            "protobuf" => Some(Self::Protobuf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::GraphQl => "graphql",
            Self::Protobuf => "protobuf",
        }
    }

    /// Search scopes an operation of this type may declare.
    pub fn search_scopes(&self) -> &'static [&'static str] {
        match self {
            Self::Rest => &[
                "all",
                "request",
                "response",
                "annotation",
                "properties",
                "examples",
            ],
            Self::GraphQl => &["all", "annotation", "argument", "property"],
            Self::Protobuf => &["all", "annotation", "request", "response"],
        }
    }
}

/// Intended audience of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiAudience {
    Internal,
    #[default]
    External,
    Unknown,
}

impl ApiAudience {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Recognized document types.
pub const DOCUMENT_TYPES: &[&str] = &[
    "openapi-3-1",
    "openapi-3-0",
    "openapi-2-0",
    "asyncapi-2",
    "json-schema",
    "markdown",
    "mdx",
    "graphql-schema",
    "graphapi",
    "introspection",
    "protobuf-3",
    "unknown",
];

pub fn is_document_type(s: &str) -> bool {
    DOCUMENT_TYPES.contains(&s)
}

pub const GRAPHQL_OPERATION_TYPES: &[&str] = &["query", "mutation", "subscription"];

pub const PROTOBUF_OPERATION_TYPES: &[&str] =
    &["unary", "clientStreaming", "serverStreaming", "bidiStreaming"];
