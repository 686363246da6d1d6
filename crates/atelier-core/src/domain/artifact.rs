//! Artifacts produced for a project.

use crate::{AtelierError, ArtifactId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Kind of artifact. A project holds at most one artifact per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Main,
    Lifestyle,
    Infographic,
    Detail,
    Comparison,
    Packaging,
    StructuredContent,
}

impl ArtifactKind {
    /// The image kinds a composite pack fans out into.
    pub const IMAGE_KINDS: [Self; 6] = [
        Self::Main,
        Self::Lifestyle,
        Self::Infographic,
        Self::Detail,
        Self::Comparison,
        Self::Packaging,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Lifestyle => "lifestyle",
            Self::Infographic => "infographic",
            Self::Detail => "detail",
            Self::Comparison => "comparison",
            Self::Packaging => "packaging",
            Self::StructuredContent => "structured-content",
        }
    }

    /// Whether the artifact is an image.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        !matches!(self, Self::StructuredContent)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = AtelierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::IMAGE_KINDS
            .into_iter()
            .chain(std::iter::once(Self::StructuredContent))
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AtelierError::validation(format!("unknown artifact kind: {}", s)))
    }
}

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub project_id: ProjectId,
    pub kind: ArtifactKind,
    /// Image location.
    pub uri: Option<String>,
    /// Structured content body.
    pub content: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Request to ensure an artifact of a kind exists for a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub project_id: ProjectId,
    pub kind: ArtifactKind,
    pub uri: Option<String>,
    pub content: Option<JsonValue>,
}

impl NewArtifact {
    /// An image artifact stored at `uri`.
    #[must_use]
    pub fn image(project_id: ProjectId, kind: ArtifactKind, uri: impl Into<String>) -> Self {
        Self {
            project_id,
            kind,
            uri: Some(uri.into()),
            content: None,
        }
    }

    /// The structured content artifact.
    #[must_use]
    pub fn structured_content(project_id: ProjectId, content: JsonValue) -> Self {
        Self {
            project_id,
            kind: ArtifactKind::StructuredContent,
            uri: None,
            content: Some(content),
        }
    }

    /// Materializes the artifact with a fresh id.
    #[must_use]
    pub fn into_artifact(self) -> Artifact {
        Artifact {
            id: ArtifactId::new(),
            project_id: self.project_id,
            kind: self.kind,
            uri: self.uri,
            content: self.content,
            created_at: Utc::now(),
        }
    }
}
