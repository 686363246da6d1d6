//! Project aggregate: the parent of a fan-out.

use crate::{AtelierError, ArtifactKind, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Project status. Only the reconciler moves a project to completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Processing,
    Completed,
    Failed,
}

impl ProjectStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AtelierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AtelierError::validation(format!(
                "unknown project status: {}",
                other
            ))),
        }
    }
}

/// A generation project owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    /// Input image URIs.
    pub source_images: Vec<String>,
    pub status: ProjectStatus,
    /// Artifact kinds the project needs before it counts as completed.
    pub expected_artifacts: Vec<ArtifactKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a draft project.
    #[must_use]
    pub fn new(user_id: UserId, name: impl Into<String>, source_images: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            user_id,
            name: name.into(),
            source_images,
            status: ProjectStatus::Draft,
            expected_artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether generation has input to work from.
    #[must_use]
    pub fn has_source_images(&self) -> bool {
        self.source_images.iter().any(|uri| !uri.trim().is_empty())
    }

    /// Number of distinct kinds in `produced` that the project expects.
    #[must_use]
    pub fn covered_count(&self, produced: &[ArtifactKind]) -> usize {
        let expected: HashSet<_> = self.expected_artifacts.iter().collect();
        produced
            .iter()
            .filter(|k| expected.contains(k))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Whether `produced` covers every expected kind.
    #[must_use]
    pub fn is_covered_by(&self, produced: &[ArtifactKind]) -> bool {
        let expected: HashSet<_> = self.expected_artifacts.iter().collect();
        !expected.is_empty() && self.covered_count(produced) >= expected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        let mut p = Project::new(UserId::new(), "Ceramic mug", vec!["s3://in/mug.png".into()]);
        p.expected_artifacts = vec![ArtifactKind::Main, ArtifactKind::Lifestyle];
        p
    }

    #[test]
    fn test_new_project_is_draft() {
        let p = project();
        assert_eq!(p.status, ProjectStatus::Draft);
        assert!(p.has_source_images());
    }

    #[test]
    fn test_blank_source_images_do_not_count() {
        let p = Project::new(UserId::new(), "Empty", vec!["  ".into()]);
        assert!(!p.has_source_images());
    }

    #[test]
    fn test_coverage_ignores_duplicates_and_unexpected() {
        let p = project();
        let produced = [ArtifactKind::Main, ArtifactKind::Main, ArtifactKind::Packaging];
        assert_eq!(p.covered_count(&produced), 1);
        assert!(!p.is_covered_by(&produced));
        assert!(p.is_covered_by(&[ArtifactKind::Lifestyle, ArtifactKind::Main]));
    }

    #[test]
    fn test_nothing_expected_is_never_covered() {
        let p = Project::new(UserId::new(), "Draft", vec![]);
        assert!(!p.is_covered_by(&[ArtifactKind::Main]));
    }
}
