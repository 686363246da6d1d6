//! Typed job payloads.
//!
//! The queue stores payloads as opaque JSON next to the `job_type` column.
//! Handlers never look at that JSON directly: the worker decodes it into a
//! [`JobPayload`] and validates it before a handler runs.

use crate::error::{JobError, JobResult};
use atelier_core::{ArtifactKind, JobType, NewJob, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

const MAX_STYLE_LEN: usize = 200;
const MAX_LOCALE_LEN: usize = 35;

/// Payload of a `generate-artifact` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactPayload {
    pub project_id: ProjectId,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Payload of a `generate-structured-content` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredContentPayload {
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

/// Payload of a `generate-composite-pack` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositePackPayload {
    pub project_id: ProjectId,
    #[serde(default)]
    pub include_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Payload tagged by job type.
///
/// Serialized adjacently as `{"job_type": "...", "payload": {...}}`, which is
/// also the body of a submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "payload", rename_all = "kebab-case")]
pub enum JobPayload {
    GenerateArtifact(ArtifactPayload),
    GenerateCompositePack(CompositePackPayload),
    GenerateStructuredContent(StructuredContentPayload),
}

impl JobPayload {
    /// Decodes the stored JSON of a job of `job_type` and validates it.
    pub fn decode(job_type: JobType, payload: &JsonValue) -> JobResult<Self> {
        let decoded: Self = serde_json::from_value(json!({
            "job_type": job_type,
            "payload": payload,
        }))?;
        decoded.validate()?;
        Ok(decoded)
    }

    #[must_use]
    pub const fn job_type(&self) -> JobType {
        match self {
            Self::GenerateArtifact(_) => JobType::GenerateArtifact,
            Self::GenerateCompositePack(_) => JobType::GenerateCompositePack,
            Self::GenerateStructuredContent(_) => JobType::GenerateStructuredContent,
        }
    }

    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        match self {
            Self::GenerateArtifact(p) => p.project_id,
            Self::GenerateCompositePack(p) => p.project_id,
            Self::GenerateStructuredContent(p) => p.project_id,
        }
    }

    pub fn validate(&self) -> JobResult<()> {
        match self {
            Self::GenerateArtifact(p) => {
                if !p.kind.is_image() {
                    return Err(JobError::validation(format!(
                        "artifact kind {} is not an image kind",
                        p.kind
                    )));
                }
                validate_style(p.style.as_deref())
            }
            Self::GenerateCompositePack(p) => validate_style(p.style.as_deref()),
            Self::GenerateStructuredContent(p) => {
                if let Some(locale) = p.locale.as_deref() {
                    if locale.trim().is_empty() || locale.len() > MAX_LOCALE_LEN {
                        return Err(JobError::validation(format!("invalid locale: {locale:?}")));
                    }
                }
                Ok(())
            }
        }
    }

    /// The JSON stored in the `payload` column.
    pub fn body(&self) -> JobResult<JsonValue> {
        let value = match self {
            Self::GenerateArtifact(p) => serde_json::to_value(p)?,
            Self::GenerateCompositePack(p) => serde_json::to_value(p)?,
            Self::GenerateStructuredContent(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    pub fn into_new_job(self, user_id: UserId, max_retries: i32) -> JobResult<NewJob> {
        Ok(NewJob::new(self.job_type(), self.body()?, user_id, max_retries))
    }
}

fn validate_style(style: Option<&str>) -> JobResult<()> {
    match style {
        Some(s) if s.len() > MAX_STYLE_LEN => Err(JobError::validation(format!(
            "style must be at most {MAX_STYLE_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_artifact_payload() {
        let project_id = ProjectId::new();
        let payload = JobPayload::decode(
            JobType::GenerateArtifact,
            &json!({"project_id": project_id, "kind": "lifestyle"}),
        )
        .unwrap();

        assert_eq!(
            payload,
            JobPayload::GenerateArtifact(ArtifactPayload {
                project_id,
                kind: ArtifactKind::Lifestyle,
                style: None,
            })
        );
        assert_eq!(payload.project_id(), project_id);
    }

    #[test]
    fn test_decode_uses_column_job_type() {
        let project_id = ProjectId::new();
        let payload = JobPayload::decode(
            JobType::GenerateCompositePack,
            &json!({"project_id": project_id}),
        )
        .unwrap();
        assert_eq!(payload.job_type(), JobType::GenerateCompositePack);
        assert!(matches!(
            payload,
            JobPayload::GenerateCompositePack(CompositePackPayload {
                include_content: false,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let cases = [
            (JobType::GenerateArtifact, json!({"kind": "main"})),
            (JobType::GenerateArtifact, json!({"project_id": "not-a-uuid", "kind": "main"})),
            (
                JobType::GenerateArtifact,
                json!({"project_id": ProjectId::new(), "kind": "hologram"}),
            ),
            (
                JobType::GenerateArtifact,
                json!({"project_id": ProjectId::new(), "kind": "structured-content"}),
            ),
            (
                JobType::GenerateStructuredContent,
                json!({"project_id": ProjectId::new(), "locale": " "}),
            ),
            (
                JobType::GenerateCompositePack,
                json!({"project_id": ProjectId::new(), "style": "x".repeat(201)}),
            ),
            (
                JobType::GenerateCompositePack,
                json!({"project_id": ProjectId::new(), "priority": 1}),
            ),
        ];

        for (job_type, payload) in cases {
            let err = JobPayload::decode(job_type, &payload).unwrap_err();
            assert!(matches!(err, JobError::Validation(_)), "{payload}");
        }
    }

    #[test]
    fn test_submission_body_shape() {
        let project_id = ProjectId::new();
        let payload: JobPayload = serde_json::from_value(json!({
            "job_type": "generate-structured-content",
            "payload": {"project_id": project_id, "locale": "de-DE", "tone": "playful"}
        }))
        .unwrap();

        let new_job = payload.into_new_job(UserId::new(), 3).unwrap();
        assert_eq!(new_job.job_type, JobType::GenerateStructuredContent);
        assert_eq!(new_job.payload["locale"], "de-DE");
        assert!(new_job.payload.get("job_type").is_none());
        assert_eq!(new_job.max_retries, 3);
    }
}
