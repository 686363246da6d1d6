//! Postgres artifact store.

use crate::{traits::ArtifactStore, DatabasePoolInterface};
use atelier_core::{
    Artifact, ArtifactId, ArtifactKind, AtelierError, AtelierResult, NewArtifact, ProjectId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use shaku::Component;
use sqlx::FromRow;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed [`ArtifactStore`].
#[derive(Component, Clone)]
#[shaku(interface = ArtifactStore)]
pub struct PgArtifactStore {
    #[shaku(inject)]
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgArtifactStore {
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: Uuid,
    project_id: Uuid,
    kind: String,
    uri: Option<String>,
    content: Option<JsonValue>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = AtelierError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        Ok(Artifact {
            id: ArtifactId::from_uuid(row.id),
            project_id: ProjectId::from_uuid(row.project_id),
            kind: row.kind.parse()?,
            uri: row.uri,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn upsert_artifact(&self, artifact: NewArtifact) -> AtelierResult<Artifact> {
        let project_id = artifact.project_id;
        let kind = artifact.kind;
        let artifact = artifact.into_artifact();

        let inserted = sqlx::query_as::<_, ArtifactRow>(
            r#"
            INSERT INTO artifacts (id, project_id, kind, uri, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (project_id, kind) DO NOTHING
            RETURNING id, project_id, kind, uri, content, created_at
            "#,
        )
        .bind(artifact.id.into_inner())
        .bind(project_id.into_inner())
        .bind(kind.as_str())
        .bind(&artifact.uri)
        .bind(&artifact.content)
        .bind(artifact.created_at)
        .fetch_optional(self.pool.inner())
        .await?;

        if let Some(row) = inserted {
            debug!(project_id = %project_id, kind = %kind, "Stored artifact");
            return row.try_into();
        }

        debug!(project_id = %project_id, kind = %kind, "Artifact already present");
        self.find_artifact(project_id, kind)
            .await?
            .ok_or_else(|| AtelierError::not_found("artifact", format!("{}/{}", project_id, kind)))
    }

    async fn find_artifact(
        &self,
        project_id: ProjectId,
        kind: ArtifactKind,
    ) -> AtelierResult<Option<Artifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, project_id, kind, uri, content, created_at
            FROM artifacts
            WHERE project_id = $1 AND kind = $2
            "#,
        )
        .bind(project_id.into_inner())
        .bind(kind.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Artifact::try_from).transpose()
    }

    async fn list_for_project(&self, project_id: ProjectId) -> AtelierResult<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, project_id, kind, uri, content, created_at
            FROM artifacts
            WHERE project_id = $1
            ORDER BY created_at, kind
            "#,
        )
        .bind(project_id.into_inner())
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Artifact::try_from).collect()
    }

    async fn produced_kinds(&self, project_id: ProjectId) -> AtelierResult<Vec<ArtifactKind>> {
        let kinds: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT kind FROM artifacts WHERE project_id = $1")
                .bind(project_id.into_inner())
                .fetch_all(self.pool.inner())
                .await?;

        kinds.iter().map(|k| k.parse()).collect()
    }
}
