//! Postgres project store.

use crate::{traits::ProjectStore, DatabasePoolInterface};
use atelier_core::{
    ArtifactKind, AtelierError, AtelierResult, Project, ProjectId, ProjectStatus, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shaku::Component;
use sqlx::FromRow;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const PROJECT_COLUMNS: &str =
    "id, user_id, name, source_images, status, expected_artifacts, created_at, updated_at";

/// Postgres-backed [`ProjectStore`].
#[derive(Component, Clone)]
#[shaku(interface = ProjectStore)]
pub struct PgProjectStore {
    #[shaku(inject)]
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgProjectStore {
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    source_images: Vec<String>,
    status: String,
    expected_artifacts: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = AtelierError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let expected_artifacts = row
            .expected_artifacts
            .iter()
            .map(|k| k.parse::<ArtifactKind>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Project {
            id: ProjectId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            name: row.name,
            source_images: row.source_images,
            status: row.status.parse::<ProjectStatus>()?,
            expected_artifacts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn kind_names(kinds: &[ArtifactKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn create_project(&self, project: &Project) -> AtelierResult<Project> {
        debug!(project_id = %project.id, "Creating project");

        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            INSERT INTO projects (id, user_id, name, source_images, status, expected_artifacts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project.id.into_inner())
        .bind(project.user_id.into_inner())
        .bind(&project.name)
        .bind(&project.source_images)
        .bind(project.status.as_str())
        .bind(kind_names(&project.expected_artifacts))
        .bind(project.created_at)
        .bind(project.updated_at)
        .fetch_one(self.pool.inner())
        .await?;

        row.try_into()
    }

    async fn get_project(&self, id: ProjectId) -> AtelierResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id.into_inner())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Project::try_from).transpose()
    }

    async fn begin_processing(
        &self,
        id: ProjectId,
        expected: &[ArtifactKind],
    ) -> AtelierResult<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            UPDATE projects
            SET status = 'processing', expected_artifacts = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id.into_inner())
        .bind(kind_names(expected))
        .fetch_optional(self.pool.inner())
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => self
                .get_project(id)
                .await?
                .ok_or_else(|| AtelierError::not_found("project", id)),
        }
    }

    async fn complete_if_processing(&self, id: ProjectId) -> AtelierResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE projects
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.into_inner())
        .execute(self.pool.inner())
        .await?
        .rows_affected();

        if updated == 1 {
            info!(project_id = %id, "Project completed");
        }
        Ok(updated == 1)
    }
}
