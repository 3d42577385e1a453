//! Engagement Repository - favorites, download logs, reports and learning progress

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    DownloadLog, FavoriteToggle, LearningProgress, NewReport, ProgressStatus, Report, ReportStatus,
};

const REPORT_COLUMNS: &str = "id, user_id, resource_id, reason, status, created_at";
const PROGRESS_COLUMNS: &str = "user_id, resource_id, progress, status, updated_at";

fn report_from_row(row: &PgRow) -> EngineResult<Report> {
    let status: String = row.try_get("status")?;
    Ok(Report {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        resource_id: row.try_get("resource_id")?,
        reason: row.try_get("reason")?,
        status: status.parse().map_err(EngineError::PersistenceFailure)?,
        created_at: row.try_get("created_at")?,
    })
}

fn progress_from_row(row: &PgRow) -> EngineResult<LearningProgress> {
    let status: String = row.try_get("status")?;
    Ok(LearningProgress {
        user_id: row.try_get("user_id")?,
        resource_id: row.try_get("resource_id")?,
        progress: row.try_get("progress")?,
        status: status.parse().map_err(EngineError::PersistenceFailure)?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct EngagementRepository {
    pool: PgPool,
}

impl EngagementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== Favorites ====================

    /// Delete-then-insert keeps the toggle a pair of single statements; the
    /// unique (user_id, resource_id) index absorbs a concurrent double add.
    pub async fn toggle_favorite(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<FavoriteToggle> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND resource_id = $2")
            .bind(user_id)
            .bind(resource_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            debug!(user_id = %user_id, resource_id = %resource_id, "Favorite removed");
            return Ok(FavoriteToggle::Removed);
        }

        sqlx::query(
            r#"
            INSERT INTO favorites (id, user_id, resource_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, resource_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(resource_id)
        .execute(&self.pool)
        .await?;

        debug!(user_id = %user_id, resource_id = %resource_id, "Favorite added");
        Ok(FavoriteToggle::Added)
    }

    pub async fn is_favorite(&self, user_id: Uuid, resource_id: Uuid) -> EngineResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND resource_id = $2)",
        )
        .bind(user_id)
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn favorite_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT resource_id FROM favorites WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    // ==================== Downloads ====================

    pub async fn append_download_log(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<DownloadLog> {
        let row = sqlx::query(
            r#"
            INSERT INTO download_logs (id, user_id, resource_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, resource_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DownloadLog {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            resource_id: row.try_get("resource_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn downloaded_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT resource_id FROM download_logs
            WHERE user_id = $1
            GROUP BY resource_id
            ORDER BY MAX(created_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    // ==================== Reports ====================

    pub async fn insert_report(&self, report: NewReport) -> EngineResult<Report> {
        let sql = format!(
            r#"
            INSERT INTO reports (id, user_id, resource_id, reason, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(report.user_id)
            .bind(report.resource_id)
            .bind(&report.reason)
            .fetch_one(&self.pool)
            .await?;

        let created = report_from_row(&row)?;
        debug!(report_id = %created.id, resource_id = %created.resource_id, "Report filed");
        Ok(created)
    }

    pub async fn list_reports(&self, status: ReportStatus) -> EngineResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE status = $1 ORDER BY created_at DESC",
            REPORT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }

    pub async fn resolve_report(&self, id: Uuid) -> EngineResult<Report> {
        let sql = format!(
            r#"
            UPDATE reports SET status = 'resolved'
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => report_from_row(&row),
            None => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM reports WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                Err(match current {
                    Some(from) => EngineError::InvalidTransition {
                        from,
                        to: ReportStatus::Resolved.to_string(),
                    },
                    None => EngineError::not_found("report", id),
                })
            }
        }
    }

    // ==================== Learning progress ====================

    pub async fn upsert_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        progress: i32,
    ) -> EngineResult<LearningProgress> {
        let sql = format!(
            r#"
            INSERT INTO learning_progress (user_id, resource_id, progress, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, resource_id)
            DO UPDATE SET progress = EXCLUDED.progress, status = EXCLUDED.status, updated_at = NOW()
            RETURNING {}
            "#,
            PROGRESS_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(resource_id)
            .bind(progress)
            .bind(ProgressStatus::for_progress(progress).as_str())
            .fetch_one(&self.pool)
            .await?;
        progress_from_row(&row)
    }

    pub async fn get_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<Option<LearningProgress>> {
        let sql = format!(
            "SELECT {} FROM learning_progress WHERE user_id = $1 AND resource_id = $2",
            PROGRESS_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(progress_from_row).transpose()
    }
}
