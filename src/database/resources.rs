//! Resource Repository - PostgreSQL operations for resources and reviews using sqlx

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::users::UserRepository;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    NewResource, NewReview, Resource, ResourceQuery, ResourceStatus, Review, SortOrder,
};

const RESOURCE_COLUMNS: &str = "id, title, description, resource_type, vendor, device_model, \
     protocol, scenario, tags, file_path, file_name, content_type, file_hash, external_link, \
     status, reject_reason, download_count, rating_average, rating_count, rating_sum, \
     parent_id, version, uploader_id, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, resource_id, user_id, score, comment, created_at";

pub(crate) fn resource_from_row(row: &PgRow) -> EngineResult<Resource> {
    let status: String = row.try_get("status")?;
    Ok(Resource {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        resource_type: row.try_get("resource_type")?,
        vendor: row.try_get("vendor")?,
        device_model: row.try_get("device_model")?,
        protocol: row.try_get("protocol")?,
        scenario: row.try_get("scenario")?,
        tags: row.try_get("tags")?,
        file_path: row.try_get("file_path")?,
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        file_hash: row.try_get("file_hash")?,
        external_link: row.try_get("external_link")?,
        status: status.parse().map_err(EngineError::PersistenceFailure)?,
        reject_reason: row.try_get("reject_reason")?,
        download_count: row.try_get("download_count")?,
        rating_average: row.try_get("rating_average")?,
        rating_count: row.try_get("rating_count")?,
        rating_sum: row.try_get("rating_sum")?,
        parent_id: row.try_get("parent_id")?,
        version: row.try_get("version")?,
        uploader_id: row.try_get("uploader_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn review_from_row(row: &PgRow) -> EngineResult<Review> {
    Ok(Review {
        id: row.try_get("id")?,
        resource_id: row.try_get("resource_id")?,
        user_id: row.try_get("user_id")?,
        score: row.try_get("score")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}

fn resources_from_rows(rows: &[PgRow]) -> EngineResult<Vec<Resource>> {
    rows.iter().map(resource_from_row).collect()
}

/// `%needle%` with LIKE metacharacters escaped
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub struct ResourceRepository {
    pool: PgPool,
}

impl ResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_fingerprint(&self, file_hash: &str) -> EngineResult<Option<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE file_hash = $1 LIMIT 1",
            RESOURCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    pub async fn insert(&self, new: NewResource) -> EngineResult<Resource> {
        let file_hash = new.file_hash.clone();
        let resource = Resource::from_new(new);
        let sql = format!(
            r#"
            INSERT INTO resources
                (id, title, description, resource_type, vendor, device_model, protocol,
                 scenario, tags, file_path, file_name, content_type, file_hash, external_link,
                 status, parent_id, version, uploader_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {}
            "#,
            RESOURCE_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(resource.id)
            .bind(&resource.title)
            .bind(&resource.description)
            .bind(&resource.resource_type)
            .bind(&resource.vendor)
            .bind(&resource.device_model)
            .bind(&resource.protocol)
            .bind(&resource.scenario)
            .bind(&resource.tags)
            .bind(&resource.file_path)
            .bind(&resource.file_name)
            .bind(&resource.content_type)
            .bind(&resource.file_hash)
            .bind(&resource.external_link)
            .bind(resource.status.as_str())
            .bind(resource.parent_id)
            .bind(&resource.version)
            .bind(resource.uploader_id)
            .fetch_one(&self.pool)
            .await;

        let row = match result {
            Ok(row) => row,
            // Lost a race against a concurrent upload of the same bytes
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let hash = file_hash.unwrap_or_default();
                return match self.find_by_fingerprint(&hash).await? {
                    Some(existing) => Err(EngineError::DuplicateContent {
                        existing_id: existing.id,
                    }),
                    None => Err(EngineError::PersistenceFailure(db.to_string())),
                };
            }
            Err(e) => return Err(e.into()),
        };

        debug!(resource_id = %resource.id, "Resource inserted");
        resource_from_row(&row)
    }

    pub async fn get(&self, id: Uuid) -> EngineResult<Option<Resource>> {
        let sql = format!("SELECT {} FROM resources WHERE id = $1", RESOURCE_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    /// Public listing: approved only, filters combined with AND
    pub async fn list(&self, query: &ResourceQuery, limit: i64) -> EngineResult<Vec<Resource>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM resources WHERE status = 'approved'",
            RESOURCE_COLUMNS
        ));

        if let Some(t) = query.resource_type() {
            qb.push(" AND resource_type = ").push_bind(t.to_string());
        }
        let substring_filters = [
            ("vendor", query.vendor()),
            ("device_model", query.device()),
            ("protocol", query.protocol()),
            ("scenario", query.scenario()),
            ("tags", query.tag()),
        ];
        for (column, value) in substring_filters {
            if let Some(v) = value {
                qb.push(format!(" AND {} ILIKE ", column))
                    .push_bind(like_pattern(v));
            }
        }
        for keyword in query.search_keywords() {
            let pattern = like_pattern(keyword);
            qb.push(" AND (");
            let mut separated = qb.separated(" OR ");
            for column in ["title", "description", "tags", "vendor", "device_model"] {
                separated
                    .push(format!("{} ILIKE ", column))
                    .push_bind_unseparated(pattern.clone());
            }
            qb.push(")");
        }

        qb.push(match query.sort {
            SortOrder::Newest => " ORDER BY created_at DESC",
            SortOrder::Downloads => " ORDER BY download_count DESC, created_at DESC",
        });
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(query.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        resources_from_rows(&rows)
    }

    pub async fn list_by_status(&self, status: ResourceStatus) -> EngineResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE status = $1 ORDER BY created_at DESC",
            RESOURCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        resources_from_rows(&rows)
    }

    pub async fn list_by_uploader(&self, uploader_id: Uuid) -> EngineResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE uploader_id = $1 ORDER BY created_at DESC",
            RESOURCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(uploader_id)
            .fetch_all(&self.pool)
            .await?;
        resources_from_rows(&rows)
    }

    pub async fn list_by_ids(&self, ids: &[Uuid]) -> EngineResult<Vec<Resource>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM resources WHERE id = ANY($1)", RESOURCE_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        let mut found = resources_from_rows(&rows)?;

        // Restore caller order
        found.sort_by_key(|r| ids.iter().position(|id| *id == r.id));
        Ok(found)
    }

    pub async fn list_approved_children(&self, parent_id: Uuid) -> EngineResult<Vec<Resource>> {
        let sql = format!(
            r#"
            SELECT {} FROM resources
            WHERE parent_id = $1 AND status = 'approved'
            ORDER BY created_at ASC
            "#,
            RESOURCE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(parent_id).fetch_all(&self.pool).await?;
        resources_from_rows(&rows)
    }

    pub async fn list_similar(&self, resource: &Resource, limit: i64) -> EngineResult<Vec<Resource>> {
        let sql = format!(
            r#"
            SELECT {} FROM resources
            WHERE id <> $1 AND status = 'approved' AND (vendor = $2 OR resource_type = $3)
            ORDER BY rating_average DESC, download_count DESC
            LIMIT $4
            "#,
            RESOURCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(resource.id)
            .bind(&resource.vendor)
            .bind(&resource.resource_type)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        resources_from_rows(&rows)
    }

    pub async fn approved_tag_strings(&self) -> EngineResult<Vec<String>> {
        let rows = sqlx::query("SELECT tags FROM resources WHERE status = 'approved' AND tags <> ''")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("tags").map_err(EngineError::from))
            .collect()
    }

    /// Compare-and-set on `status = 'pending'`; the uploader credit shares the
    /// transaction so a failed credit leaves the resource pending.
    pub async fn transition(
        &self,
        id: Uuid,
        to: ResourceStatus,
        reject_reason: Option<String>,
        uploader_reward: i64,
    ) -> EngineResult<Resource> {
        let mut tx = self.pool.begin().await?;

        let reject_reason = match to {
            ResourceStatus::Rejected => reject_reason,
            _ => None,
        };
        let sql = format!(
            r#"
            UPDATE resources SET status = $2, reject_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            RESOURCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(to.as_str())
            .bind(&reject_reason)
            .fetch_optional(&mut *tx)
            .await?;

        let resource = match row {
            Some(row) => resource_from_row(&row)?,
            None => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM resources WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match current {
                    Some(from) => EngineError::InvalidTransition {
                        from,
                        to: to.to_string(),
                    },
                    None => EngineError::not_found("resource", id),
                });
            }
        };

        if to == ResourceStatus::Approved && uploader_reward != 0 {
            UserRepository::credit_with(&mut tx, resource.uploader_id, uploader_reward).await?;
        }

        tx.commit().await?;
        info!(resource_id = %id, status = %to, "Resource status changed");
        Ok(resource)
    }

    pub async fn increment_download_count(&self, id: Uuid) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE resources SET download_count = download_count + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("resource", id));
        }
        Ok(())
    }

    /// Review insert, rating fold and reviewer credit in one transaction.
    /// The rating columns are recomputed from their own current values inside
    /// the UPDATE, so concurrent reviews cannot lose each other.
    pub async fn record_review(
        &self,
        review: NewReview,
        reviewer_reward: i64,
    ) -> EngineResult<(Review, Resource)> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE resources SET
                rating_count = rating_count + 1,
                rating_sum = rating_sum + $2,
                rating_average = (rating_sum + $2)::DOUBLE PRECISION / (rating_count + 1),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RESOURCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(review.resource_id)
            .bind(i64::from(review.score))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("resource", review.resource_id))?;
        let resource = resource_from_row(&row)?;

        let sql = format!(
            r#"
            INSERT INTO reviews (id, resource_id, user_id, score, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(review.resource_id)
            .bind(review.user_id)
            .bind(review.score)
            .bind(&review.comment)
            .fetch_one(&mut *tx)
            .await?;
        let created = review_from_row(&row)?;

        if reviewer_reward != 0 {
            UserRepository::credit_with(&mut tx, review.user_id, reviewer_reward).await?;
        }

        tx.commit().await?;
        debug!(resource_id = %resource.id, review_id = %created.id, "Review recorded");
        Ok((created, resource))
    }

    pub async fn list_reviews(&self, resource_id: Uuid) -> EngineResult<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE resource_id = $1 ORDER BY created_at DESC",
            REVIEW_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(resource_id).fetch_all(&self.pool).await?;
        rows.iter().map(review_from_row).collect()
    }
}
