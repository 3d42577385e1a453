//! Request Repository - bounty requests and their escrow

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::database::users::UserRepository;
use crate::error::{EngineError, EngineResult};
use crate::models::{BountyRequest, NewRequest, Settlement};

const REQUEST_COLUMNS: &str =
    "id, title, description, bounty, status, user_id, fulfiller_id, created_at, updated_at";

fn request_from_row(row: &PgRow) -> EngineResult<BountyRequest> {
    let status: String = row.try_get("status")?;
    Ok(BountyRequest {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        bounty: row.try_get("bounty")?,
        status: status.parse().map_err(EngineError::PersistenceFailure)?,
        user_id: row.try_get("user_id")?,
        fulfiller_id: row.try_get("fulfiller_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct RequestRepository {
    pool: PgPool,
}

impl RequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Debit and insert share a transaction: a failed debit rolls back with
    /// no request row, a failed insert rolls back the debit.
    pub async fn create_with_escrow(&self, new: NewRequest) -> EngineResult<BountyRequest> {
        let mut tx = self.pool.begin().await?;

        if new.bounty > 0 {
            UserRepository::debit_with(&mut tx, new.user_id, new.bounty).await?;
        }

        let request = BountyRequest::from_new(new);
        let sql = format!(
            r#"
            INSERT INTO requests (id, title, description, bounty, status, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request.id)
            .bind(&request.title)
            .bind(&request.description)
            .bind(request.bounty)
            .bind(request.status.as_str())
            .bind(request.user_id)
            .fetch_one(&mut *tx)
            .await?;
        let created = request_from_row(&row)?;

        tx.commit().await?;
        info!(request_id = %created.id, bounty = created.bounty, "Bounty request opened");
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> EngineResult<Option<BountyRequest>> {
        let sql = format!("SELECT {} FROM requests WHERE id = $1", REQUEST_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(request_from_row).transpose()
    }

    pub async fn list(&self) -> EngineResult<Vec<BountyRequest>> {
        let sql = format!("SELECT {} FROM requests ORDER BY created_at DESC", REQUEST_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    pub async fn settle(&self, id: Uuid, settlement: Settlement) -> EngineResult<BountyRequest> {
        let mut tx = self.pool.begin().await?;

        let fulfiller_id = match settlement {
            Settlement::Fulfill { fulfiller_id } => Some(fulfiller_id),
            Settlement::Close => None,
        };
        let sql = format!(
            r#"
            UPDATE requests SET status = $2, fulfiller_id = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(settlement.target_status().as_str())
            .bind(fulfiller_id)
            .fetch_optional(&mut *tx)
            .await?;

        let settled = match row {
            Some(row) => request_from_row(&row)?,
            None => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM requests WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match current {
                    Some(from) => EngineError::InvalidTransition {
                        from,
                        to: settlement.target_status().to_string(),
                    },
                    None => EngineError::not_found("request", id),
                });
            }
        };

        if settled.bounty > 0 {
            let beneficiary = settlement.beneficiary(settled.user_id);
            UserRepository::credit_with(&mut tx, beneficiary, settled.bounty).await?;
        }

        tx.commit().await?;
        info!(
            request_id = %id,
            status = %settled.status,
            bounty = settled.bounty,
            "Bounty request settled"
        );
        Ok(settled)
    }
}
