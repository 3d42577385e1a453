//! User Repository - PostgreSQL wallet operations using sqlx
//!
//! Balances are only ever changed with `points = points +/- $n` expressions so
//! concurrent credits and debits on the same row serialize on the row lock.

use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, display_name, role, points, created_at, updated_at";

pub(crate) fn user_from_row(row: &PgRow) -> EngineResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        role: role.parse().map_err(EngineError::PersistenceFailure)?,
        points: row.try_get("points")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, user: &NewUser) -> EngineResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, display_name, role, points)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    EngineError::validation(format!("email already registered: {}", user.email))
                }
                other => other.into(),
            })?;

        let created = user_from_row(&row)?;
        debug!(user_id = %created.id, "User inserted");
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> EngineResult<Option<User>> {
        Self::get_with(&mut *self.pool.acquire().await?, id).await
    }

    pub async fn credit(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        Self::credit_with(&mut *self.pool.acquire().await?, user_id, amount).await
    }

    pub async fn debit(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        Self::debit_with(&mut *self.pool.acquire().await?, user_id, amount).await
    }

    pub(crate) async fn get_with(conn: &mut PgConnection, id: Uuid) -> EngineResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Credit inside an open connection or transaction
    pub(crate) async fn credit_with(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: i64,
    ) -> EngineResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET points = points + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(amount)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        debug!(user_id = %user_id, amount = amount, "Points credited");
        user_from_row(&row)
    }

    /// Guarded debit: the `points >= $2` predicate makes the check and the
    /// decrement a single statement.
    pub(crate) async fn debit_with(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: i64,
    ) -> EngineResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET points = points - $2, updated_at = NOW()
            WHERE id = $1 AND points >= $2
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(amount)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                debug!(user_id = %user_id, amount = amount, "Points debited");
                user_from_row(&row)
            }
            None => match Self::get_with(conn, user_id).await? {
                Some(user) => Err(EngineError::InsufficientPoints {
                    balance: user.points,
                    required: amount,
                }),
                None => Err(EngineError::not_found("user", user_id)),
            },
        }
    }
}
