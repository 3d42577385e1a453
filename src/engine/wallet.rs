//! Identity and wallet operations

use tracing::info;
use uuid::Uuid;

use super::{AdminToken, Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{NewUser, User, UserSummary};

fn check_amount(amount: i64) -> EngineResult<()> {
    if amount < 0 {
        return Err(EngineError::validation(format!(
            "points amount must be non-negative, got {}",
            amount
        )));
    }
    Ok(())
}

impl Engine {
    /// Create a user record. Credentials live with the authentication provider.
    pub async fn provision_user(&self, token: &AdminToken, user: NewUser) -> EngineResult<User> {
        if user.display_name.trim().is_empty() {
            return Err(EngineError::validation("display name is required"));
        }
        if !user.email.contains('@') {
            return Err(EngineError::validation(format!("invalid email: {}", user.email)));
        }

        let created = self.store.create_user(user).await?;
        info!(
            user_id = %created.id,
            role = %created.role,
            admin_id = %token.admin_id(),
            "User provisioned"
        );
        Ok(created)
    }

    /// Points and derived level of the caller
    pub async fn get_wallet(&self, caller: &Caller) -> EngineResult<UserSummary> {
        Ok(self.existing_user(caller.user_id).await?.summary())
    }

    pub async fn user_summary(&self, user_id: Uuid) -> EngineResult<UserSummary> {
        Ok(self.existing_user(user_id).await?.summary())
    }

    pub async fn credit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<UserSummary> {
        check_amount(amount)?;
        let user = self.store.credit_points(user_id, amount).await?;
        info!(user_id = %user_id, points = amount, balance = user.points, "Points credited");
        Ok(user.summary())
    }

    pub async fn debit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<UserSummary> {
        check_amount(amount)?;
        let user = self.store.debit_points(user_id, amount).await?;
        info!(user_id = %user_id, points = amount, balance = user.points, "Points debited");
        Ok(user.summary())
    }

    /// Manual credit by an administrator
    pub async fn grant_points(
        &self,
        token: &AdminToken,
        user_id: Uuid,
        amount: i64,
    ) -> EngineResult<UserSummary> {
        info!(admin_id = %token.admin_id(), user_id = %user_id, points = amount, "Points granted");
        self.credit_points(user_id, amount).await
    }
}
