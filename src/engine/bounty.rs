//! Bounty request ledger
//!
//! Posting a request escrows its bounty out of the poster's wallet. The escrow
//! is released exactly once: to the fulfiller on `fulfill`, back to the poster
//! on `close`.

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{BountyRequest, NewRequest, Settlement};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    pub bounty: i64,
}

impl Engine {
    pub async fn create_request(
        &self,
        caller: &Caller,
        draft: RequestDraft,
    ) -> EngineResult<BountyRequest> {
        if draft.title.trim().is_empty() {
            return Err(EngineError::validation("title is required"));
        }
        if draft.bounty < 0 {
            return Err(EngineError::validation(format!(
                "bounty must be non-negative, got {}",
                draft.bounty
            )));
        }

        let request = self
            .store
            .create_request_with_escrow(NewRequest {
                title: draft.title.trim().to_string(),
                description: draft.description,
                bounty: draft.bounty,
                user_id: caller.user_id,
            })
            .await?;

        info!(
            request_id = %request.id,
            user_id = %caller.user_id,
            bounty = request.bounty,
            "Bounty escrowed"
        );
        Ok(request)
    }

    pub async fn list_requests(&self) -> EngineResult<Vec<BountyRequest>> {
        self.store.list_requests().await
    }

    pub async fn get_request(&self, request_id: Uuid) -> EngineResult<BountyRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("request", request_id))
    }

    /// Only the poster or an admin may settle; a poster cannot pay themselves.
    pub async fn settle_request(
        &self,
        caller: &Caller,
        request_id: Uuid,
        settlement: Settlement,
    ) -> EngineResult<BountyRequest> {
        let request = self.get_request(request_id).await?;
        if request.user_id != caller.user_id && !caller.is_admin() {
            return Err(EngineError::Forbidden(format!(
                "only the poster or an administrator can settle request {}",
                request_id
            )));
        }

        if let Settlement::Fulfill { fulfiller_id } = settlement {
            if fulfiller_id == request.user_id {
                return Err(EngineError::validation(
                    "a request cannot be fulfilled by its own poster",
                ));
            }
            self.existing_user(fulfiller_id).await?;
        }

        let settled = self.store.settle_request(request_id, settlement).await?;
        info!(
            request_id = %request_id,
            status = %settled.status,
            beneficiary = %settlement.beneficiary(settled.user_id),
            bounty = settled.bounty,
            "Escrow released"
        );
        Ok(settled)
    }
}
