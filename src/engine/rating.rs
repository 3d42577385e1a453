//! Reviews and rating aggregation
//!
//! The store folds each score into `rating_sum`/`rating_count` in place and
//! re-derives the average from them, so the mean is exact and concurrent
//! reviews on one resource never overwrite each other.

use tracing::info;
use uuid::Uuid;

use super::{Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{NewReview, Resource, Review};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

impl Engine {
    /// Repeat reviews by the same user are accepted and each one pays out.
    pub async fn submit_review(
        &self,
        caller: &Caller,
        resource_id: Uuid,
        score: i32,
        comment: &str,
    ) -> EngineResult<(Review, Resource)> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(EngineError::validation(format!(
                "score must be between {} and {}, got {}",
                MIN_SCORE, MAX_SCORE, score
            )));
        }
        self.visible_resource(Some(caller), resource_id).await?;

        let (review, resource) = self
            .store
            .record_review(
                NewReview {
                    resource_id,
                    user_id: caller.user_id,
                    score,
                    comment: comment.trim().to_string(),
                },
                self.config.review_reward,
            )
            .await?;

        info!(
            resource_id = %resource_id,
            user_id = %caller.user_id,
            score = score,
            rating_average = resource.rating_average,
            rating_count = resource.rating_count,
            reward = self.config.review_reward,
            "Review recorded"
        );
        Ok((review, resource))
    }

    pub async fn list_reviews(
        &self,
        caller: Option<&Caller>,
        resource_id: Uuid,
    ) -> EngineResult<Vec<Review>> {
        self.visible_resource(caller, resource_id).await?;
        self.store.list_reviews(resource_id).await
    }

    /// Approved resources sharing vendor or type, best rated then most downloaded
    pub async fn recommend(
        &self,
        caller: Option<&Caller>,
        resource_id: Uuid,
    ) -> EngineResult<Vec<Resource>> {
        let resource = self.visible_resource(caller, resource_id).await?;
        self.store
            .list_similar(&resource, self.config.recommendation_limit)
            .await
    }
}
