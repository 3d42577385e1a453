//! Persistence seam used by the engine
//!
//! Every method that mutates more than one row (review + rating + reviewer
//! credit, approval + uploader credit, escrow debit + request insert, request
//! settlement + credit) is atomic inside the implementation. Counters and
//! wallet balances are updated in place, never read-modify-written by the
//! caller.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{
    BountyRequest, DownloadLog, FavoriteToggle, LearningProgress, NewReport, NewRequest,
    NewResource, NewReview, NewUser, Report, ReportStatus, Resource, ResourceQuery,
    ResourceStatus, Review, Settlement, User,
};

#[async_trait]
pub trait Store: Send + Sync {
    // Users & wallet

    async fn create_user(&self, user: NewUser) -> EngineResult<User>;

    async fn get_user(&self, id: Uuid) -> EngineResult<Option<User>>;

    /// Atomically add `amount` points. Fails with `NotFound` for unknown users.
    async fn credit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User>;

    /// Atomically remove `amount` points. Fails with `InsufficientPoints`
    /// without touching the balance when it would go negative.
    async fn debit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User>;

    // Resources

    async fn find_by_fingerprint(&self, file_hash: &str) -> EngineResult<Option<Resource>>;

    /// Insert a `pending` row. A fingerprint collision fails with `DuplicateContent`.
    async fn insert_resource(&self, resource: NewResource) -> EngineResult<Resource>;

    async fn get_resource(&self, id: Uuid) -> EngineResult<Option<Resource>>;

    /// Approved resources matching the filters, sorted and paginated
    async fn list_resources(&self, query: &ResourceQuery, limit: i64)
        -> EngineResult<Vec<Resource>>;

    async fn list_by_status(&self, status: ResourceStatus) -> EngineResult<Vec<Resource>>;

    async fn list_by_uploader(&self, uploader_id: Uuid) -> EngineResult<Vec<Resource>>;

    /// Resources for the given ids, in the order of `ids`; unknown ids are skipped
    async fn list_by_ids(&self, ids: &[Uuid]) -> EngineResult<Vec<Resource>>;

    async fn list_approved_children(&self, parent_id: Uuid) -> EngineResult<Vec<Resource>>;

    /// Approved resources sharing vendor or type, best rated first
    async fn list_similar(&self, resource: &Resource, limit: i64) -> EngineResult<Vec<Resource>>;

    /// Raw tag strings of every approved resource
    async fn approved_tag_strings(&self) -> EngineResult<Vec<String>>;

    /// Move a `pending` resource to `to`, crediting `uploader_reward` to the
    /// uploader in the same unit of work when `to` is `Approved`.
    async fn transition_resource(
        &self,
        id: Uuid,
        to: ResourceStatus,
        reject_reason: Option<String>,
        uploader_reward: i64,
    ) -> EngineResult<Resource>;

    async fn increment_download_count(&self, id: Uuid) -> EngineResult<()>;

    // Reviews

    /// Insert the review, fold its score into the resource rating and credit
    /// the reviewer, as one unit of work.
    async fn record_review(
        &self,
        review: NewReview,
        reviewer_reward: i64,
    ) -> EngineResult<(Review, Resource)>;

    async fn list_reviews(&self, resource_id: Uuid) -> EngineResult<Vec<Review>>;

    // Engagement

    async fn toggle_favorite(&self, user_id: Uuid, resource_id: Uuid)
        -> EngineResult<FavoriteToggle>;

    async fn is_favorite(&self, user_id: Uuid, resource_id: Uuid) -> EngineResult<bool>;

    /// Favorited resource ids, most recent first
    async fn favorite_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>>;

    async fn append_download_log(&self, user_id: Uuid, resource_id: Uuid)
        -> EngineResult<DownloadLog>;

    /// Distinct downloaded resource ids, most recently downloaded first
    async fn downloaded_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>>;

    async fn insert_report(&self, report: NewReport) -> EngineResult<Report>;

    async fn list_reports(&self, status: ReportStatus) -> EngineResult<Vec<Report>>;

    /// `pending -> resolved`; resolving twice is an `InvalidTransition`
    async fn resolve_report(&self, id: Uuid) -> EngineResult<Report>;

    async fn upsert_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        progress: i32,
    ) -> EngineResult<LearningProgress>;

    async fn get_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<Option<LearningProgress>>;

    // Bounty requests

    /// Debit the bounty from the poster and insert the request, atomically
    async fn create_request_with_escrow(&self, request: NewRequest)
        -> EngineResult<BountyRequest>;

    async fn get_request(&self, id: Uuid) -> EngineResult<Option<BountyRequest>>;

    async fn list_requests(&self) -> EngineResult<Vec<BountyRequest>>;

    /// Move an `open` request to its settled status and release the escrow
    async fn settle_request(&self, id: Uuid, settlement: Settlement)
        -> EngineResult<BountyRequest>;
}
