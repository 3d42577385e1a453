//! Database Connection Pool using sqlx

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::database::engagement::EngagementRepository;
use crate::database::requests::RequestRepository;
use crate::database::resources::ResourceRepository;
use crate::database::store::Store;
use crate::database::users::UserRepository;
use crate::error::EngineResult;
use crate::models::{
    BountyRequest, DownloadLog, FavoriteToggle, LearningProgress, NewReport, NewRequest,
    NewResource, NewReview, NewUser, Report, ReportStatus, Resource, ResourceQuery,
    ResourceStatus, Review, Settlement, User,
};

const SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            points BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "resources",
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id UUID PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            resource_type TEXT NOT NULL,
            vendor TEXT NOT NULL DEFAULT '',
            device_model TEXT NOT NULL DEFAULT '',
            protocol TEXT NOT NULL DEFAULT '',
            scenario TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            file_path TEXT,
            file_name TEXT,
            content_type TEXT,
            file_hash TEXT,
            external_link TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            reject_reason TEXT,
            download_count BIGINT NOT NULL DEFAULT 0,
            rating_average DOUBLE PRECISION NOT NULL DEFAULT 0,
            rating_count BIGINT NOT NULL DEFAULT 0,
            rating_sum BIGINT NOT NULL DEFAULT 0,
            parent_id UUID REFERENCES resources(id),
            version TEXT NOT NULL DEFAULT '1.0',
            uploader_id UUID NOT NULL REFERENCES users(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "resources_file_hash_idx",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS resources_file_hash_idx
            ON resources (file_hash) WHERE file_hash IS NOT NULL
        "#,
    ),
    (
        "resources_status_idx",
        "CREATE INDEX IF NOT EXISTS resources_status_idx ON resources (status, created_at DESC)",
    ),
    (
        "reviews",
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            id UUID PRIMARY KEY,
            resource_id UUID NOT NULL REFERENCES resources(id),
            user_id UUID NOT NULL REFERENCES users(id),
            score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
            comment TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "favorites",
        r#"
        CREATE TABLE IF NOT EXISTS favorites (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id),
            resource_id UUID NOT NULL REFERENCES resources(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, resource_id)
        )
        "#,
    ),
    (
        "download_logs",
        r#"
        CREATE TABLE IF NOT EXISTS download_logs (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id),
            resource_id UUID NOT NULL REFERENCES resources(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "reports",
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id),
            resource_id UUID NOT NULL REFERENCES resources(id),
            reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "requests",
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id UUID PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            bounty BIGINT NOT NULL CHECK (bounty >= 0),
            status TEXT NOT NULL DEFAULT 'open',
            user_id UUID NOT NULL REFERENCES users(id),
            fulfiller_id UUID REFERENCES users(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "learning_progress",
        r#"
        CREATE TABLE IF NOT EXISTS learning_progress (
            user_id UUID NOT NULL REFERENCES users(id),
            resource_id UUID NOT NULL REFERENCES resources(id),
            progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
            status TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, resource_id)
        )
        "#,
    ),
];

pub struct DatabasePool {
    pool: PgPool,
    users: UserRepository,
    resources: ResourceRepository,
    engagement: EngagementRepository,
    requests: RequestRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            users: UserRepository::new(pool.clone()),
            resources: ResourceRepository::new(pool.clone()),
            engagement: EngagementRepository::new(pool.clone()),
            requests: RequestRepository::new(pool.clone()),
            pool,
        })
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema...");

        for (name, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {}", name))?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn resources(&self) -> &ResourceRepository {
        &self.resources
    }

    pub fn engagement(&self) -> &EngagementRepository {
        &self.engagement
    }

    pub fn requests(&self) -> &RequestRepository {
        &self.requests
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for DatabasePool {
    async fn create_user(&self, user: NewUser) -> EngineResult<User> {
        self.users.insert(&user).await
    }

    async fn get_user(&self, id: Uuid) -> EngineResult<Option<User>> {
        self.users.get(id).await
    }

    async fn credit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        self.users.credit(user_id, amount).await
    }

    async fn debit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        self.users.debit(user_id, amount).await
    }

    async fn find_by_fingerprint(&self, file_hash: &str) -> EngineResult<Option<Resource>> {
        self.resources.find_by_fingerprint(file_hash).await
    }

    async fn insert_resource(&self, resource: NewResource) -> EngineResult<Resource> {
        self.resources.insert(resource).await
    }

    async fn get_resource(&self, id: Uuid) -> EngineResult<Option<Resource>> {
        self.resources.get(id).await
    }

    async fn list_resources(
        &self,
        query: &ResourceQuery,
        limit: i64,
    ) -> EngineResult<Vec<Resource>> {
        self.resources.list(query, limit).await
    }

    async fn list_by_status(&self, status: ResourceStatus) -> EngineResult<Vec<Resource>> {
        self.resources.list_by_status(status).await
    }

    async fn list_by_uploader(&self, uploader_id: Uuid) -> EngineResult<Vec<Resource>> {
        self.resources.list_by_uploader(uploader_id).await
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> EngineResult<Vec<Resource>> {
        self.resources.list_by_ids(ids).await
    }

    async fn list_approved_children(&self, parent_id: Uuid) -> EngineResult<Vec<Resource>> {
        self.resources.list_approved_children(parent_id).await
    }

    async fn list_similar(&self, resource: &Resource, limit: i64) -> EngineResult<Vec<Resource>> {
        self.resources.list_similar(resource, limit).await
    }

    async fn approved_tag_strings(&self) -> EngineResult<Vec<String>> {
        self.resources.approved_tag_strings().await
    }

    async fn transition_resource(
        &self,
        id: Uuid,
        to: ResourceStatus,
        reject_reason: Option<String>,
        uploader_reward: i64,
    ) -> EngineResult<Resource> {
        self.resources
            .transition(id, to, reject_reason, uploader_reward)
            .await
    }

    async fn increment_download_count(&self, id: Uuid) -> EngineResult<()> {
        self.resources.increment_download_count(id).await
    }

    async fn record_review(
        &self,
        review: NewReview,
        reviewer_reward: i64,
    ) -> EngineResult<(Review, Resource)> {
        self.resources.record_review(review, reviewer_reward).await
    }

    async fn list_reviews(&self, resource_id: Uuid) -> EngineResult<Vec<Review>> {
        self.resources.list_reviews(resource_id).await
    }

    async fn toggle_favorite(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<FavoriteToggle> {
        self.engagement.toggle_favorite(user_id, resource_id).await
    }

    async fn is_favorite(&self, user_id: Uuid, resource_id: Uuid) -> EngineResult<bool> {
        self.engagement.is_favorite(user_id, resource_id).await
    }

    async fn favorite_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        self.engagement.favorite_resource_ids(user_id).await
    }

    async fn append_download_log(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<DownloadLog> {
        self.engagement.append_download_log(user_id, resource_id).await
    }

    async fn downloaded_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        self.engagement.downloaded_resource_ids(user_id).await
    }

    async fn insert_report(&self, report: NewReport) -> EngineResult<Report> {
        self.engagement.insert_report(report).await
    }

    async fn list_reports(&self, status: ReportStatus) -> EngineResult<Vec<Report>> {
        self.engagement.list_reports(status).await
    }

    async fn resolve_report(&self, id: Uuid) -> EngineResult<Report> {
        self.engagement.resolve_report(id).await
    }

    async fn upsert_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        progress: i32,
    ) -> EngineResult<LearningProgress> {
        self.engagement
            .upsert_progress(user_id, resource_id, progress)
            .await
    }

    async fn get_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<Option<LearningProgress>> {
        self.engagement.get_progress(user_id, resource_id).await
    }

    async fn create_request_with_escrow(
        &self,
        request: NewRequest,
    ) -> EngineResult<BountyRequest> {
        self.requests.create_with_escrow(request).await
    }

    async fn get_request(&self, id: Uuid) -> EngineResult<Option<BountyRequest>> {
        self.requests.get(id).await
    }

    async fn list_requests(&self) -> EngineResult<Vec<BountyRequest>> {
        self.requests.list().await
    }

    async fn settle_request(
        &self,
        id: Uuid,
        settlement: Settlement,
    ) -> EngineResult<BountyRequest> {
        self.requests.settle(id, settlement).await
    }
}
