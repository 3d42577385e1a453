//! In-process store
//!
//! Used when PostgreSQL is disabled and by the test suite. A single write lock
//! guards all tables, so every trait method is atomic with respect to every
//! other one.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    BountyRequest, DownloadLog, FavoriteToggle, LearningProgress, NewReport, NewRequest,
    NewResource, NewReview, NewUser, ProgressStatus, Report, ReportStatus, RequestStatus,
    Resource, ResourceQuery, ResourceStatus, Review, Settlement, SortOrder, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    resources: HashMap<Uuid, Resource>,
    /// Insertion order, used as a stable tie-breaker
    resource_order: Vec<Uuid>,
    reviews: Vec<Review>,
    favorites: Vec<(Uuid, Uuid)>,
    download_logs: Vec<DownloadLog>,
    reports: Vec<Report>,
    progress: HashMap<(Uuid, Uuid), LearningProgress>,
    requests: Vec<BountyRequest>,
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> EngineResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("user", id))
    }

    fn credit(&mut self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        let user = self.user_mut(user_id)?;
        user.points += amount;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    fn debit(&mut self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        let user = self.user_mut(user_id)?;
        if user.points < amount {
            return Err(EngineError::InsufficientPoints {
                balance: user.points,
                required: amount,
            });
        }
        user.points -= amount;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    /// Resources newest first, ties broken by later insertion first
    fn resources_newest_first(&self) -> Vec<&Resource> {
        let mut out: Vec<&Resource> = self
            .resource_order
            .iter()
            .rev()
            .filter_map(|id| self.resources.get(id))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> EngineResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(EngineError::validation(format!(
                "email already registered: {}",
                user.email
            )));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            points: 0,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> EngineResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn credit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        self.tables.write().await.credit(user_id, amount)
    }

    async fn debit_points(&self, user_id: Uuid, amount: i64) -> EngineResult<User> {
        self.tables.write().await.debit(user_id, amount)
    }

    async fn find_by_fingerprint(&self, file_hash: &str) -> EngineResult<Option<Resource>> {
        let t = self.tables.read().await;
        Ok(t
            .resources
            .values()
            .find(|r| r.file_hash.as_deref() == Some(file_hash))
            .cloned())
    }

    async fn insert_resource(&self, resource: NewResource) -> EngineResult<Resource> {
        let mut t = self.tables.write().await;
        if let Some(hash) = resource.file_hash.as_deref() {
            if let Some(existing) = t
                .resources
                .values()
                .find(|r| r.file_hash.as_deref() == Some(hash))
            {
                return Err(EngineError::DuplicateContent {
                    existing_id: existing.id,
                });
            }
        }
        let row = Resource::from_new(resource);
        t.resource_order.push(row.id);
        t.resources.insert(row.id, row.clone());
        debug!(resource_id = %row.id, "Resource inserted");
        Ok(row)
    }

    async fn get_resource(&self, id: Uuid) -> EngineResult<Option<Resource>> {
        Ok(self.tables.read().await.resources.get(&id).cloned())
    }

    async fn list_resources(
        &self,
        query: &ResourceQuery,
        limit: i64,
    ) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        let mut matched: Vec<&Resource> = t
            .resources_newest_first()
            .into_iter()
            .filter(|r| r.is_public() && query.matches(r))
            .collect();
        if query.sort == SortOrder::Downloads {
            matched.sort_by(|a, b| b.download_count.cmp(&a.download_count));
        }
        Ok(matched
            .into_iter()
            .skip(query.offset() as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: ResourceStatus) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        Ok(t
            .resources_newest_first()
            .into_iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_uploader(&self, uploader_id: Uuid) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        Ok(t
            .resources_newest_first()
            .into_iter()
            .filter(|r| r.uploader_id == uploader_id)
            .cloned()
            .collect())
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| t.resources.get(id))
            .cloned()
            .collect())
    }

    async fn list_approved_children(&self, parent_id: Uuid) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        Ok(t
            .resource_order
            .iter()
            .filter_map(|id| t.resources.get(id))
            .filter(|r| r.parent_id == Some(parent_id) && r.is_public())
            .cloned()
            .collect())
    }

    async fn list_similar(&self, resource: &Resource, limit: i64) -> EngineResult<Vec<Resource>> {
        let t = self.tables.read().await;
        let mut similar: Vec<&Resource> = t
            .resources_newest_first()
            .into_iter()
            .filter(|r| {
                r.id != resource.id
                    && r.is_public()
                    && (r.vendor == resource.vendor || r.resource_type == resource.resource_type)
            })
            .collect();
        similar.sort_by(|a, b| {
            b.rating_average
                .total_cmp(&a.rating_average)
                .then(b.download_count.cmp(&a.download_count))
        });
        Ok(similar
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn approved_tag_strings(&self) -> EngineResult<Vec<String>> {
        let t = self.tables.read().await;
        Ok(t
            .resources
            .values()
            .filter(|r| r.is_public() && !r.tags.is_empty())
            .map(|r| r.tags.clone())
            .collect())
    }

    async fn transition_resource(
        &self,
        id: Uuid,
        to: ResourceStatus,
        reject_reason: Option<String>,
        uploader_reward: i64,
    ) -> EngineResult<Resource> {
        let mut t = self.tables.write().await;
        let resource = t
            .resources
            .get(&id)
            .ok_or_else(|| EngineError::not_found("resource", id))?;
        if resource.status != ResourceStatus::Pending {
            return Err(EngineError::InvalidTransition {
                from: resource.status.to_string(),
                to: to.to_string(),
            });
        }
        let uploader_id = resource.uploader_id;

        // Credit first so a missing uploader leaves the status untouched
        if to == ResourceStatus::Approved && uploader_reward != 0 {
            t.credit(uploader_id, uploader_reward)?;
        }

        let resource = t
            .resources
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("resource", id))?;
        resource.status = to;
        resource.reject_reason = match to {
            ResourceStatus::Rejected => reject_reason,
            _ => None,
        };
        resource.updated_at = Utc::now();
        Ok(resource.clone())
    }

    async fn increment_download_count(&self, id: Uuid) -> EngineResult<()> {
        let mut t = self.tables.write().await;
        let resource = t
            .resources
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("resource", id))?;
        resource.download_count += 1;
        Ok(())
    }

    async fn record_review(
        &self,
        review: NewReview,
        reviewer_reward: i64,
    ) -> EngineResult<(Review, Resource)> {
        let mut t = self.tables.write().await;
        if !t.resources.contains_key(&review.resource_id) {
            return Err(EngineError::not_found("resource", review.resource_id));
        }
        if !t.users.contains_key(&review.user_id) {
            return Err(EngineError::not_found("user", review.user_id));
        }

        if reviewer_reward != 0 {
            t.credit(review.user_id, reviewer_reward)?;
        }

        let resource = t
            .resources
            .get_mut(&review.resource_id)
            .ok_or_else(|| EngineError::not_found("resource", review.resource_id))?;
        resource.rating_count += 1;
        resource.rating_sum += i64::from(review.score);
        resource.rating_average = resource.rating_sum as f64 / resource.rating_count as f64;
        resource.updated_at = Utc::now();
        let resource = resource.clone();

        let created = Review {
            id: Uuid::new_v4(),
            resource_id: review.resource_id,
            user_id: review.user_id,
            score: review.score,
            comment: review.comment,
            created_at: Utc::now(),
        };
        t.reviews.push(created.clone());
        Ok((created, resource))
    }

    async fn list_reviews(&self, resource_id: Uuid) -> EngineResult<Vec<Review>> {
        let t = self.tables.read().await;
        Ok(t
            .reviews
            .iter()
            .rev()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn toggle_favorite(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<FavoriteToggle> {
        let mut t = self.tables.write().await;
        let key = (user_id, resource_id);
        if let Some(pos) = t.favorites.iter().position(|f| *f == key) {
            t.favorites.remove(pos);
            Ok(FavoriteToggle::Removed)
        } else {
            t.favorites.push(key);
            Ok(FavoriteToggle::Added)
        }
    }

    async fn is_favorite(&self, user_id: Uuid, resource_id: Uuid) -> EngineResult<bool> {
        let t = self.tables.read().await;
        Ok(t.favorites.contains(&(user_id, resource_id)))
    }

    async fn favorite_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        let t = self.tables.read().await;
        Ok(t
            .favorites
            .iter()
            .rev()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn append_download_log(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<DownloadLog> {
        let mut t = self.tables.write().await;
        let log = DownloadLog {
            id: Uuid::new_v4(),
            user_id,
            resource_id,
            created_at: Utc::now(),
        };
        t.download_logs.push(log.clone());
        Ok(log)
    }

    async fn downloaded_resource_ids(&self, user_id: Uuid) -> EngineResult<Vec<Uuid>> {
        let t = self.tables.read().await;
        let mut seen = Vec::new();
        for log in t.download_logs.iter().rev().filter(|l| l.user_id == user_id) {
            if !seen.contains(&log.resource_id) {
                seen.push(log.resource_id);
            }
        }
        Ok(seen)
    }

    async fn insert_report(&self, report: NewReport) -> EngineResult<Report> {
        let mut t = self.tables.write().await;
        let created = Report {
            id: Uuid::new_v4(),
            user_id: report.user_id,
            resource_id: report.resource_id,
            reason: report.reason,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        };
        t.reports.push(created.clone());
        Ok(created)
    }

    async fn list_reports(&self, status: ReportStatus) -> EngineResult<Vec<Report>> {
        let t = self.tables.read().await;
        Ok(t
            .reports
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn resolve_report(&self, id: Uuid) -> EngineResult<Report> {
        let mut t = self.tables.write().await;
        let report = t
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::not_found("report", id))?;
        if report.status == ReportStatus::Resolved {
            return Err(EngineError::InvalidTransition {
                from: ReportStatus::Resolved.to_string(),
                to: ReportStatus::Resolved.to_string(),
            });
        }
        report.status = ReportStatus::Resolved;
        Ok(report.clone())
    }

    async fn upsert_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        progress: i32,
    ) -> EngineResult<LearningProgress> {
        let mut t = self.tables.write().await;
        let entry = LearningProgress {
            user_id,
            resource_id,
            progress,
            status: ProgressStatus::for_progress(progress),
            updated_at: Utc::now(),
        };
        t.progress.insert((user_id, resource_id), entry.clone());
        Ok(entry)
    }

    async fn get_progress(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> EngineResult<Option<LearningProgress>> {
        let t = self.tables.read().await;
        Ok(t.progress.get(&(user_id, resource_id)).cloned())
    }

    async fn create_request_with_escrow(
        &self,
        request: NewRequest,
    ) -> EngineResult<BountyRequest> {
        let mut t = self.tables.write().await;
        if request.bounty > 0 {
            t.debit(request.user_id, request.bounty)?;
        } else if !t.users.contains_key(&request.user_id) {
            return Err(EngineError::not_found("user", request.user_id));
        }
        let created = BountyRequest::from_new(request);
        t.requests.push(created.clone());
        Ok(created)
    }

    async fn get_request(&self, id: Uuid) -> EngineResult<Option<BountyRequest>> {
        let t = self.tables.read().await;
        Ok(t.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list_requests(&self) -> EngineResult<Vec<BountyRequest>> {
        let t = self.tables.read().await;
        Ok(t.requests.iter().rev().cloned().collect())
    }

    async fn settle_request(
        &self,
        id: Uuid,
        settlement: Settlement,
    ) -> EngineResult<BountyRequest> {
        let mut t = self.tables.write().await;
        let request = t
            .requests
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::not_found("request", id))?
            .clone();
        let to = settlement.target_status();
        if request.status != RequestStatus::Open {
            return Err(EngineError::InvalidTransition {
                from: request.status.to_string(),
                to: to.to_string(),
            });
        }

        if request.bounty > 0 {
            t.credit(settlement.beneficiary(request.user_id), request.bounty)?;
        }

        let stored = t
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::not_found("request", id))?;
        stored.status = to;
        if let Settlement::Fulfill { fulfiller_id } = settlement {
            stored.fulfiller_id = Some(fulfiller_id);
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}
