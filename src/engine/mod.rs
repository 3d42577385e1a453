//! Resource lifecycle and reputation engine
//!
//! ## Architecture
//!
//! ```text
//!   Caller ──► Engine ──┬──► Store            (users, resources, reviews, ...)
//!                       ├──► ContentStore     (uploaded bytes)
//!                       └──► MalwareScanner   (optional, NoOp fallback)
//! ```
//!
//! The engine holds no mutable state of its own. Every invariant that spans
//! more than one row is delegated to a single `Store` call, which runs it as
//! one unit of work.
//!
//! Admin-only operations take an [`AdminToken`], which can only be obtained
//! from a [`Caller`] whose role is `admin`.

mod bounty;
mod engagement;
mod ingestion;
mod moderation;
mod rating;
mod wallet;

pub use bounty::RequestDraft;
pub use engagement::{count_tags, Download, ResourceDetail};
pub use ingestion::{
    file_extension, fingerprint, Payload, ResourceMetadata, Submission, ALLOWED_EXTENSIONS,
};
pub use moderation::AuditDecision;

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::Store;
use crate::error::{EngineError, EngineResult};
use crate::models::{Resource, Role, User};
use crate::scanner::MalwareScanner;
use crate::storage::ContentStore;

pub const DEFAULT_APPROVAL_REWARD: i64 = 10;
pub const DEFAULT_REVIEW_REWARD: i64 = 2;
pub const DEFAULT_POPULAR_TAG_LIMIT: usize = 30;
pub const DEFAULT_RECOMMENDATION_LIMIT: i64 = 5;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Economy and limits
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Credited to the uploader when a resource is approved
    pub approval_reward: i64,
    /// Credited to the reviewer for every review
    pub review_reward: i64,
    pub popular_tag_limit: usize,
    pub recommendation_limit: i64,
    pub default_page_size: i64,
    pub max_upload_bytes: usize,
    /// Lowercase, with leading dot
    pub allowed_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_reward: DEFAULT_APPROVAL_REWARD,
            review_reward: DEFAULT_REVIEW_REWARD,
            popular_tag_limit: DEFAULT_POPULAR_TAG_LIMIT,
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Authenticated identity handed to the engine by the transport. Trusted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> EngineResult<AdminToken> {
        if self.is_admin() {
            Ok(AdminToken {
                admin_id: self.user_id,
            })
        } else {
            Err(EngineError::Forbidden(format!(
                "user {} is not an administrator",
                self.user_id
            )))
        }
    }

    /// Uploader or admin
    fn can_see(&self, resource: &Resource) -> bool {
        self.is_admin() || resource.uploader_id == self.user_id
    }
}

/// Proof that the caller holds the admin role
#[derive(Debug, Clone, Copy)]
pub struct AdminToken {
    admin_id: Uuid,
}

impl AdminToken {
    pub fn admin_id(&self) -> Uuid {
        self.admin_id
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    content: Arc<dyn ContentStore>,
    scanner: Arc<dyn MalwareScanner>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        content: Arc<dyn ContentStore>,
        scanner: Arc<dyn MalwareScanner>,
        config: EngineConfig,
    ) -> Self {
        info!(
            approval_reward = config.approval_reward,
            review_reward = config.review_reward,
            "Engine initialized"
        );
        Self {
            store,
            content,
            scanner,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn existing_user(&self, id: Uuid) -> EngineResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", id))
    }

    async fn existing_resource(&self, id: Uuid) -> EngineResult<Resource> {
        self.store
            .get_resource(id)
            .await?
            .ok_or_else(|| EngineError::not_found("resource", id))
    }

    /// Approved resources are public; anything else is only visible to its
    /// uploader and to admins, and reads as missing to everyone else.
    async fn visible_resource(&self, caller: Option<&Caller>, id: Uuid) -> EngineResult<Resource> {
        let resource = self.existing_resource(id).await?;
        if resource.is_public() || caller.map(|c| c.can_see(&resource)).unwrap_or(false) {
            Ok(resource)
        } else {
            Err(EngineError::not_found("resource", id))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_admin() {
        let id = Uuid::new_v4();
        assert_eq!(Caller::admin(id).require_admin().unwrap().admin_id(), id);
        assert!(matches!(
            Caller::user(id).require_admin(),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn test_default_economy() {
        let config = EngineConfig::default();
        assert_eq!(config.approval_reward, 10);
        assert_eq!(config.review_reward, 2);
        assert_eq!(config.popular_tag_limit, 30);
        assert!(config.allowed_extensions.iter().any(|e| e == ".pcapng"));
    }
}
