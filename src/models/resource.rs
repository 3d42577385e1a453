//! Shared resource metadata, status and listing filters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_VERSION: &str = "1.0";
pub const MAX_PAGE_SIZE: i64 = 100;

/// Moderation status. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Approved,
    Rejected,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Approved => "approved",
            ResourceStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResourceStatus::Pending)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResourceStatus::Pending),
            "approved" => Ok(ResourceStatus::Approved),
            "rejected" => Ok(ResourceStatus::Rejected),
            other => Err(format!("Unknown resource status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub vendor: String,
    pub device_model: String,
    pub protocol: String,
    pub scenario: String,
    /// Comma-separated free text
    pub tags: String,

    /// Content store reference; `None` for external links
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Hex SHA-256 of the uploaded bytes
    pub file_hash: Option<String>,
    pub external_link: Option<String>,

    pub status: ResourceStatus,
    pub reject_reason: Option<String>,

    pub download_count: i64,
    pub rating_average: f64,
    pub rating_count: i64,
    #[serde(skip)]
    pub rating_sum: i64,

    pub parent_id: Option<Uuid>,
    pub version: String,
    pub uploader_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn is_public(&self) -> bool {
        self.status == ResourceStatus::Approved
    }

    pub fn tag_list(&self) -> Vec<&str> {
        split_tags(&self.tags).collect()
    }

    /// Build a fresh `pending` row from a submission
    pub fn from_new(new: NewResource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            resource_type: new.resource_type,
            vendor: new.vendor,
            device_model: new.device_model,
            protocol: new.protocol,
            scenario: new.scenario,
            tags: new.tags,
            file_path: new.file_path,
            file_name: new.file_name,
            content_type: new.content_type,
            file_hash: new.file_hash,
            external_link: new.external_link,
            status: ResourceStatus::Pending,
            reject_reason: None,
            download_count: 0,
            rating_average: 0.0,
            rating_count: 0,
            rating_sum: 0,
            parent_id: new.parent_id,
            version: new.version,
            uploader_id: new.uploader_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Split a comma-separated tag string into trimmed, non-empty tokens
pub fn split_tags(tags: &str) -> impl Iterator<Item = &str> {
    tags.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Row to insert once ingestion has hashed and stored the content
#[derive(Debug, Clone)]
pub struct NewResource {
    pub title: String,
    pub description: String,
    pub resource_type: String,
    pub vendor: String,
    pub device_model: String,
    pub protocol: String,
    pub scenario: String,
    pub tags: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_hash: Option<String>,
    pub external_link: Option<String>,
    pub parent_id: Option<Uuid>,
    pub version: String,
    pub uploader_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Downloads,
}

/// Public listing filters. Only approved resources are ever listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub vendor: Option<String>,
    pub device: Option<String>,
    pub protocol: Option<String>,
    pub scenario: Option<String>,
    pub tag: Option<String>,
    pub sort: SortOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ResourceQuery {
    pub fn limit_or(&self, default_limit: i64) -> i64 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn search_keywords(&self) -> Vec<&str> {
        non_empty(&self.search)
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn resource_type(&self) -> Option<&str> {
        non_empty(&self.resource_type)
    }

    pub fn vendor(&self) -> Option<&str> {
        non_empty(&self.vendor)
    }

    pub fn device(&self) -> Option<&str> {
        non_empty(&self.device)
    }

    pub fn protocol(&self) -> Option<&str> {
        non_empty(&self.protocol)
    }

    pub fn scenario(&self) -> Option<&str> {
        non_empty(&self.scenario)
    }

    pub fn tag(&self) -> Option<&str> {
        non_empty(&self.tag)
    }

    /// In-process evaluation of the filters (status excluded)
    pub fn matches(&self, r: &Resource) -> bool {
        if let Some(t) = self.resource_type() {
            if r.resource_type != t {
                return false;
            }
        }
        let substring_filters = [
            (self.vendor(), &r.vendor),
            (self.device(), &r.device_model),
            (self.protocol(), &r.protocol),
            (self.scenario(), &r.scenario),
            (self.tag(), &r.tags),
        ];
        for (filter, field) in substring_filters {
            if let Some(f) = filter {
                if !contains_ci(field, f) {
                    return false;
                }
            }
        }
        self.search_keywords().iter().all(|kw| {
            [
                &r.title,
                &r.description,
                &r.tags,
                &r.vendor,
                &r.device_model,
            ]
            .iter()
            .any(|field| contains_ci(field, kw))
        })
    }
}
