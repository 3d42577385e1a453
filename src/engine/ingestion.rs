//! Ingestion and deduplication
//!
//! Uploads go through: validate -> extension allow-list -> malware scan ->
//! SHA-256 fingerprint -> duplicate check -> content store -> row insert.
//! Nothing is written to the content store until the duplicate check has
//! passed, so a given byte sequence is stored at most once. A failure after
//! the content store write leaves the stored file behind; it is logged, not
//! deleted.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{NewResource, Resource, DEFAULT_VERSION};
use crate::scanner::ScanVerdict;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".pdf", ".docx", ".doc", ".txt", ".md", ".zip", ".rar", ".7z", ".pcap", ".pcapng", ".gns3",
    ".pkt", ".mp4",
];

/// Hex-encoded SHA-256 of the content
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Lowercased extension including the dot, e.g. `".pcapng"`
pub fn file_extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let dot = base.rfind('.')?;
    if dot + 1 == base.len() {
        return None;
    }
    Some(base[dot..].to_ascii_lowercase())
}

/// Descriptive fields supplied with a submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub vendor: String,
    pub device_model: String,
    pub protocol: String,
    pub scenario: String,
    pub tags: String,
    pub parent_id: Option<Uuid>,
    pub version: Option<String>,
}

impl ResourceMetadata {
    fn validate(&self) -> EngineResult<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("title is required"));
        }
        if self.resource_type.trim().is_empty() {
            return Err(EngineError::validation("type is required"));
        }
        Ok(())
    }

    fn version_label(&self) -> String {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION)
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Upload {
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
    /// Reference to content hosted elsewhere; never hashed or stored
    Link { url: String },
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub metadata: ResourceMetadata,
    pub payload: Payload,
}

/// Content fields of the row once the bytes are stored
struct StoredContent {
    content_ref: String,
    file_name: String,
    content_type: Option<String>,
    file_hash: String,
}

impl Engine {
    /// Create a `pending` resource from an upload or an external link
    pub async fn submit_resource(
        &self,
        caller: &Caller,
        submission: Submission,
    ) -> EngineResult<Resource> {
        let Submission { metadata, payload } = submission;
        metadata.validate()?;
        self.existing_user(caller.user_id).await?;

        if let Some(parent_id) = metadata.parent_id {
            self.visible_resource(Some(caller), parent_id).await?;
        }

        let (stored, external_link) = match payload {
            Payload::Link { url } => (None, Some(validate_link(&url)?)),
            Payload::Upload {
                file_name,
                content_type,
                data,
            } => (
                Some(self.ingest_upload(file_name, content_type, data).await?),
                None,
            ),
        };

        let version = metadata.version_label();
        let new = NewResource {
            title: metadata.title.trim().to_string(),
            description: metadata.description,
            resource_type: metadata.resource_type.trim().to_string(),
            vendor: metadata.vendor,
            device_model: metadata.device_model,
            protocol: metadata.protocol,
            scenario: metadata.scenario,
            tags: metadata.tags,
            file_path: stored.as_ref().map(|s| s.content_ref.clone()),
            file_name: stored.as_ref().map(|s| s.file_name.clone()),
            content_type: stored.as_ref().and_then(|s| s.content_type.clone()),
            file_hash: stored.as_ref().map(|s| s.file_hash.clone()),
            external_link,
            parent_id: metadata.parent_id,
            version,
            uploader_id: caller.user_id,
        };

        match self.store.insert_resource(new).await {
            Ok(resource) => {
                info!(
                    resource_id = %resource.id,
                    uploader_id = %caller.user_id,
                    "Resource submitted for review"
                );
                Ok(resource)
            }
            Err(e) => {
                if let Some(stored) = &stored {
                    error!(
                        content_ref = %stored.content_ref,
                        file_hash = %stored.file_hash,
                        error = %e,
                        "Resource row not created; stored content is orphaned"
                    );
                }
                Err(e)
            }
        }
    }

    async fn ingest_upload(
        &self,
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    ) -> EngineResult<StoredContent> {
        if data.is_empty() {
            return Err(EngineError::validation("uploaded file is empty"));
        }
        if data.len() > self.config.max_upload_bytes {
            return Err(EngineError::validation(format!(
                "upload of {} bytes exceeds the {} byte limit",
                data.len(),
                self.config.max_upload_bytes
            )));
        }

        let extension = file_extension(&file_name)
            .filter(|ext| self.config.allowed_extensions.iter().any(|a| a == ext))
            .ok_or_else(|| EngineError::UnsupportedFormat(file_name.clone()))?;

        if let ScanVerdict::Infected { threat } = self.scanner.scan(&data).await? {
            warn!(file_name = %file_name, threat = %threat, "Upload rejected by malware scan");
            return Err(EngineError::MalwareDetected { threat });
        }

        let file_hash = fingerprint(&data);
        if let Some(existing) = self.store.find_by_fingerprint(&file_hash).await? {
            info!(existing_id = %existing.id, "Duplicate upload rejected");
            return Err(EngineError::DuplicateContent {
                existing_id: existing.id,
            });
        }

        let content_ref = self.content.store(&extension, &data).await?;
        Ok(StoredContent {
            content_ref,
            file_name,
            content_type,
            file_hash,
        })
    }
}

fn validate_link(url: &str) -> EngineResult<String> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(EngineError::validation(format!(
            "external link must be an http(s) URL: {}",
            url
        )))
    }
}
