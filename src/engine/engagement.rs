//! Browsing, downloads, favorites, tags and learning progress

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    split_tags, FavoriteToggle, LearningProgress, Resource, ResourceQuery, TagCount, UserSummary,
};

/// A resource with its uploader's public profile
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetail {
    #[serde(flatten)]
    pub resource: Resource,
    pub uploader: Option<UserSummary>,
}

#[derive(Debug, Clone)]
pub enum Download {
    File {
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
    Link { url: String },
}

/// Count trimmed, non-empty comma-separated tags; highest count first, ties
/// alphabetical.
pub fn count_tags<'a>(tag_strings: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<TagCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for tags in tag_strings {
        for tag in split_tags(tags) {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(limit);
    ranked
}

fn visible_to(caller: &Caller, resources: Vec<Resource>) -> Vec<Resource> {
    resources
        .into_iter()
        .filter(|r| r.is_public() || caller.can_see(r))
        .collect()
}

impl Engine {
    pub async fn get_resource(
        &self,
        caller: Option<&Caller>,
        resource_id: Uuid,
    ) -> EngineResult<ResourceDetail> {
        let resource = self.visible_resource(caller, resource_id).await?;
        let uploader = self
            .store
            .get_user(resource.uploader_id)
            .await?
            .map(|u| u.summary());
        Ok(ResourceDetail { resource, uploader })
    }

    /// Public feed: approved resources only
    pub async fn list_resources(&self, query: &ResourceQuery) -> EngineResult<Vec<Resource>> {
        let limit = query.limit_or(self.config.default_page_size);
        self.store.list_resources(query, limit).await
    }

    /// `[current, parent, approved children...]`, one hop each way
    pub async fn get_versions(
        &self,
        caller: Option<&Caller>,
        resource_id: Uuid,
    ) -> EngineResult<Vec<Resource>> {
        let current = self.visible_resource(caller, resource_id).await?;

        let parent = match current.parent_id {
            Some(parent_id) => self.store.get_resource(parent_id).await?,
            None => None,
        };
        let children = self.store.list_approved_children(current.id).await?;

        let mut versions = Vec::with_capacity(2 + children.len());
        versions.push(current);
        versions.extend(parent);
        versions.extend(children);
        Ok(versions)
    }

    /// Every resource the caller uploaded, whatever its status
    pub async fn list_my_uploads(&self, caller: &Caller) -> EngineResult<Vec<Resource>> {
        self.store.list_by_uploader(caller.user_id).await
    }

    /// Count the download, log it for authenticated callers, and hand back the
    /// content. Counting and logging never fail the download itself.
    pub async fn download(
        &self,
        caller: Option<&Caller>,
        resource_id: Uuid,
    ) -> EngineResult<Download> {
        let resource = self.visible_resource(caller, resource_id).await?;

        let download = match (&resource.file_path, &resource.external_link) {
            (Some(content_ref), _) => Download::File {
                file_name: resource
                    .file_name
                    .clone()
                    .unwrap_or_else(|| content_ref.clone()),
                content_type: resource.content_type.clone(),
                data: self.content.retrieve(content_ref).await?,
            },
            (None, Some(url)) => Download::Link { url: url.clone() },
            (None, None) => {
                return Err(EngineError::StorageFailure(format!(
                    "resource {} has no content",
                    resource_id
                )))
            }
        };

        if let Err(e) = self.store.increment_download_count(resource_id).await {
            warn!(resource_id = %resource_id, error = %e, "Failed to count download");
        }
        if let Some(caller) = caller {
            if let Err(e) = self.store.append_download_log(caller.user_id, resource_id).await {
                warn!(
                    resource_id = %resource_id,
                    user_id = %caller.user_id,
                    error = %e,
                    "Failed to log download"
                );
            }
        }

        debug!(resource_id = %resource_id, "Download served");
        Ok(download)
    }

    pub async fn toggle_favorite(
        &self,
        caller: &Caller,
        resource_id: Uuid,
    ) -> EngineResult<FavoriteToggle> {
        self.visible_resource(Some(caller), resource_id).await?;
        let outcome = self.store.toggle_favorite(caller.user_id, resource_id).await?;
        debug!(user_id = %caller.user_id, resource_id = %resource_id, outcome = ?outcome, "Favorite toggled");
        Ok(outcome)
    }

    pub async fn is_favorite(&self, caller: &Caller, resource_id: Uuid) -> EngineResult<bool> {
        self.store.is_favorite(caller.user_id, resource_id).await
    }

    /// Favorited resources the caller can see
    pub async fn list_favorites(&self, caller: &Caller) -> EngineResult<Vec<Resource>> {
        let ids = self.store.favorite_resource_ids(caller.user_id).await?;
        let resources = self.store.list_by_ids(&ids).await?;
        Ok(visible_to(caller, resources))
    }

    /// Downloaded resources, each once, most recent download first
    pub async fn list_downloads(&self, caller: &Caller) -> EngineResult<Vec<Resource>> {
        let ids = self.store.downloaded_resource_ids(caller.user_id).await?;
        let resources = self.store.list_by_ids(&ids).await?;
        Ok(visible_to(caller, resources))
    }

    /// Most used tags across approved resources
    pub async fn popular_tags(&self) -> EngineResult<Vec<TagCount>> {
        let tag_strings = self.store.approved_tag_strings().await?;
        Ok(count_tags(
            tag_strings.iter().map(String::as_str),
            self.config.popular_tag_limit,
        ))
    }

    pub async fn update_progress(
        &self,
        caller: &Caller,
        resource_id: Uuid,
        progress: i32,
    ) -> EngineResult<LearningProgress> {
        if !(0..=100).contains(&progress) {
            return Err(EngineError::validation(format!(
                "progress must be between 0 and 100, got {}",
                progress
            )));
        }
        self.visible_resource(Some(caller), resource_id).await?;
        self.store
            .upsert_progress(caller.user_id, resource_id, progress)
            .await
    }

    pub async fn get_progress(
        &self,
        caller: &Caller,
        resource_id: Uuid,
    ) -> EngineResult<LearningProgress> {
        Ok(self
            .store
            .get_progress(caller.user_id, resource_id)
            .await?
            .unwrap_or_else(|| LearningProgress::untouched(caller.user_id, resource_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::engine::{Payload, Submission};
    use crate::models::{ProgressStatus, SortOrder};

    #[test]
    fn test_count_tags() {
        let tags = count_tags(["ospf, bgp", " bgp ,lab,,", "bgp", ""], 30);
        assert_eq!(tags[0], TagCount { tag: "bgp".into(), count: 3 });
        assert_eq!(tags[1], TagCount { tag: "lab".into(), count: 1 });
        assert_eq!(tags[2], TagCount { tag: "ospf".into(), count: 1 });
        assert_eq!(tags.len(), 3);

        assert_eq!(count_tags(["a,b,c"], 2).len(), 2);
    }

    #[tokio::test]
    async fn test_popular_tags_only_count_approved() {
        let engine = engine();
        let alice = user(&engine, "alice").await;

        approved(&engine, &alice, upload("one", "a.pdf", b"a")).await;
        let mut pending = upload("two", "b.pdf", b"b");
        pending.metadata.tags = "secret, ospf".into();
        engine.submit_resource(&alice, pending).await.unwrap();

        let tags = engine.popular_tags().await.unwrap();
        assert!(tags.iter().all(|t| t.tag != "secret"));
        assert_eq!(tags.iter().find(|t| t.tag == "ospf").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_download_counts_and_logs() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let bob = user(&engine, "bob").await;
        let r = approved(&engine, &alice, upload("cap", "lab.pcap", b"\xd4\xc3\xb2\xa1")).await;

        match engine.download(Some(&bob), r.id).await.unwrap() {
            Download::File { file_name, data, .. } => {
                assert_eq!(file_name, "lab.pcap");
                assert_eq!(data, b"\xd4\xc3\xb2\xa1");
            }
            other => panic!("expected file, got {:?}", other),
        }
        engine.download(None, r.id).await.unwrap();
        engine.download(Some(&bob), r.id).await.unwrap();

        let detail = engine.get_resource(None, r.id).await.unwrap();
        assert_eq!(detail.resource.download_count, 3);
        assert_eq!(detail.uploader.unwrap().points, 10);

        let downloads = engine.list_downloads(&bob).await.unwrap();
        assert_eq!(downloads.len(), 1);
        assert!(engine.list_downloads(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_link_and_hidden_pending() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let bob = user(&engine, "bob").await;

        let link = engine
            .submit_resource(
                &alice,
                Submission {
                    metadata: metadata("guide"),
                    payload: Payload::Link {
                        url: "https://example.com/guide.pdf".into(),
                    },
                },
            )
            .await
            .unwrap();

        // Pending: visible to the uploader only
        assert!(matches!(
            engine.download(Some(&bob), link.id).await,
            Err(EngineError::NotFound(_))
        ));
        match engine.download(Some(&alice), link.id).await.unwrap() {
            Download::Link { url } => assert_eq!(url, "https://example.com/guide.pdf"),
            other => panic!("expected link, got {:?}", other),
        }
        assert!(matches!(
            engine.download(None, Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_favorite_toggle_parity() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let r = approved(&engine, &alice, upload("notes", "x.pdf", b"x")).await;

        assert_eq!(engine.toggle_favorite(&alice, r.id).await.unwrap(), FavoriteToggle::Added);
        assert_eq!(engine.list_favorites(&alice).await.unwrap().len(), 1);
        assert_eq!(engine.toggle_favorite(&alice, r.id).await.unwrap(), FavoriteToggle::Removed);
        assert!(!engine.is_favorite(&alice, r.id).await.unwrap());

        assert!(matches!(
            engine.toggle_favorite(&alice, Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_resource_hidden_from_engagement() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let bob = user(&engine, "bob").await;
        let pending = engine
            .submit_resource(&alice, upload("draft", "d.pdf", b"draft"))
            .await
            .unwrap();

        for result in [
            engine.toggle_favorite(&bob, pending.id).await.map(|_| ()),
            engine.update_progress(&bob, pending.id, 50).await.map(|_| ()),
            engine.report_resource(&bob, pending.id, "spam").await.map(|_| ()),
            engine.list_reviews(Some(&bob), pending.id).await.map(|_| ()),
            engine.recommend(None, pending.id).await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(EngineError::NotFound(_))));
        }
        assert!(engine.list_favorites(&bob).await.unwrap().is_empty());

        // The uploader still engages with their own draft
        engine.toggle_favorite(&alice, pending.id).await.unwrap();
        assert_eq!(engine.list_favorites(&alice).await.unwrap()[0].id, pending.id);
        assert!(engine.list_reviews(Some(&alice), pending.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engagement_lists_skip_hidden_rows() {
        let engine = engine();
        let moderator = admin();
        let alice = user(&engine, "alice").await;
        let bob = user(&engine, "bob").await;
        let pending = engine
            .submit_resource(&alice, upload("draft", "d.pdf", b"draft"))
            .await
            .unwrap();

        // Rows written straight to the store, bypassing the visibility check
        for caller in [&bob, &moderator] {
            engine
                .store()
                .toggle_favorite(caller.user_id, pending.id)
                .await
                .unwrap();
            engine
                .store()
                .append_download_log(caller.user_id, pending.id)
                .await
                .unwrap();
        }

        assert!(engine.list_favorites(&bob).await.unwrap().is_empty());
        assert!(engine.list_downloads(&bob).await.unwrap().is_empty());
        assert_eq!(engine.list_favorites(&moderator).await.unwrap().len(), 1);
        assert_eq!(engine.list_downloads(&moderator).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versions_one_hop() {
        let engine = engine();
        let alice = user(&engine, "alice").await;

        let v1 = approved(&engine, &alice, upload("v1", "lab.pkt", b"1")).await;
        let mut s2 = upload("v2", "lab.pkt", b"2");
        s2.metadata.parent_id = Some(v1.id);
        let v2 = approved(&engine, &alice, s2).await;
        let mut s3 = upload("v3", "lab.pkt", b"3");
        s3.metadata.parent_id = Some(v2.id);
        let v3 = approved(&engine, &alice, s3).await;
        let mut s3b = upload("v3-draft", "lab.pkt", b"3b");
        s3b.metadata.parent_id = Some(v2.id);
        engine.submit_resource(&alice, s3b).await.unwrap();

        let ids: Vec<_> = engine
            .get_versions(None, v2.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![v2.id, v1.id, v3.id]);
    }

    #[tokio::test]
    async fn test_listing_filters_and_pagination() {
        let engine = engine();
        let alice = user(&engine, "alice").await;

        let a = approved(&engine, &alice, upload("OSPF area design", "a.pdf", b"a")).await;
        let mut s = upload("BGP route reflectors", "b.pdf", b"b");
        s.metadata.vendor = "Juniper".into();
        s.metadata.tags = "bgp".into();
        let b = approved(&engine, &alice, s).await;
        engine
            .submit_resource(&alice, upload("pending OSPF", "c.pdf", b"c"))
            .await
            .unwrap();

        let all = engine.list_resources(&ResourceQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let q = ResourceQuery {
            vendor: Some("juni".into()),
            ..Default::default()
        };
        assert_eq!(engine.list_resources(&q).await.unwrap()[0].id, b.id);

        let q = ResourceQuery {
            search: Some("ospf design".into()),
            ..Default::default()
        };
        let found = engine.list_resources(&q).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        engine.download(None, a.id).await.unwrap();
        let q = ResourceQuery {
            sort: SortOrder::Downloads,
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(engine.list_resources(&q).await.unwrap()[0].id, a.id);

        let q = ResourceQuery {
            offset: Some(5),
            ..Default::default()
        };
        assert!(engine.list_resources(&q).await.unwrap().is_empty());

        assert_eq!(engine.list_my_uploads(&alice).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_learning_progress() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let r = approved(&engine, &alice, upload("course", "c.mp4", b"video")).await;

        let untouched = engine.get_progress(&alice, r.id).await.unwrap();
        assert_eq!(untouched.progress, 0);
        assert_eq!(untouched.status, ProgressStatus::Started);

        engine.update_progress(&alice, r.id, 40).await.unwrap();
        let done = engine.update_progress(&alice, r.id, 100).await.unwrap();
        assert_eq!(done.status, ProgressStatus::Completed);
        assert_eq!(engine.get_progress(&alice, r.id).await.unwrap().progress, 100);

        assert!(matches!(
            engine.update_progress(&alice, r.id, 101).await,
            Err(EngineError::Validation(_))
        ));
    }
}
