//! Moderation state machine and reports
//!
//! `pending -> approved` credits the uploader; `pending -> rejected` stores the
//! reason. Both targets are terminal, so a second audit is an
//! `InvalidTransition` and can never pay out twice.

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{AdminToken, Caller, Engine};
use crate::error::{EngineError, EngineResult};
use crate::models::{NewReport, Report, ReportStatus, Resource, ResourceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AuditDecision {
    Approve,
    Reject { reason: String },
}

impl Engine {
    /// Moderation queue
    pub async fn list_pending(&self, _token: &AdminToken) -> EngineResult<Vec<Resource>> {
        self.store.list_by_status(ResourceStatus::Pending).await
    }

    pub async fn audit_resource(
        &self,
        token: &AdminToken,
        resource_id: Uuid,
        decision: AuditDecision,
    ) -> EngineResult<Resource> {
        let (to, reason, reward) = match decision {
            AuditDecision::Approve => (ResourceStatus::Approved, None, self.config.approval_reward),
            AuditDecision::Reject { reason } => {
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    return Err(EngineError::validation("reject reason is required"));
                }
                (ResourceStatus::Rejected, Some(reason), 0)
            }
        };

        let resource = self
            .store
            .transition_resource(resource_id, to, reason, reward)
            .await?;

        info!(
            resource_id = %resource_id,
            status = %resource.status,
            admin_id = %token.admin_id(),
            uploader_id = %resource.uploader_id,
            reward = reward,
            "Resource audited"
        );
        Ok(resource)
    }

    pub async fn report_resource(
        &self,
        caller: &Caller,
        resource_id: Uuid,
        reason: &str,
    ) -> EngineResult<Report> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("report reason is required"));
        }
        self.visible_resource(Some(caller), resource_id).await?;

        let report = self
            .store
            .insert_report(NewReport {
                user_id: caller.user_id,
                resource_id,
                reason: reason.to_string(),
            })
            .await?;
        info!(report_id = %report.id, resource_id = %resource_id, "Resource reported");
        Ok(report)
    }

    pub async fn list_reports(&self, _token: &AdminToken) -> EngineResult<Vec<Report>> {
        self.store.list_reports(ReportStatus::Pending).await
    }

    pub async fn resolve_report(&self, token: &AdminToken, report_id: Uuid) -> EngineResult<Report> {
        let report = self.store.resolve_report(report_id).await?;
        info!(report_id = %report_id, admin_id = %token.admin_id(), "Report resolved");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_approve_credits_uploader_once() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let token = admin().require_admin().unwrap();

        let r = engine
            .submit_resource(&alice, upload("notes", "x.pdf", b"bytes"))
            .await
            .unwrap();
        assert_eq!(engine.list_pending(&token).await.unwrap().len(), 1);

        let approved = engine
            .audit_resource(&token, r.id, AuditDecision::Approve)
            .await
            .unwrap();
        assert_eq!(approved.status, ResourceStatus::Approved);
        assert_eq!(engine.get_wallet(&alice).await.unwrap().points, 10);
        assert!(engine.list_pending(&token).await.unwrap().is_empty());

        let err = engine
            .audit_resource(&token, r.id, AuditDecision::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(engine.get_wallet(&alice).await.unwrap().points, 10);
    }

    #[tokio::test]
    async fn test_reject_stores_reason_without_reward() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let token = admin().require_admin().unwrap();

        let r = engine
            .submit_resource(&alice, upload("spam", "x.txt", b"spam"))
            .await
            .unwrap();

        let err = engine
            .audit_resource(&token, r.id, AuditDecision::Reject { reason: " ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let rejected = engine
            .audit_resource(
                &token,
                r.id,
                AuditDecision::Reject {
                    reason: "off topic".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ResourceStatus::Rejected);
        assert_eq!(rejected.reject_reason.as_deref(), Some("off topic"));
        assert_eq!(engine.get_wallet(&alice).await.unwrap().points, 0);

        // Terminal
        assert!(engine
            .audit_resource(&token, r.id, AuditDecision::Approve)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_audit_unknown_resource() {
        let engine = engine();
        let token = admin().require_admin().unwrap();
        assert!(matches!(
            engine
                .audit_resource(&token, Uuid::new_v4(), AuditDecision::Approve)
                .await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let engine = engine();
        let alice = user(&engine, "alice").await;
        let bob = user(&engine, "bob").await;
        let token = admin().require_admin().unwrap();

        let r = approved(&engine, &alice, upload("notes", "x.pdf", b"bytes")).await;

        assert!(matches!(
            engine.report_resource(&bob, r.id, "").await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.report_resource(&bob, Uuid::new_v4(), "broken").await,
            Err(EngineError::NotFound(_))
        ));

        let report = engine.report_resource(&bob, r.id, "broken link").await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(engine.list_reports(&token).await.unwrap().len(), 1);

        let resolved = engine.resolve_report(&token, report.id).await.unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert!(engine.list_reports(&token).await.unwrap().is_empty());

        assert!(matches!(
            engine.resolve_report(&token, report.id).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_decision_deserializes() {
        let d: AuditDecision =
            serde_json::from_str(r#"{"action":"reject","reason":"dup"}"#).unwrap();
        assert_eq!(
            d,
            AuditDecision::Reject {
                reason: "dup".to_string()
            }
        );
        let d: AuditDecision = serde_json::from_str(r#"{"action":"approve"}"#).unwrap();
        assert_eq!(d, AuditDecision::Approve);
    }
}
