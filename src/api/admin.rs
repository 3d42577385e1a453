//! Administration endpoints: moderation queue, reports, user provisioning

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, ApiState, AuthCaller};
use crate::engine::AuditDecision;
use crate::models::{NewUser, Report, Resource, Role, User, UserSummary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionUserBody {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPointsBody {
    pub amount: i64,
}

async fn list_pending(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<Vec<Resource>>> {
    let token = caller.require_admin()?;
    Ok(Json(state.engine.list_pending(&token).await?))
}

/// Body is `{"action":"approve"}` or `{"action":"reject","reason":"..."}`
async fn audit_resource(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(decision): Json<AuditDecision>,
) -> ApiResult<Json<Resource>> {
    let token = caller.require_admin()?;
    Ok(Json(state.engine.audit_resource(&token, id, decision).await?))
}

async fn list_reports(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<Vec<Report>>> {
    let token = caller.require_admin()?;
    Ok(Json(state.engine.list_reports(&token).await?))
}

async fn resolve_report(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    let token = caller.require_admin()?;
    Ok(Json(state.engine.resolve_report(&token, id).await?))
}

async fn provision_user(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Json(body): Json<ProvisionUserBody>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let token = caller.require_admin()?;
    let new_user = NewUser {
        email: body.email.trim().to_string(),
        display_name: body.display_name.trim().to_string(),
        role: body.role.unwrap_or(Role::User),
    };
    let user = state.engine.provision_user(&token, new_user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn grant_points(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<GrantPointsBody>,
) -> ApiResult<Json<UserSummary>> {
    let token = caller.require_admin()?;
    Ok(Json(state.engine.grant_points(&token, id, body.amount).await?))
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/pending", get(list_pending))
        .route("/resources/{id}/audit", post(audit_resource))
        .route("/reports", get(list_reports))
        .route("/reports/{id}/resolve", post(resolve_report))
        .route("/users", post(provision_user))
        .route("/users/{id}/points", post(grant_points))
}
