//! Bounty request endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::{ApiResult, ApiState, AuthCaller};
use crate::engine::RequestDraft;
use crate::models::{BountyRequest, Settlement};

async fn list_requests(State(state): State<ApiState>) -> ApiResult<Json<Vec<BountyRequest>>> {
    Ok(Json(state.engine.list_requests().await?))
}

async fn create_request(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Json(draft): Json<RequestDraft>,
) -> ApiResult<(StatusCode, Json<BountyRequest>)> {
    let request = state.engine.create_request(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BountyRequest>> {
    Ok(Json(state.engine.get_request(id).await?))
}

/// Body is `{"action":"fulfill","fulfillerId":...}` or `{"action":"close"}`
async fn settle_request(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(settlement): Json<Settlement>,
) -> ApiResult<Json<BountyRequest>> {
    Ok(Json(
        state.engine.settle_request(&caller, id, settlement).await?,
    ))
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/{id}", get(get_request))
        .route("/{id}/settle", post(settle_request))
}
