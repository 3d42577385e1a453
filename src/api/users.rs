//! Endpoints scoped to the authenticated caller

use axum::{extract::State, routing::get, Json, Router};

use super::{ApiResult, ApiState, AuthCaller};
use crate::models::{Resource, UserSummary};

async fn wallet(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<UserSummary>> {
    Ok(Json(state.engine.get_wallet(&caller).await?))
}

async fn favorites(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.list_favorites(&caller).await?))
}

async fn downloads(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.list_downloads(&caller).await?))
}

async fn uploads(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.list_my_uploads(&caller).await?))
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/wallet", get(wallet))
        .route("/favorites", get(favorites))
        .route("/downloads", get(downloads))
        .route("/uploads", get(uploads))
}
