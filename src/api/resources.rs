//! Resource endpoints
//!
//! Browsing and downloads are open to anonymous callers; pending and rejected
//! resources only resolve for their uploader and admins.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult, ApiState, AuthCaller, MaybeCaller};
use crate::engine::{Download, Payload, ResourceDetail, ResourceMetadata, Submission};
use crate::error::EngineError;
use crate::models::{
    FavoriteToggle, LearningProgress, Report, Resource, ResourceQuery, Review, TagCount,
};

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub score: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: Review,
    pub resource: Resource,
}

#[derive(Debug, Deserialize)]
pub struct ReportBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    pub progress: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    pub resource_id: Uuid,
    pub favorited: bool,
}

impl FavoriteResponse {
    fn new(resource_id: Uuid, favorited: bool) -> Self {
        Self {
            resource_id,
            favorited,
        }
    }
}

fn bad_multipart(e: impl std::fmt::Display) -> ApiError {
    ApiError(EngineError::validation(format!("invalid multipart body: {}", e)))
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Read the upload form: metadata text fields plus either `file` or `externalLink`
async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut metadata = ResourceMetadata::default();
    let mut external_link = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(bad_multipart)?;
            file = Some(Payload::Upload {
                file_name,
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let value = field.text().await.map_err(bad_multipart)?;
        match name.as_str() {
            "title" => metadata.title = value,
            "description" => metadata.description = value,
            "type" => metadata.resource_type = value,
            "vendor" => metadata.vendor = value,
            "deviceModel" => metadata.device_model = value,
            "protocol" => metadata.protocol = value,
            "scenario" => metadata.scenario = value,
            "tags" => metadata.tags = value,
            "version" => metadata.version = optional(value),
            "externalLink" => external_link = optional(value),
            "parentId" => {
                metadata.parent_id = optional(value)
                    .map(|v| {
                        v.parse::<Uuid>().map_err(|_| {
                            ApiError(EngineError::validation(format!("invalid parentId: {}", v)))
                        })
                    })
                    .transpose()?;
            }
            _ => {}
        }
    }

    Ok(Submission {
        metadata,
        payload: choose_payload(file, external_link)?,
    })
}

/// A non-empty `externalLink` takes precedence; an attached file is then
/// discarded unstored.
fn choose_payload(file: Option<Payload>, external_link: Option<String>) -> ApiResult<Payload> {
    match (external_link, file) {
        (Some(url), _) => Ok(Payload::Link { url }),
        (None, Some(upload)) => Ok(upload),
        (None, None) => Err(ApiError(EngineError::validation(
            "either a file or an externalLink is required",
        ))),
    }
}

async fn list_resources(
    State(state): State<ApiState>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.list_resources(&query).await?))
}

async fn create_resource(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Resource>)> {
    let submission = read_submission(multipart).await?;
    let resource = state.engine.submit_resource(&caller, submission).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn popular_tags(State(state): State<ApiState>) -> ApiResult<Json<Vec<TagCount>>> {
    Ok(Json(state.engine.popular_tags().await?))
}

async fn get_resource(
    State(state): State<ApiState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ResourceDetail>> {
    Ok(Json(state.engine.get_resource(caller.as_ref(), id).await?))
}

async fn get_versions(
    State(state): State<ApiState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.get_versions(caller.as_ref(), id).await?))
}

async fn get_recommendations(
    State(state): State<ApiState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.engine.recommend(caller.as_ref(), id).await?))
}

async fn list_reviews(
    State(state): State<ApiState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.engine.list_reviews(caller.as_ref(), id).await?))
}

async fn submit_review(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<(StatusCode, Json<ReviewResponse>)> {
    let (review, resource) = state
        .engine
        .submit_review(&caller, id, body.score, &body.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse { review, resource })))
}

async fn favorite_status(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FavoriteResponse>> {
    let favorited = state.engine.is_favorite(&caller, id).await?;
    Ok(Json(FavoriteResponse::new(id, favorited)))
}

async fn toggle_favorite(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FavoriteResponse>> {
    let outcome = state.engine.toggle_favorite(&caller, id).await?;
    Ok(Json(FavoriteResponse::new(
        id,
        outcome == FavoriteToggle::Added,
    )))
}

async fn report_resource(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<ReportBody>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let report = state
        .engine
        .report_resource(&caller, id, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `attachment` disposition with a header-safe file name
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn download(
    State(state): State<ApiState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let response = match state.engine.download(caller.as_ref(), id).await? {
        Download::Link { url } => Redirect::temporary(&url).into_response(),
        Download::File {
            file_name,
            content_type,
            data,
        } => {
            let content_type = content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
                ],
                data,
            )
                .into_response()
        }
    };
    Ok(response)
}

async fn get_progress(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LearningProgress>> {
    Ok(Json(state.engine.get_progress(&caller, id).await?))
}

async fn update_progress(
    State(state): State<ApiState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<ProgressBody>,
) -> ApiResult<Json<LearningProgress>> {
    Ok(Json(
        state
            .engine
            .update_progress(&caller, id, body.progress)
            .await?,
    ))
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/", get(list_resources).post(create_resource))
        .route("/tags/popular", get(popular_tags))
        .route("/{id}", get(get_resource))
        .route("/{id}/versions", get(get_versions))
        .route("/{id}/recommendations", get(get_recommendations))
        .route("/{id}/reviews", get(list_reviews).post(submit_review))
        .route("/{id}/favorite", get(favorite_status).post(toggle_favorite))
        .route("/{id}/report", post(report_resource))
        .route("/{id}/download", get(download))
        .route("/{id}/progress", get(get_progress).post(update_progress))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let value = content_disposition("my \"lab\".pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"my _lab_.pdf\""
        );
    }

    #[test]
    fn test_external_link_takes_precedence_over_file() {
        let file = || {
            Some(Payload::Upload {
                file_name: "lab.pkt".into(),
                content_type: None,
                data: b"bytes".to_vec(),
            })
        };

        match choose_payload(file(), Some("https://example.com/lab".into())).unwrap() {
            Payload::Link { url } => assert_eq!(url, "https://example.com/lab"),
            other => panic!("expected link, got {:?}", other),
        }
        assert!(matches!(
            choose_payload(file(), None).unwrap(),
            Payload::Upload { .. }
        ));
        assert!(choose_payload(None, None).is_err());
    }

    #[test]
    fn test_optional_field() {
        assert_eq!(optional("  ".to_string()), None);
        assert_eq!(optional(" v2 ".to_string()), Some("v2".to_string()));
    }
}
