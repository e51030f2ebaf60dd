//! Media resolution route.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::auth::ApiKeyIdentity;
use crate::api::server::AppState;
use crate::media::MediaType;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub url: String,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResolveResponse {
    pub canonical_url: String,
}

#[utoipa::path(
    post,
    path = "/api/media/resolve",
    tag = "media",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Canonical URL for the content", body = ResolveResponse),
        (status = 502, description = "Download or rehost failed", body = crate::api::error::ApiErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn resolve(
    _identity: ApiKeyIdentity,
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    let canonical_url = state
        .media
        .get_consistent_url(&body.url, body.media_type)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ResolveResponse { canonical_url }))
}
