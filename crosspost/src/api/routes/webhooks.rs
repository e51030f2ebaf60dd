//! Inbound payment webhook route.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::billing::Outcome;

/// Header carrying the `t=...,v1=...` signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/webhooks/payment",
    tag = "webhooks",
    request_body = String,
    responses(
        (status = 200, description = "Event handled (credited, skipped, or ignored)", body = WebhookResponse),
        (status = 400, description = "Invalid signature or malformed event", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Grant failed; provider should redeliver", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing signature header"))?;

    let outcome = state
        .reconciler
        .process(signature, &body)
        .await
        .map_err(ApiError::from)?;

    let response = match outcome {
        Outcome::Credited { credits } => WebhookResponse {
            status: "credited".to_string(),
            credits: Some(credits),
        },
        Outcome::Skipped => WebhookResponse {
            status: "skipped".to_string(),
            credits: None,
        },
        Outcome::Ignored => WebhookResponse {
            status: "ignored".to_string(),
            credits: None,
        },
    };

    Ok(Json(response))
}
