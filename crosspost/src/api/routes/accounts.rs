//! Account provisioning route (admin-only).

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    pub owner_key: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateAccountResponse {
    /// The account id, which doubles as the API key.
    pub account_id: String,
    pub owner_key: String,
    pub balance: i64,
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::service_unavailable(
            "Account provisioning is not enabled",
        ));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::unauthorized("Admin token required")),
    }
}

#[utoipa::path(
    post,
    path = "/api/accounts",
    tag = "accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Account created with the signup grant", body = CreateAccountResponse),
        (status = 401, description = "Admin token required", body = crate::api::error::ApiErrorResponse),
        (status = 503, description = "Provisioning disabled", body = crate::api::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateAccountRequest>,
) -> ApiResult<Json<CreateAccountResponse>> {
    require_admin(&state, &headers)?;

    if body.owner_key.trim().is_empty() {
        return Err(ApiError::validation("owner_key must not be empty"));
    }

    let account = state
        .ledger
        .create_account(body.owner_key.trim(), state.signup_grant)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(CreateAccountResponse {
        account_id: account.id,
        owner_key: account.owner_key,
        balance: account.balance,
    }))
}
