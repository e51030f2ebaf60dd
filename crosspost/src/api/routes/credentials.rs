//! Credential management routes.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::auth::ApiKeyIdentity;
use crate::api::server::AppState;
use crate::credentials::{CredentialGrant, Provider};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// RFC 3339 expiry of the returned token.
    pub expires_at: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<Vec<String>>,
    /// Lifetime of the access token, in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub provider_uid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub provider: Provider,
    pub connected: bool,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DisconnectResponse {
    pub provider: Provider,
    pub removed: bool,
}

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Unknown provider: {raw}")))
}

#[utoipa::path(
    get,
    path = "/api/credentials/{provider}/token",
    tag = "credentials",
    params(
        ("provider" = String, Path, description = "Provider name")
    ),
    responses(
        (status = 200, description = "Valid access token", body = TokenResponse),
        (status = 404, description = "Provider not connected", body = crate::api::error::ApiErrorResponse),
        (status = 401, description = "Re-authorization required", body = crate::api::error::ApiErrorResponse),
        (status = 503, description = "Provider unavailable", body = crate::api::error::ApiErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn token(
    identity: ApiKeyIdentity,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    let provider = parse_provider(&provider)?;

    let token = state
        .credential_service
        .token_for_owner(identity.owner_key(), provider)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(TokenResponse {
        access_token: token.token,
        token_type: token.token_type,
        expires_at: token.expires_at.to_rfc3339(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/credentials/{provider}/connect",
    tag = "credentials",
    params(
        ("provider" = String, Path, description = "Provider name")
    ),
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Credential stored", body = ConnectResponse),
        (status = 404, description = "Unknown provider", body = crate::api::error::ApiErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn connect(
    identity: ApiKeyIdentity,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let provider = parse_provider(&provider)?;

    let record = state
        .credential_service
        .connect(
            identity.owner_key(),
            provider,
            CredentialGrant {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                token_type: body.token_type,
                scope: body.scope,
                expires_in: body.expires_in,
                provider_uid: body.provider_uid,
                email: body.email,
            },
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ConnectResponse {
        provider,
        connected: true,
        expires_at: record.expires_at.to_rfc3339(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/credentials/{provider}",
    tag = "credentials",
    params(
        ("provider" = String, Path, description = "Provider name")
    ),
    responses(
        (status = 200, description = "Disconnect result", body = DisconnectResponse)
    ),
    security(("api_key" = []))
)]
pub async fn disconnect(
    identity: ApiKeyIdentity,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<DisconnectResponse>> {
    let provider = parse_provider(&provider)?;

    let removed = state
        .credential_service
        .disconnect(identity.owner_key(), provider)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(DisconnectResponse { provider, removed }))
}
