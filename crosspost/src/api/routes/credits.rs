//! Credit routes: consume and balance.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::auth::ApiKeyIdentity;
use crate::api::server::AppState;
use crate::credits::CreditSource;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsumeRequest {
    /// Credits to debit. Defaults to the model tier's cost, or 1; values
    /// below 1 are clamped up.
    #[serde(default)]
    pub amount: Option<i64>,
    /// Model tier to price the debit by when `amount` is absent. Unknown
    /// tiers price at the default cost.
    #[serde(default)]
    pub model_tier: Option<String>,
    /// Account to debit first. Defaults to the calling key's account.
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConsumeResponse {
    pub source: CreditSource,
    pub remaining: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Sum of all owned account balances plus the wallet balance.
    pub credits: i64,
}

#[utoipa::path(
    post,
    path = "/api/credits/consume",
    tag = "credits",
    request_body = ConsumeRequest,
    responses(
        (status = 200, description = "Credits debited", body = ConsumeResponse),
        (status = 402, description = "Insufficient credits", body = crate::api::error::ApiErrorResponse),
        (status = 403, description = "Account not owned by caller", body = crate::api::error::ApiErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn consume(
    identity: ApiKeyIdentity,
    State(state): State<AppState>,
    Json(body): Json<ConsumeRequest>,
) -> ApiResult<Json<ConsumeResponse>> {
    let preferred = body
        .account_id
        .clone()
        .unwrap_or_else(|| identity.account.id.clone());

    let amount = body
        .amount
        .or_else(|| body.model_tier.as_deref().map(crate::credits::pricing::cost_of))
        .unwrap_or(1);

    let receipt = state
        .ledger
        .consume(identity.owner_key(), amount, Some(&preferred))
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ConsumeResponse {
        source: receipt.source,
        remaining: receipt.remaining,
    }))
}

#[utoipa::path(
    get,
    path = "/api/credits/balance",
    tag = "credits",
    responses(
        (status = 200, description = "Total credit balance", body = BalanceResponse)
    ),
    security(("api_key" = []))
)]
pub async fn balance(
    identity: ApiKeyIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<BalanceResponse>> {
    let credits = state
        .ledger
        .balance(identity.owner_key())
        .await
        .map_err(ApiError::from)?;

    Ok(Json(BalanceResponse { credits }))
}
