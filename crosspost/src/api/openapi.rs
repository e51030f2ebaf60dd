//! OpenAPI document assembly.

use axum::Json;
use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

use crate::api::error::ApiErrorResponse;
use crate::api::routes;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
            );
            components.add_security_scheme(
                "admin_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "crosspost API",
        description = "Multi-platform content publishing backend"
    ),
    paths(
        routes::health::ping,
        routes::accounts::create,
        routes::credits::consume,
        routes::credits::balance,
        routes::webhooks::payment,
        routes::media::resolve,
        routes::credentials::token,
        routes::credentials::connect,
        routes::credentials::disconnect,
    ),
    components(schemas(
        ApiErrorResponse,
        crate::credentials::Provider,
        crate::credits::CreditSource,
        crate::media::MediaType,
        routes::health::HealthResponse,
        routes::accounts::CreateAccountRequest,
        routes::accounts::CreateAccountResponse,
        routes::credits::ConsumeRequest,
        routes::credits::ConsumeResponse,
        routes::credits::BalanceResponse,
        routes::webhooks::WebhookResponse,
        routes::media::ResolveRequest,
        routes::media::ResolveResponse,
        routes::credentials::TokenResponse,
        routes::credentials::ConnectRequest,
        routes::credentials::ConnectResponse,
        routes::credentials::DisconnectResponse,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "accounts", description = "Account provisioning"),
        (name = "credits", description = "Credit ledger"),
        (name = "webhooks", description = "Payment reconciliation"),
        (name = "media", description = "Media dedup cache"),
        (name = "credentials", description = "Provider credentials")
    )
)]
pub struct ApiDoc;

pub async fn serve() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
