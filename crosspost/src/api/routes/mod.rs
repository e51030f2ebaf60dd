//! API route handlers.

pub mod accounts;
pub mod credentials;
pub mod credits;
pub mod health;
pub mod media;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::api::server::AppState;

/// Assemble the full route tree.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/api/openapi.json", get(crate::api::openapi::serve))
        .route("/api/accounts", post(accounts::create))
        .route("/api/credits/consume", post(credits::consume))
        .route("/api/credits/balance", get(credits::balance))
        .route("/api/webhooks/payment", post(webhooks::payment))
        .route("/api/media/resolve", post(media::resolve))
        .route("/api/credentials/{provider}/token", get(credentials::token))
        .route(
            "/api/credentials/{provider}/connect",
            post(credentials::connect),
        )
        .route("/api/credentials/{provider}", delete(credentials::disconnect))
}
