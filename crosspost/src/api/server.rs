//! API server setup and configuration.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::billing::{SignatureVerifier, WebhookReconciler};
use crate::config::AppConfig;
use crate::credentials::{CredentialService, OAuthTokenRefresher, ProviderRegistry};
use crate::credits::CreditLedger;
use crate::database::DbPool;
use crate::database::repositories::{AccountRepository, IdempotencyRepository, SqlxCredentialStore};
use crate::error::{Error, Result};
use crate::media::{DedupCache, HttpBlobStore, HttpMediaFetcher, MediaDedupService};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8090")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Account repository, used directly by API key authentication
    pub accounts: Arc<AccountRepository>,
    /// Credit ledger
    pub ledger: Arc<CreditLedger>,
    /// Payment webhook reconciler
    pub reconciler: Arc<WebhookReconciler>,
    /// Credential lifecycle service
    pub credential_service: Arc<CredentialService>,
    /// Media dedup service
    pub media: Arc<MediaDedupService>,
    /// Bearer token guarding provisioning endpoints; unset disables them
    pub admin_token: Option<String>,
    /// Signup bonus applied when an account is provisioned
    pub signup_grant: i64,
}

impl AppState {
    /// Wire the full service graph from configuration and a database pool.
    pub fn from_config(config: &AppConfig, pool: DbPool) -> Result<Self> {
        let accounts = Arc::new(AccountRepository::new(pool.clone()));
        let markers = Arc::new(IdempotencyRepository::new(pool.clone()));
        let ledger = Arc::new(CreditLedger::new(
            Arc::clone(&accounts),
            config.credits.credits_per_currency_unit,
        ));

        let reconciler = Arc::new(WebhookReconciler::new(
            SignatureVerifier::new(&config.webhook.signing_secret, config.webhook.tolerance),
            markers,
            Arc::clone(&accounts),
            Arc::clone(&ledger),
        ));

        let credential_service = Arc::new(CredentialService::new(
            Arc::new(SqlxCredentialStore::new(pool)),
            Arc::new(OAuthTokenRefresher::new(config.credentials.refresh_timeout)),
            ProviderRegistry::new(config.credentials.providers.iter().cloned()),
            config.credentials.refresh_threshold,
        ));

        let blob_store = HttpBlobStore::new(
            &config.media.upload_url,
            &config.media.public_url,
            config.media.download_timeout,
        )
        .map_err(|e| Error::config(e.to_string()))?;

        let media = Arc::new(MediaDedupService::new(
            Arc::new(HttpMediaFetcher::new(
                config.media.download_timeout,
                config.media.max_download_bytes,
                config.media.fetch_attempts,
            )),
            Arc::new(blob_store),
            DedupCache::new(config.media.cache_ttl, config.media.cache_max_entries),
        ));

        Ok(Self {
            start_time: Instant::now(),
            accounts,
            ledger,
            reconciler,
            credential_service,
            media,
            admin_token: config.admin_token.clone(),
            signup_grant: config.credits.signup_grant,
        })
    }
}

/// Build the application router with middleware layers applied.
pub fn build_router(state: AppState, config: &ApiServerConfig) -> Router {
    let mut router = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Run the API server until the cancellation token fires.
pub async fn run(
    state: AppState,
    config: &ApiServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = build_router(state, config);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::api::middleware::auth::API_KEY_HEADER;
    use crate::api::routes::webhooks::SIGNATURE_HEADER;
    use crate::database::test_pool;

    const SECRET: &str = "whsec_test";

    async fn test_state() -> AppState {
        let pool = test_pool().await;
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            admin_token: Some("admin-secret".to_string()),
            webhook: crate::config::WebhookConfig {
                signing_secret: SECRET.to_string(),
                tolerance: std::time::Duration::from_secs(300),
            },
            credits: crate::config::CreditsConfig {
                credits_per_currency_unit: 5,
                signup_grant: 10,
            },
            credentials: crate::config::CredentialConfig {
                refresh_threshold: std::time::Duration::from_secs(300),
                refresh_timeout: std::time::Duration::from_secs(5),
                providers: Vec::new(),
            },
            media: crate::config::MediaConfig {
                upload_url: "https://storage.internal/upload".to_string(),
                public_url: "https://media.example.com".to_string(),
                max_download_bytes: 1024,
                download_timeout: std::time::Duration::from_secs(5),
                fetch_attempts: 1,
                cache_ttl: std::time::Duration::from_secs(60),
                cache_max_entries: 16,
            },
        };
        AppState::from_config(&config, pool).unwrap()
    }

    fn signed_checkout_body(event_id: &str, owner: &str) -> (String, Vec<u8>) {
        let body = serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": { "object": {
                "metadata": { "userId": owner },
                "amount_total": 2000,
                "payment_status": "paid"
            }}
        }))
        .unwrap();
        let header =
            SignatureVerifier::new(SECRET, std::time::Duration::from_secs(300))
                .sign(&body, Utc::now());
        (header, body)
    }

    #[tokio::test]
    async fn test_ping() {
        let router = build_router(test_state().await, &ApiServerConfig::default());

        let response = router
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_credits_then_balance_via_api() {
        let state = test_state().await;
        let account = state.ledger.create_account("owner-1", 0).await.unwrap();
        let router = build_router(state, &ApiServerConfig::default());

        // Deliver a signed payment event.
        let (signature, body) = signed_checkout_body("evt-1", "owner-1");
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/webhooks/payment")
                    .header(SIGNATURE_HEADER, &signature)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Redelivery is acknowledged without a second grant.
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/webhooks/payment")
                    .header(SIGNATURE_HEADER, &signature)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 2000 minor units at 5 credits/unit = 100 credits, exactly once.
        let response = router
            .oneshot(
                Request::get("/api/credits/balance")
                    .header(API_KEY_HEADER, &account.id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["credits"], 100);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let router = build_router(test_state().await, &ApiServerConfig::default());

        let (_, body) = signed_checkout_body("evt-1", "owner-1");
        let response = router
            .oneshot(
                Request::post("/api/webhooks/payment")
                    .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_consume_insufficient_credits_is_402() {
        let state = test_state().await;
        let account = state.ledger.create_account("owner-1", 0).await.unwrap();
        let router = build_router(state, &ApiServerConfig::default());

        let response = router
            .oneshot(
                Request::post("/api/credits/consume")
                    .header(API_KEY_HEADER, &account.id)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"amount\": 5}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn test_account_provisioning_applies_signup_grant() {
        let router = build_router(test_state().await, &ApiServerConfig::default());

        // Without the admin token the route refuses.
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/accounts")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"owner_key\": \"owner-1\"}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(
                Request::post("/api/accounts")
                    .header(header::AUTHORIZATION, "Bearer admin-secret")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"owner_key\": \"owner-1\"}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["balance"], 10);
        assert_eq!(json["owner_key"], "owner-1");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_401() {
        let router = build_router(test_state().await, &ApiServerConfig::default());

        let response = router
            .oneshot(
                Request::get("/api/credits/balance")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
