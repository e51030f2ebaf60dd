//! Credential store repository (SQLx).
//!
//! Database-backed persistence for the credentials subsystem. A refresh is a
//! single conditional UPDATE: either the whole token triple is replaced or
//! nothing is, so a timed-out refresh can never leave a half-written record.

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::credentials::{
    AliasKind, CredentialError, CredentialRecord, CredentialStore, Provider, RefreshedToken,
};
use crate::database::DbPool;
use crate::database::time::{datetime_to_ms, ms_to_datetime, now_ms};

/// SQLx-backed credential store.
pub struct SqlxCredentialStore {
    pool: DbPool,
}

impl SqlxCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct CredentialRow {
    owner_key: String,
    provider: String,
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    scope: String,
    expires_at: i64,
    rotates_refresh_token: bool,
    last_refreshed_at: Option<i64>,
    created_at: i64,
}

impl CredentialRow {
    fn into_record(self) -> Result<CredentialRecord, CredentialError> {
        let provider: Provider = self
            .provider
            .parse()
            .map_err(|e: String| CredentialError::Parse(e))?;

        Ok(CredentialRecord {
            owner_key: self.owner_key,
            provider,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scope: self
                .scope
                .split_whitespace()
                .map(String::from)
                .collect(),
            expires_at: ms_to_datetime(self.expires_at),
            rotates_refresh_token: self.rotates_refresh_token,
            last_refreshed_at: self.last_refreshed_at.map(ms_to_datetime),
            created_at: ms_to_datetime(self.created_at),
        })
    }
}

#[async_trait]
impl CredentialStore for SqlxCredentialStore {
    async fn find(
        &self,
        owner_key: &str,
        provider: Provider,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT owner_key, provider, access_token, refresh_token, token_type,
                   scope, expires_at, rotates_refresh_token, last_refreshed_at, created_at
            FROM credentials
            WHERE owner_key = ? AND provider = ?
            "#,
        )
        .bind(owner_key)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CredentialRow::into_record).transpose()
    }

    #[instrument(skip(self, record), fields(owner_key = %record.owner_key, provider = %record.provider))]
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                owner_key, provider, access_token, refresh_token, token_type,
                scope, expires_at, rotates_refresh_token, last_refreshed_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_key, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_at = excluded.expires_at,
                rotates_refresh_token = excluded.rotates_refresh_token,
                last_refreshed_at = excluded.last_refreshed_at
            "#,
        )
        .bind(&record.owner_key)
        .bind(record.provider.as_str())
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(&record.token_type)
        .bind(record.scope.join(" "))
        .bind(datetime_to_ms(record.expires_at))
        .bind(record.rotates_refresh_token)
        .bind(record.last_refreshed_at.map(datetime_to_ms))
        .bind(datetime_to_ms(record.created_at))
        .execute(&self.pool)
        .await?;

        debug!("Credential record upserted");
        Ok(())
    }

    #[instrument(skip(self, refreshed), fields(provider = %provider))]
    async fn apply_refresh(
        &self,
        owner_key: &str,
        provider: Provider,
        refreshed: &RefreshedToken,
    ) -> Result<(), CredentialError> {
        // COALESCE keeps the stored refresh token / token type / scope when the
        // provider did not return new ones.
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET access_token = ?,
                expires_at = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_type = COALESCE(?, token_type),
                scope = COALESCE(?, scope),
                last_refreshed_at = ?
            WHERE owner_key = ? AND provider = ?
            "#,
        )
        .bind(&refreshed.access_token)
        .bind(datetime_to_ms(refreshed.expires_at))
        .bind(&refreshed.refresh_token)
        .bind(&refreshed.token_type)
        .bind(refreshed.scope.as_ref().map(|s| s.join(" ")))
        .bind(now_ms())
        .bind(owner_key)
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CredentialError::NotConnected { provider });
        }

        debug!("Refreshed credentials persisted");
        Ok(())
    }

    async fn delete(
        &self,
        owner_key: &str,
        provider: Provider,
    ) -> Result<bool, CredentialError> {
        let result = sqlx::query("DELETE FROM credentials WHERE owner_key = ? AND provider = ?")
            .bind(owner_key)
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn resolve_alias(
        &self,
        alias: &str,
        kind: AliasKind,
    ) -> Result<Option<String>, CredentialError> {
        let owner_key: Option<String> =
            sqlx::query_scalar("SELECT owner_key FROM owner_aliases WHERE alias = ? AND kind = ?")
                .bind(alias)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(owner_key)
    }

    async fn register_alias(
        &self,
        alias: &str,
        kind: AliasKind,
        owner_key: &str,
    ) -> Result<(), CredentialError> {
        sqlx::query(
            r#"
            INSERT INTO owner_aliases (alias, kind, owner_key)
            VALUES (?, ?, ?)
            ON CONFLICT (alias, kind) DO UPDATE SET owner_key = excluded.owner_key
            "#,
        )
        .bind(alias)
        .bind(kind.as_str())
        .bind(owner_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::database::test_pool;

    fn sample_record() -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            owner_key: "owner-1".to_string(),
            provider: Provider::Youtube,
            access_token: "tok-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            token_type: "Bearer".to_string(),
            scope: vec!["upload".to_string(), "read".to_string()],
            expires_at: now + Duration::seconds(3600),
            rotates_refresh_token: false,
            last_refreshed_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find_roundtrip() {
        let store = SqlxCredentialStore::new(test_pool().await);
        let record = sample_record();

        store.upsert(&record).await.unwrap();
        let loaded = store
            .find("owner-1", Provider::Youtube)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.access_token, "tok-1");
        assert_eq!(loaded.scope, vec!["upload", "read"]);
        assert_eq!(
            loaded.expires_at.timestamp_millis(),
            record.expires_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_apply_refresh_without_rotation_keeps_refresh_token() {
        let store = SqlxCredentialStore::new(test_pool().await);
        store.upsert(&sample_record()).await.unwrap();

        let refreshed = RefreshedToken {
            access_token: "tok-2".to_string(),
            refresh_token: None,
            token_type: None,
            scope: None,
            expires_at: Utc::now() + Duration::seconds(7200),
        };
        store
            .apply_refresh("owner-1", Provider::Youtube, &refreshed)
            .await
            .unwrap();

        let loaded = store
            .find("owner-1", Provider::Youtube)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.access_token, "tok-2");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert!(loaded.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_refresh_with_rotation_replaces_refresh_token() {
        let store = SqlxCredentialStore::new(test_pool().await);
        store.upsert(&sample_record()).await.unwrap();

        let refreshed = RefreshedToken {
            access_token: "tok-2".to_string(),
            refresh_token: Some("refresh-2".to_string()),
            token_type: None,
            scope: None,
            expires_at: Utc::now() + Duration::seconds(7200),
        };
        store
            .apply_refresh("owner-1", Provider::Youtube, &refreshed)
            .await
            .unwrap();

        let loaded = store
            .find("owner-1", Provider::Youtube)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn test_apply_refresh_missing_record() {
        let store = SqlxCredentialStore::new(test_pool().await);

        let refreshed = RefreshedToken {
            access_token: "tok".to_string(),
            refresh_token: None,
            token_type: None,
            scope: None,
            expires_at: Utc::now(),
        };
        let err = store
            .apply_refresh("ghost", Provider::Tiktok, &refreshed)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_alias_roundtrip() {
        let store = SqlxCredentialStore::new(test_pool().await);

        store
            .register_alias("uid-9", AliasKind::ProviderUid, "owner-1")
            .await
            .unwrap();
        store
            .register_alias("uid-9", AliasKind::ProviderUid, "owner-2")
            .await
            .unwrap();

        assert_eq!(
            store
                .resolve_alias("uid-9", AliasKind::ProviderUid)
                .await
                .unwrap()
                .as_deref(),
            Some("owner-2")
        );
        assert!(
            store
                .resolve_alias("uid-9", AliasKind::Email)
                .await
                .unwrap()
                .is_none()
        );
    }
}
