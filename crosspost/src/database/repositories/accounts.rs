//! Account and wallet repository (SQLx).
//!
//! Every balance mutation is a single conditional UPDATE (the store's atomic
//! compare-and-swap primitive). There is deliberately no read-balance /
//! write-balance pair anywhere in this file.

use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::credits::{AccountStatus, ApiKeyAccount, CreditError, UserWallet};
use crate::database::DbPool;
use crate::database::time::ms_to_datetime;

pub struct AccountRepository {
    pool: DbPool,
}

#[derive(FromRow)]
struct AccountRow {
    id: String,
    owner_key: String,
    balance: i64,
    initial_grant: i64,
    status: String,
    created_at: i64,
}

impl AccountRow {
    fn into_account(self) -> Result<ApiKeyAccount, CreditError> {
        let status: AccountStatus = self
            .status
            .parse()
            .map_err(|_| CreditError::UnknownAccount {
                account_id: self.id.clone(),
            })?;

        Ok(ApiKeyAccount {
            id: self.id,
            owner_key: self.owner_key,
            balance: self.balance,
            initial_grant: self.initial_grant,
            status,
            created_at: ms_to_datetime(self.created_at),
        })
    }
}

#[derive(FromRow)]
struct WalletRow {
    owner_key: String,
    balance: i64,
    total_paid_net: i64,
    total_paid_gross: i64,
    total_purchases: i64,
    total_credits_purchased: i64,
}

impl From<WalletRow> for UserWallet {
    fn from(row: WalletRow) -> Self {
        Self {
            owner_key: row.owner_key,
            balance: row.balance,
            total_paid_net: row.total_paid_net,
            total_paid_gross: row.total_paid_gross,
            total_purchases: row.total_purchases,
            total_credits_purchased: row.total_credits_purchased,
        }
    }
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_account(&self, account: &ApiKeyAccount) -> Result<(), CreditError> {
        sqlx::query(
            r#"
            INSERT INTO api_key_accounts (id, owner_key, balance, initial_grant, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_key)
        .bind(account.balance)
        .bind(account.initial_grant)
        .bind(account.status.as_str())
        .bind(account.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<ApiKeyAccount>, CreditError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, owner_key, balance, initial_grant, status, created_at
            FROM api_key_accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountRow::into_account).transpose()
    }

    /// The owner's most recently created active account.
    ///
    /// Ties on creation time break by account id ordering so the choice is
    /// deterministic across processes.
    pub async fn newest_active_account(
        &self,
        owner_key: &str,
    ) -> Result<Option<ApiKeyAccount>, CreditError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, owner_key, balance, initial_grant, status, created_at
            FROM api_key_accounts
            WHERE owner_key = ? AND status = 'active'
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(owner_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountRow::into_account).transpose()
    }

    /// Conditionally debit an active account.
    ///
    /// Returns the remaining balance when the debit applied, or `None` when
    /// the balance was insufficient (nothing is deducted in that case).
    #[instrument(skip(self))]
    pub async fn try_debit_account(
        &self,
        id: &str,
        amount: i64,
    ) -> Result<Option<i64>, CreditError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE api_key_accounts
            SET balance = balance - ?
            WHERE id = ? AND status = 'active' AND balance >= ?
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            debug!(account_id = %id, amount, remaining, "Debited account");
        }
        Ok(remaining)
    }

    /// Conditionally debit a wallet; same contract as [`Self::try_debit_account`].
    #[instrument(skip(self))]
    pub async fn try_debit_wallet(
        &self,
        owner_key: &str,
        amount: i64,
    ) -> Result<Option<i64>, CreditError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE wallets
            SET balance = balance - ?
            WHERE owner_key = ? AND balance >= ?
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(owner_key)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            debug!(owner_key = %owner_key, amount, remaining, "Debited wallet");
        }
        Ok(remaining)
    }

    /// Unconditional atomic increment of an account balance.
    pub async fn credit_account(&self, id: &str, amount: i64) -> Result<(), CreditError> {
        let result = sqlx::query("UPDATE api_key_accounts SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CreditError::UnknownAccount {
                account_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Unconditional atomic increment of a wallet balance, creating the wallet
    /// row when absent.
    pub async fn credit_wallet(&self, owner_key: &str, amount: i64) -> Result<(), CreditError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (owner_key, balance)
            VALUES (?, ?)
            ON CONFLICT (owner_key) DO UPDATE SET balance = balance + excluded.balance
            "#,
        )
        .bind(owner_key)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record cumulative purchase statistics on the wallet. Does not touch the
    /// spendable balance.
    #[instrument(skip(self))]
    pub async fn record_purchase(
        &self,
        owner_key: &str,
        gross_minor_units: i64,
        net_minor_units: i64,
        credits: i64,
    ) -> Result<(), CreditError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                owner_key, balance, total_paid_net, total_paid_gross,
                total_purchases, total_credits_purchased
            )
            VALUES (?, 0, ?, ?, 1, ?)
            ON CONFLICT (owner_key) DO UPDATE SET
                total_paid_net = total_paid_net + excluded.total_paid_net,
                total_paid_gross = total_paid_gross + excluded.total_paid_gross,
                total_purchases = total_purchases + 1,
                total_credits_purchased = total_credits_purchased + excluded.total_credits_purchased
            "#,
        )
        .bind(owner_key)
        .bind(net_minor_units)
        .bind(gross_minor_units)
        .bind(credits)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_wallet(&self, owner_key: &str) -> Result<Option<UserWallet>, CreditError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT owner_key, balance, total_paid_net, total_paid_gross,
                   total_purchases, total_credits_purchased
            FROM wallets
            WHERE owner_key = ?
            "#,
        )
        .bind(owner_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserWallet::from))
    }

    /// Sum of all owned account balances plus the wallet balance.
    pub async fn total_balance(&self, owner_key: &str) -> Result<i64, CreditError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COALESCE(SUM(balance), 0) FROM api_key_accounts WHERE owner_key = ?)
                + COALESCE((SELECT balance FROM wallets WHERE owner_key = ?), 0)
            "#,
        )
        .bind(owner_key)
        .bind(owner_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::database::test_pool;
    use crate::database::time::now_ms;

    fn account(id: &str, owner: &str, balance: i64, created_ms_offset: i64) -> ApiKeyAccount {
        ApiKeyAccount {
            id: id.to_string(),
            owner_key: owner.to_string(),
            balance,
            initial_grant: 0,
            status: AccountStatus::Active,
            created_at: ms_to_datetime(now_ms() + created_ms_offset),
        }
    }

    #[tokio::test]
    async fn test_conditional_debit_rejects_overdraft() {
        let repo = AccountRepository::new(test_pool().await);
        repo.insert_account(&account("key-1", "owner-1", 10, 0))
            .await
            .unwrap();

        assert_eq!(repo.try_debit_account("key-1", 6).await.unwrap(), Some(4));
        assert_eq!(repo.try_debit_account("key-1", 6).await.unwrap(), None);

        // Failed debit left the balance unchanged.
        let acct = repo.get_account("key-1").await.unwrap().unwrap();
        assert_eq!(acct.balance, 4);
    }

    #[tokio::test]
    async fn test_debit_skips_revoked_accounts() {
        let repo = AccountRepository::new(test_pool().await);
        let mut acct = account("key-1", "owner-1", 100, 0);
        acct.status = AccountStatus::Revoked;
        repo.insert_account(&acct).await.unwrap();

        assert_eq!(repo.try_debit_account("key-1", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_newest_active_account_tie_break() {
        let repo = AccountRepository::new(test_pool().await);
        let created = Utc::now();
        for id in ["key-a", "key-c", "key-b"] {
            let mut acct = account(id, "owner-1", 0, 0);
            acct.created_at = created;
            repo.insert_account(&acct).await.unwrap();
        }
        let mut revoked = account("key-z", "owner-1", 0, 1000);
        revoked.status = AccountStatus::Revoked;
        repo.insert_account(&revoked).await.unwrap();

        // Same created_at: highest id wins. Revoked accounts never win.
        let newest = repo.newest_active_account("owner-1").await.unwrap().unwrap();
        assert_eq!(newest.id, "key-c");
    }

    #[tokio::test]
    async fn test_wallet_upsert_and_stats() {
        let repo = AccountRepository::new(test_pool().await);

        repo.credit_wallet("owner-1", 50).await.unwrap();
        repo.record_purchase("owner-1", 2000, 1900, 100).await.unwrap();
        repo.record_purchase("owner-1", 1000, 950, 50).await.unwrap();

        let wallet = repo.get_wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 50);
        assert_eq!(wallet.total_paid_gross, 3000);
        assert_eq!(wallet.total_paid_net, 2850);
        assert_eq!(wallet.total_purchases, 2);
        assert_eq!(wallet.total_credits_purchased, 150);
    }

    #[tokio::test]
    async fn test_total_balance_sums_accounts_and_wallet() {
        let repo = AccountRepository::new(test_pool().await);
        repo.insert_account(&account("key-1", "owner-1", 10, 0))
            .await
            .unwrap();
        repo.insert_account(&account("key-2", "owner-1", 5, 0))
            .await
            .unwrap();
        repo.credit_wallet("owner-1", 7).await.unwrap();
        repo.insert_account(&account("key-3", "owner-2", 99, 0))
            .await
            .unwrap();

        assert_eq!(repo.total_balance("owner-1").await.unwrap(), 22);
        assert_eq!(repo.total_balance("owner-3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_credit_unknown_account() {
        let repo = AccountRepository::new(test_pool().await);
        let err = repo.credit_account("ghost", 10).await.unwrap_err();
        assert!(matches!(err, CreditError::UnknownAccount { .. }));
    }
}
