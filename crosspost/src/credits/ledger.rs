//! Credit ledger service.
//!
//! Orchestrates debits, grants, and balance queries over the two balance
//! scopes (API key accounts and the per-owner wallet). Atomicity lives in the
//! repository's conditional updates; this layer owns the resolution order.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::database::repositories::AccountRepository;

use super::error::CreditError;
use super::types::{
    AccountStatus, ApiKeyAccount, CreditSource, GrantDestination, Receipt, UserWallet,
};

pub struct CreditLedger {
    accounts: Arc<AccountRepository>,
    credits_per_currency_unit: u32,
}

impl CreditLedger {
    pub fn new(accounts: Arc<AccountRepository>, credits_per_currency_unit: u32) -> Self {
        Self {
            accounts,
            credits_per_currency_unit,
        }
    }

    /// Convert a paid amount in minor currency units to credits at the
    /// configured rate.
    pub fn credits_for_amount(&self, minor_units: i64) -> i64 {
        super::pricing::credits_for_amount(minor_units, self.credits_per_currency_unit)
    }

    /// Debit `amount` credits from the owner.
    ///
    /// Resolution order: the preferred account when given (ownership is
    /// verified first), otherwise the owner's newest active account, then the
    /// wallet. A debit never partially deducts: an account that cannot cover
    /// the full amount is skipped, not drained.
    ///
    /// # Returns
    /// * `Ok(Receipt)` - which scope paid and its remaining balance
    /// * `Err(Unauthorized)` - preferred account not owned by `owner_key`
    /// * `Err(InsufficientCredits)` - no scope could cover the debit
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        owner_key: &str,
        amount: i64,
        preferred_account: Option<&str>,
    ) -> Result<Receipt, CreditError> {
        // Callers must not be able to request a zero or negative debit.
        let amount = amount.max(1);

        if let Some(account_id) = preferred_account {
            let account = self.accounts.get_account(account_id).await?;
            match account {
                Some(account) if account.owner_key == owner_key => {
                    if let Some(remaining) =
                        self.accounts.try_debit_account(account_id, amount).await?
                    {
                        return Ok(Receipt {
                            source: CreditSource::Account,
                            remaining,
                        });
                    }
                }
                _ => {
                    // Ownership mismatch is logged as potential abuse.
                    warn!(
                        owner_key = %owner_key,
                        account_id = %account_id,
                        "Consume rejected: account not owned by caller"
                    );
                    return Err(CreditError::Unauthorized {
                        account_id: account_id.to_string(),
                    });
                }
            }
        } else if let Some(account) = self.accounts.newest_active_account(owner_key).await? {
            if let Some(remaining) = self.accounts.try_debit_account(&account.id, amount).await? {
                return Ok(Receipt {
                    source: CreditSource::Account,
                    remaining,
                });
            }
        }

        if let Some(remaining) = self.accounts.try_debit_wallet(owner_key, amount).await? {
            return Ok(Receipt {
                source: CreditSource::Wallet,
                remaining,
            });
        }

        Err(CreditError::InsufficientCredits)
    }

    /// Unconditional atomic credit grant.
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        owner_key: &str,
        amount: i64,
        destination: &GrantDestination,
    ) -> Result<(), CreditError> {
        match destination {
            GrantDestination::Wallet => self.accounts.credit_wallet(owner_key, amount).await?,
            GrantDestination::Account(id) => self.accounts.credit_account(id, amount).await?,
        }

        info!(owner_key = %owner_key, amount, ?destination, "Credits granted");
        Ok(())
    }

    /// Sum of all owned account balances plus the wallet balance.
    pub async fn balance(&self, owner_key: &str) -> Result<i64, CreditError> {
        self.accounts.total_balance(owner_key).await
    }

    pub async fn wallet(&self, owner_key: &str) -> Result<Option<UserWallet>, CreditError> {
        self.accounts.get_wallet(owner_key).await
    }

    /// Create a new API key account with a signup grant.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        owner_key: &str,
        initial_grant: i64,
    ) -> Result<ApiKeyAccount, CreditError> {
        let account = ApiKeyAccount {
            id: Uuid::new_v4().to_string(),
            owner_key: owner_key.to_string(),
            balance: initial_grant.max(0),
            initial_grant: initial_grant.max(0),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };

        self.accounts.insert_account(&account).await?;
        info!(account_id = %account.id, initial_grant, "API key account created");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    async fn ledger() -> CreditLedger {
        let repo = Arc::new(AccountRepository::new(test_pool().await));
        CreditLedger::new(repo, 5)
    }

    #[tokio::test]
    async fn test_concurrent_consume_no_overdraft() {
        // Balance 10, two concurrent debits of 6: exactly one succeeds with
        // remaining 4, the other fails without touching the balance.
        let ledger = Arc::new(ledger().await);
        let account = ledger.create_account("owner-1", 10).await.unwrap();

        let a = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            let id = account.id.clone();
            async move { ledger.consume("owner-1", 6, Some(&id)).await }
        });
        let b = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            let id = account.id.clone();
            async move { ledger.consume("owner-1", 6, Some(&id)).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes: Vec<&Receipt> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let failures = results.iter().filter(|r| r.is_err()).count();

        assert_eq!(successes.len(), 1);
        assert_eq!(failures, 1);
        assert_eq!(successes[0].remaining, 4);
        assert!(matches!(
            results.iter().find(|r| r.is_err()).unwrap(),
            Err(CreditError::InsufficientCredits)
        ));
    }

    #[tokio::test]
    async fn test_consume_falls_through_to_wallet_without_partial_deduction() {
        let ledger = ledger().await;
        let account = ledger.create_account("owner-1", 3).await.unwrap();
        ledger
            .grant("owner-1", 20, &GrantDestination::Wallet)
            .await
            .unwrap();

        let receipt = ledger
            .consume("owner-1", 5, Some(&account.id))
            .await
            .unwrap();

        assert_eq!(receipt.source, CreditSource::Wallet);
        assert_eq!(receipt.remaining, 15);

        // The account keeps its full balance: no partial deduction.
        assert_eq!(ledger.balance("owner-1").await.unwrap(), 3 + 15);
    }

    #[tokio::test]
    async fn test_consume_rejects_foreign_account() {
        let ledger = ledger().await;
        let foreign = ledger.create_account("owner-2", 100).await.unwrap();

        let err = ledger
            .consume("owner-1", 1, Some(&foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CreditError::Unauthorized { .. }));

        // Nothing was deducted from the foreign account.
        assert_eq!(ledger.balance("owner-2").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_consume_clamps_amount_to_one() {
        let ledger = ledger().await;
        let account = ledger.create_account("owner-1", 10).await.unwrap();

        let receipt = ledger
            .consume("owner-1", 0, Some(&account.id))
            .await
            .unwrap();
        assert_eq!(receipt.remaining, 9);

        let receipt = ledger
            .consume("owner-1", -50, Some(&account.id))
            .await
            .unwrap();
        assert_eq!(receipt.remaining, 8);
    }

    #[tokio::test]
    async fn test_consume_without_account_uses_newest_active() {
        let ledger = ledger().await;
        ledger.create_account("owner-1", 10).await.unwrap();

        let receipt = ledger.consume("owner-1", 2, None).await.unwrap();
        assert_eq!(receipt.source, CreditSource::Account);
        assert_eq!(receipt.remaining, 8);
    }

    #[tokio::test]
    async fn test_insufficient_everywhere() {
        let ledger = ledger().await;
        ledger.create_account("owner-1", 1).await.unwrap();

        let err = ledger.consume("owner-1", 5, None).await.unwrap_err();
        assert!(matches!(err, CreditError::InsufficientCredits));
        assert_eq!(ledger.balance("owner-1").await.unwrap(), 1);
    }
}
