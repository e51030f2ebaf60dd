//! Core credit types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A metered API key account. The account id doubles as the API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyAccount {
    pub id: String,
    pub owner_key: String,
    pub balance: i64,
    pub initial_grant: i64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyAccount {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Revoked,
}

impl AccountStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

/// Per-owner wallet with cumulative purchase statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserWallet {
    pub owner_key: String,
    pub balance: i64,
    pub total_paid_net: i64,
    pub total_paid_gross: i64,
    pub total_purchases: i64,
    pub total_credits_purchased: i64,
}

/// Which balance scope a debit was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    Account,
    Wallet,
}

/// Result of a successful debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub source: CreditSource,
    pub remaining: i64,
}

/// Where a credit grant lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantDestination {
    Wallet,
    Account(String),
}
