//! Credit ledger.
//!
//! Two balance scopes back every paid action: per-API-key accounts and the
//! per-owner wallet. Debits resolve account-first with wallet fallback and
//! are atomic conditional decrements; grants are unconditional increments.
//!
//! # Architecture
//!
//! - [`ApiKeyAccount`] / [`UserWallet`]: the two balance scopes
//! - [`CreditLedger`]: consume / grant / balance orchestration
//! - [`pricing`]: static model-tier costs and currency conversion

mod error;
mod ledger;
pub mod pricing;
mod types;

pub use error::CreditError;
pub use ledger::CreditLedger;
pub use types::{
    AccountStatus, ApiKeyAccount, CreditSource, GrantDestination, Receipt, UserWallet,
};
