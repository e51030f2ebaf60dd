//! Database repositories.

pub mod accounts;
pub mod credentials;
pub mod idempotency;

pub use accounts::AccountRepository;
pub use credentials::SqlxCredentialStore;
pub use idempotency::{IdempotencyRepository, PaymentMarker};
