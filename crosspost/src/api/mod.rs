//! HTTP API.

pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServerConfig, AppState};
