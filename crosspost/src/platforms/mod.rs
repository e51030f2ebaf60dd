//! Platform posting constraints.

mod limits;

pub use limits::{PlatformLimits, limits_for};
