pub mod auth;
pub mod client;
pub mod throttle;

pub use auth::{AdminGuard, AuthFailure};
pub use throttle::{RateLimiter, Throttle};
