use std::sync::Arc;

use chrono::Utc;
use log::{error, warn};
use mongodb::bson::DateTime;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket::State;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::config::Config;
use crate::store::{RateLimitStore, StoreError};

pub const TOO_MANY_REQUESTS: &str = "Too many requests from this IP, Please try again later.";

/// Fixed-window request budget per client address.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: i32,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, limit: i32, window: chrono::Duration) -> Self {
        RateLimiter {
            store,
            limit,
            window_ms: window.num_milliseconds(),
        }
    }

    pub fn from_config(store: Arc<dyn RateLimitStore>) -> Self {
        Self::new(
            store,
            Config::rate_limit_max(),
            chrono::Duration::seconds(Config::rate_limit_window_secs()),
        )
    }

    /// Counts one request for `key`; `false` once the window's budget is spent.
    pub async fn check(&self, key: &str) -> Result<bool, StoreError> {
        let now = DateTime::from_millis(Utc::now().timestamp_millis());
        self.store.hit(key, self.limit, self.window_ms, now).await
    }
}

/// Request guard applying the managed [`RateLimiter`] to the caller's IP.
pub struct Throttle;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Throttle {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let limiter = match req.guard::<&State<RateLimiter>>().await {
            Outcome::Success(limiter) => limiter,
            _ => {
                error!("Rate limiter is not managed");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        let ip = req
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        match limiter.check(&format!("ip:{}", ip)).await {
            Ok(true) => Outcome::Success(Throttle),
            Ok(false) => {
                warn!("Rate limit exceeded for {}", ip);
                Outcome::Error((Status::TooManyRequests, ()))
            }
            // fail open
            Err(e) => {
                error!("Rate limiter lookup failed for {}: {}", ip, e);
                Outcome::Success(Throttle)
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for Throttle {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRateLimitStore;

    #[tokio::test]
    async fn limiter_counts_per_key() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::default()),
            2,
            chrono::Duration::minutes(15),
        );

        assert!(limiter.check("ip:1.1.1.1").await.unwrap());
        assert!(limiter.check("ip:1.1.1.1").await.unwrap());
        assert!(!limiter.check("ip:1.1.1.1").await.unwrap());
        assert!(limiter.check("ip:2.2.2.2").await.unwrap());
    }
}
