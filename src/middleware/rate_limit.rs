use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::warn;

use crate::error::AppError;

/// Global limiter for a single route
pub struct RouteRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RouteRateLimiter {
    /// Allow `requests` per minute, all of them usable as one burst.
    pub fn per_minute(requests: u32) -> Self {
        let requests = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(Quota::per_minute(requests)),
        }
    }

    pub fn check(&self) -> Result<(), AppError> {
        self.limiter.check().map_err(|_| AppError::RateLimited)
    }
}

/// Reject with 429 once the route's quota is used up
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RouteRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(req).await,
        Err(e) => {
            warn!("Rate limit hit on {} {}", req.method(), req.uri().path());
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exhausts() {
        let limiter = RouteRateLimiter::per_minute(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(matches!(limiter.check(), Err(AppError::RateLimited)));
    }

    #[test]
    fn test_zero_quota_still_admits_one() {
        let limiter = RouteRateLimiter::per_minute(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
