//! Per-service outbound rate limiting.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RateLimitConfig;

/// Enforces a minimum delay between successive calls to the same service.
///
/// Each service gets its own GCRA limiter with a burst of one, so concurrent
/// callers of one service are spaced by at least the configured delay while
/// different services never wait on each other.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    limiters: Arc<Mutex<HashMap<String, Option<Arc<DefaultDirectRateLimiter>>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            default_delay_secs: 0.0,
            min_delay_secs: HashMap::new(),
        })
    }

    /// Minimum delay configured for a service
    pub fn delay_for(&self, service: &str) -> Duration {
        self.config.delay_for(service)
    }

    /// Wait until a call to `service` is permitted
    pub async fn acquire(&self, service: &str) {
        let limiter = self.limiter_for(service);
        if let Some(limiter) = limiter {
            if limiter.check().is_err() {
                tracing::debug!("Rate limiting {}", service);
                limiter.until_ready().await;
            }
        }
    }

    fn limiter_for(&self, service: &str) -> Option<Arc<DefaultDirectRateLimiter>> {
        let mut limiters = match self.limiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        limiters
            .entry(service.to_string())
            .or_insert_with(|| {
                Quota::with_period(self.config.delay_for(service))
                    .map(|quota| Arc::new(GovernorLimiter::direct(quota.allow_burst(nonzero!(1u32)))))
            })
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
