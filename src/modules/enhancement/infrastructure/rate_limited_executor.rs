//! Rate-limited step executor
//!
//! Wraps any executor with a token bucket so the LLM service behind it is
//! never called faster than its quota, however the queue is driven.

use crate::modules::enhancement::domain::{EnhancementStep, StepExecutor, StepResult};
use crate::shared::config::ExecutorConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = GovernorRateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
    governor::middleware::NoOpMiddleware,
>;

pub struct RateLimitedExecutor {
    inner: Arc<dyn StepExecutor>,
    rate_limiter: DirectLimiter,
}

impl RateLimitedExecutor {
    pub fn new(inner: Arc<dyn StepExecutor>, config: &ExecutorConfig) -> AppResult<Self> {
        Ok(Self {
            inner,
            rate_limiter: Self::create_rate_limiter(
                config.requests_per_second,
                config.burst_size,
            )?,
        })
    }

    /// Create a rate limiter with specified requests per second and burst capacity
    fn create_rate_limiter(requests_per_second: f64, burst_size: u32) -> AppResult<DirectLimiter> {
        if requests_per_second.is_nan() || requests_per_second <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "Executor rate must be positive, got {}",
                requests_per_second
            )));
        }

        // Convert rate to duration between requests
        let period = Duration::try_from_secs_f64(1.0 / requests_per_second).map_err(|e| {
            AppError::ConfigError(format!(
                "Executor rate {} has no representable period: {}",
                requests_per_second, e
            ))
        })?;
        let burst = NonZeroU32::new(burst_size.max(1))
            .ok_or_else(|| AppError::ConfigError("Burst size must be non-zero".to_string()))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| AppError::ConfigError(format!("Invalid rate period {:?}", period)))?
            .allow_burst(burst);

        Ok(GovernorRateLimiter::direct(quota))
    }

    /// Check if a call could go out right now without waiting
    pub fn can_run_now(&self) -> bool {
        self.rate_limiter.check().is_ok()
    }
}

#[async_trait]
impl StepExecutor for RateLimitedExecutor {
    async fn run(
        &self,
        record_id: &str,
        step: EnhancementStep,
        force_redo: bool,
    ) -> AppResult<StepResult> {
        // Wait for rate limiter before delegating
        self.rate_limiter.until_ready().await;
        self.inner.run(record_id, step, force_redo).await
    }
}
