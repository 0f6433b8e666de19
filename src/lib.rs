pub mod modules;
pub mod shared;

use modules::enhancement::{
    CacheInvalidator, QueueManager, RateLimitedExecutor, RecordStore, StepExecutor, StepPipeline,
};
use modules::poller::{EnhancementTransport, LocalEnhancementTransport, StatusPoller};
use shared::config::EnhancementConfig;
use shared::errors::AppResult;
use shared::utils::logger::init_logger;
use std::sync::Arc;

/// Wired server-side services
pub struct EnhancementServices {
    pub queue: Arc<QueueManager>,
    pub config: EnhancementConfig,
}

impl EnhancementServices {
    /// Poller talking to this process's queue without going over HTTP
    pub fn local_poller(&self, cache: Arc<dyn CacheInvalidator>) -> StatusPoller {
        let transport: Arc<dyn EnhancementTransport> =
            Arc::new(LocalEnhancementTransport::new(Arc::clone(&self.queue)));
        StatusPoller::new(transport, cache, self.config.poller.clone())
    }
}

/// Build the queue around the host's collaborators.
///
/// The executor is wrapped in the configured rate limiter.
pub fn build_services(
    config: EnhancementConfig,
    executor: Arc<dyn StepExecutor>,
    record_store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheInvalidator>,
) -> AppResult<EnhancementServices> {
    config.validate()?;

    let executor: Arc<dyn StepExecutor> =
        Arc::new(RateLimitedExecutor::new(executor, &config.executor)?);
    let pipeline = StepPipeline::new(executor, record_store);
    let queue = Arc::new(QueueManager::new(pipeline, cache, config.queue.clone()));

    log::info!(
        "Enhancement queue ready (executor {} req/s, burst {})",
        config.executor.requests_per_second,
        config.executor.burst_size
    );

    Ok(EnhancementServices { queue, config })
}

/// Initialise logging, load configuration from the environment and build
/// the services.
pub fn init_from_env(
    executor: Arc<dyn StepExecutor>,
    record_store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheInvalidator>,
) -> AppResult<EnhancementServices> {
    init_logger();

    let config = EnhancementConfig::from_env().map_err(|e| {
        log::error!("Failed to load enhancement configuration: {}", e);
        e
    })?;

    build_services(config, executor, record_store, cache)
}
