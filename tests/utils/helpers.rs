/// Service builders shared by the integration tests
use enhancer_lib::modules::enhancement::domain::{
    CacheInvalidator, EnhancementStep, QueueItemId, QueueItemStatus, StepExecutor,
};
use enhancer_lib::modules::enhancement::{InMemoryRecordStore, QueueManager};
use enhancer_lib::shared::config::{EnhancementConfig, ExecutorConfig, PollerConfig};
use enhancer_lib::{build_services, EnhancementServices};
use std::sync::Arc;
use std::time::Duration;

pub struct TestServices {
    pub services: EnhancementServices,
    pub store: Arc<InMemoryRecordStore>,
}

impl TestServices {
    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.services.queue
    }
}

/// Configuration with a rate limit that never makes tests wait
pub fn test_config() -> EnhancementConfig {
    EnhancementConfig {
        executor: ExecutorConfig {
            requests_per_second: 1000.0,
            burst_size: 1000,
        },
        poller: fast_poller_config(),
        ..EnhancementConfig::new()
    }
}

pub fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_millis(100),
        cleanup_delay: Duration::from_millis(300),
        max_consecutive_failures: 5,
        base_url: "http://127.0.0.1:9/api/enhancement".to_string(),
    }
}

pub fn build_test_services(
    executor: Arc<dyn StepExecutor>,
    cache: Arc<dyn CacheInvalidator>,
) -> TestServices {
    enhancer_lib::shared::utils::logger::init_logger();

    let store = Arc::new(InMemoryRecordStore::new());
    let services = build_services(test_config(), executor, store.clone(), cache)
        .expect("test services should build");
    TestServices { services, store }
}

/// Seed a record with existing enriched fields
pub fn with_existing_fields(store: &InMemoryRecordStore, record_id: &str, steps: &[EnhancementStep]) {
    for step in steps {
        store.set_field(record_id, *step);
    }
}

/// Poll the queue until the item reaches the given status or time runs out
pub async fn wait_for_status(
    queue: &QueueManager,
    item_id: QueueItemId,
    status: QueueItemStatus,
) -> bool {
    for _ in 0..200 {
        if let Ok(snapshot) = queue.get_status(item_id).await {
            if snapshot.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
