/// Hand-written collaborators for integration tests
use async_trait::async_trait;
use enhancer_lib::modules::enhancement::commands::EnqueueEnhancementRequest;
use enhancer_lib::modules::enhancement::domain::{
    CacheInvalidator, EnhancementStep, EnqueueOutcome, QueueItemId, StepExecutor, StepResult,
};
use enhancer_lib::modules::poller::{EnhancementTransport, StatusPayload, TransportError};
use enhancer_lib::shared::errors::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Executor that records every call and fails the configured steps
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, EnhancementStep)>>,
    failing: HashSet<EnhancementStep>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(steps: &[EnhancementStep]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: steps.iter().copied().collect(),
        }
    }

    pub fn calls(&self) -> Vec<(String, EnhancementStep)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, record_id: &str) -> Vec<EnhancementStep> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| id == record_id)
            .map(|(_, step)| step)
            .collect()
    }
}

#[async_trait]
impl StepExecutor for RecordingExecutor {
    async fn run(
        &self,
        record_id: &str,
        step: EnhancementStep,
        _force_redo: bool,
    ) -> AppResult<StepResult> {
        self.calls
            .lock()
            .unwrap()
            .push((record_id.to_string(), step));

        if self.failing.contains(&step) {
            return Err(AppError::ExternalServiceError(format!(
                "LLM call for {} failed",
                step
            )));
        }
        Ok(StepResult::Completed {
            fields: serde_json::json!({ "step": step.as_str() }),
        })
    }
}

/// Executor that parks every call until the test releases it
#[derive(Default)]
pub struct GatedExecutor {
    pub recorder: RecordingExecutor,
    started: Notify,
    release: Notify,
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a step has entered the executor
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let one parked step finish
    pub fn release_one(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl StepExecutor for GatedExecutor {
    async fn run(
        &self,
        record_id: &str,
        step: EnhancementStep,
        force_redo: bool,
    ) -> AppResult<StepResult> {
        self.started.notify_one();
        self.release.notified().await;
        self.recorder.run(record_id, step, force_redo).await
    }
}

/// Cache that counts invalidations per record
#[derive(Default)]
pub struct CountingCache {
    invalidated: Mutex<Vec<String>>,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for(&self, record_id: &str) -> usize {
        self.invalidated
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == record_id)
            .count()
    }
}

#[async_trait]
impl CacheInvalidator for CountingCache {
    async fn invalidate(&self, record_id: &str) -> AppResult<()> {
        self.invalidated.lock().unwrap().push(record_id.to_string());
        Ok(())
    }
}

/// Cache whose invalidation panics for one record and counts the rest
pub struct PanickingCache {
    panics_for: String,
    inner: CountingCache,
}

impl PanickingCache {
    pub fn for_record(record_id: &str) -> Self {
        Self {
            panics_for: record_id.to_string(),
            inner: CountingCache::new(),
        }
    }

    pub fn count_for(&self, record_id: &str) -> usize {
        self.inner.count_for(record_id)
    }
}

#[async_trait]
impl CacheInvalidator for PanickingCache {
    async fn invalidate(&self, record_id: &str) -> AppResult<()> {
        if record_id == self.panics_for {
            panic!("cache backend crashed for {}", record_id);
        }
        self.inner.invalidate(record_id).await
    }
}

/// Transport whose status polls always fail at the network level
pub struct UnreachableStatusTransport {
    inner: Arc<dyn EnhancementTransport>,
    pub polls: AtomicUsize,
}

impl UnreachableStatusTransport {
    pub fn wrapping(inner: Arc<dyn EnhancementTransport>) -> Self {
        Self {
            inner,
            polls: AtomicUsize::new(0),
        }
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnhancementTransport for UnreachableStatusTransport {
    async fn enqueue(
        &self,
        request: &EnqueueEnhancementRequest,
    ) -> Result<EnqueueOutcome, TransportError> {
        self.inner.enqueue(request).await
    }

    async fn fetch_status(&self, _item_id: QueueItemId) -> Result<StatusPayload, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Network("connection refused".to_string()))
    }

    async fn cancel(&self, item_id: QueueItemId) -> Result<(), TransportError> {
        self.inner.cancel(item_id).await
    }
}

/// Transport that replays a fixed sequence of sparse status payloads
pub struct ScriptedStatusTransport {
    script: Mutex<Vec<StatusPayload>>,
}

impl ScriptedStatusTransport {
    pub fn new(mut script: Vec<StatusPayload>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
        }
    }
}

#[async_trait]
impl EnhancementTransport for ScriptedStatusTransport {
    async fn enqueue(
        &self,
        _request: &EnqueueEnhancementRequest,
    ) -> Result<EnqueueOutcome, TransportError> {
        Err(TransportError::Rejected {
            status: 501,
            message: "not scripted".to_string(),
        })
    }

    async fn fetch_status(&self, _item_id: QueueItemId) -> Result<StatusPayload, TransportError> {
        Ok(self.script.lock().unwrap().pop().unwrap_or_default())
    }

    async fn cancel(&self, _item_id: QueueItemId) -> Result<(), TransportError> {
        Ok(())
    }
}
