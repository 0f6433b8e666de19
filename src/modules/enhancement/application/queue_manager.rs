/// Enhancement queue manager
///
/// Owns the FIFO of pending items, the per-record enhancement lock and a
/// single background worker. All queue and lock state sits behind one mutex;
/// the worker is the only long-running task and never holds that mutex while
/// a step executes.
///
/// The worker is started on demand by `enqueue` and exits when the queue is
/// drained. Starting is idempotent because the `worker_running` flag is
/// flipped under the same mutex that guards the queue.
use crate::modules::enhancement::application::lock::EnhancementLock;
use crate::modules::enhancement::application::pipeline::StepPipeline;
use crate::modules::enhancement::domain::{
    CacheInvalidator, CancelOutcome, EnhancementStep, EnqueueOutcome, ItemSnapshot, LockDecision,
    NewEnhancement, QueueItem, QueueItemId, QueueItemStatus, QueueStatistics, StepPlan,
    StepProgress,
};
use crate::shared::config::QueueConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::LogContext;
use crate::{log_debug, log_error, log_info, log_warn};
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Everything the worker needs to process one item without holding the mutex
#[derive(Debug, Clone)]
struct WorkerJob {
    item_id: QueueItemId,
    record_id: String,
    plan: StepPlan,
    force_redo: bool,
}

#[derive(Default)]
struct QueueState {
    items: HashMap<QueueItemId, QueueItem>,
    pending: VecDeque<QueueItemId>,
    processing: Option<QueueItemId>,
    lock: EnhancementLock,
    terminal_since: HashMap<QueueItemId, Instant>,
    worker_running: bool,
}

impl QueueState {
    fn queue_size(&self) -> usize {
        self.pending.len() + usize::from(self.processing.is_some())
    }

    /// Number of queued items ahead of `item_id`; 0 when not queued
    fn position_of(&self, item_id: QueueItemId) -> usize {
        self.pending
            .iter()
            .position(|id| *id == item_id)
            .unwrap_or(0)
    }

    fn snapshot(&self, item: &QueueItem) -> ItemSnapshot {
        let position = if item.status == QueueItemStatus::Queued {
            self.position_of(item.id)
        } else {
            0
        };

        ItemSnapshot {
            item_id: item.id,
            record_id: item.record_id.clone(),
            status: item.status,
            current_step: item.current_step,
            position,
            queue_size: self.queue_size(),
            progress: item.progress.clone(),
            plan: item.plan.clone(),
            error: item.error.clone(),
            queued_at: item.queued_at,
            started_at: item.started_at,
            finished_at: item.finished_at,
        }
    }

    /// Outcome for a repeat enqueue that merges into the active item
    fn existing_outcome(&self, item_id: QueueItemId) -> AppResult<EnqueueOutcome> {
        let item = self.items.get(&item_id).ok_or_else(|| {
            AppError::InternalError(format!("Lock held by unknown item {}", item_id))
        })?;
        Ok(EnqueueOutcome {
            item_id,
            status: item.status,
            position: self.snapshot(item).position,
            queue_size: self.queue_size(),
            plan: item.plan.clone(),
            was_existing: true,
        })
    }

    /// Cross-caller conflict first, same-caller merge second
    fn check_duplicate(
        &self,
        request: &NewEnhancement,
    ) -> AppResult<Option<EnqueueOutcome>> {
        match self.lock.check(&request.record_id) {
            LockDecision::Granted => Ok(None),
            LockDecision::Blocked {
                held_by_user_id,
                item_id,
            } => {
                if held_by_user_id != request.user_id {
                    log_info!(
                        "Enqueue for {} by {} blocked: held by {}",
                        request.record_id,
                        request.user_id,
                        held_by_user_id
                    );
                    return Err(AppError::LockConflict {
                        record_id: request.record_id.clone(),
                        held_by_user_id,
                    });
                }
                log_debug!(
                    "Enqueue for {} merged into existing item {}",
                    request.record_id,
                    item_id
                );
                self.existing_outcome(item_id).map(Some)
            }
        }
    }

    /// Drop terminal items older than the retention window
    fn purge_expired(&mut self, retention: std::time::Duration) {
        let now = Instant::now();
        let expired: Vec<QueueItemId> = self
            .terminal_since
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= retention)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.terminal_since.remove(&id);
            if self.items.remove(&id).is_some() {
                log_debug!("Purged terminal item {}", id);
            }
        }
    }

    /// Pop the next queued item and mark it processing
    fn start_next(&mut self) -> Option<WorkerJob> {
        while let Some(item_id) = self.pending.pop_front() {
            let Some(item) = self.items.get_mut(&item_id) else {
                log_warn!("Queued item {} vanished before processing", item_id);
                continue;
            };
            if item.status != QueueItemStatus::Queued {
                continue;
            }
            if let Err(e) = item.transition(QueueItemStatus::Processing) {
                log_error!("{}", e);
                continue;
            }
            LogContext::queue_transition(
                &item_id.to_string(),
                &item.record_id,
                "queued",
                "processing",
            );
            self.processing = Some(item_id);
            return Some(WorkerJob {
                item_id,
                record_id: item.record_id.clone(),
                plan: item.plan.clone(),
                force_redo: item.force_redo,
            });
        }
        None
    }

    /// Fail an item whose processing unwound and free its slot and lock.
    /// Items that reached a terminal state before the panic keep it.
    fn recover_from_panic(&mut self, job: &WorkerJob) {
        if let Some(item) = self.items.get_mut(&job.item_id) {
            if !item.status.is_terminal() {
                item.error = Some("Worker panicked while processing item".to_string());
                if let Err(e) = item.transition(QueueItemStatus::Failed) {
                    log_error!("{}", e);
                }
                LogContext::queue_transition(
                    &job.item_id.to_string(),
                    &job.record_id,
                    "processing",
                    "failed",
                );
            }
        }
        if self.processing == Some(job.item_id) {
            self.mark_terminal(job.item_id, &job.record_id);
        }
    }

    /// Terminal bookkeeping shared by the worker and queued-cancel paths
    fn mark_terminal(&mut self, item_id: QueueItemId, record_id: &str) {
        self.lock.release(record_id, item_id);
        self.terminal_since.insert(item_id, Instant::now());
        if self.processing == Some(item_id) {
            self.processing = None;
        }
    }
}

pub struct QueueManager {
    state: Mutex<QueueState>,
    pipeline: StepPipeline,
    cache: Arc<dyn CacheInvalidator>,
    config: QueueConfig,
    idle: Notify,
}

impl QueueManager {
    pub fn new(
        pipeline: StepPipeline,
        cache: Arc<dyn CacheInvalidator>,
        config: QueueConfig,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            pipeline,
            cache,
            config,
            idle: Notify::new(),
        }
    }

    /// Lock decision for a record. Only checks; nothing is held afterwards.
    pub async fn check_lock(&self, record_id: &str, user_id: &str) -> LockDecision {
        let decision = self.state.lock().await.lock.check(record_id);
        if let LockDecision::Blocked {
            held_by_user_id, ..
        } = &decision
        {
            log_debug!(
                "Lock on {} requested by {} is held by {}",
                record_id,
                user_id,
                held_by_user_id
            );
        }
        decision
    }

    /// Queue an enhancement request.
    ///
    /// A different user's active item for the same record is a
    /// `LockConflict`. The same user's active item is returned as-is with
    /// `was_existing = true`. Otherwise a new item goes to the tail of the
    /// queue and the worker is started if idle.
    pub async fn enqueue(self: &Arc<Self>, request: NewEnhancement) -> AppResult<EnqueueOutcome> {
        if request.requested_steps.is_empty() {
            return Err(AppError::ValidationError(
                "At least one enhancement step must be requested".to_string(),
            ));
        }

        // Fast path: avoid planning when the request will not create an item
        {
            let mut state = self.state.lock().await;
            state.purge_expired(self.config.terminal_retention);
            if let Some(existing) = state.check_duplicate(&request)? {
                return Ok(existing);
            }
        }

        let plan = self
            .pipeline
            .plan(&request.record_id, &request.requested_steps, request.force_redo)
            .await;

        let mut state = self.state.lock().await;
        // Re-check: another enqueue may have won the race while we planned
        if let Some(existing) = state.check_duplicate(&request)? {
            return Ok(existing);
        }

        let item = QueueItem::new(request, plan);
        let item_id = item.id;
        match state
            .lock
            .try_acquire(&item.record_id, &item.requesting_user_id, item_id)
        {
            LockDecision::Granted => {}
            LockDecision::Blocked {
                held_by_user_id, ..
            } => {
                return Err(AppError::LockConflict {
                    record_id: item.record_id,
                    held_by_user_id,
                });
            }
        }

        let position = state.pending.len();
        let plan = item.plan.clone();
        log_info!(
            "Enqueued item {} for {} (user {}, steps [{}], position {})",
            item_id,
            item.record_id,
            item.requesting_user_id,
            describe_steps(&item.requested_steps),
            position
        );
        state.pending.push_back(item_id);
        state.items.insert(item_id, item);

        let outcome = EnqueueOutcome {
            item_id,
            status: QueueItemStatus::Queued,
            position,
            queue_size: state.queue_size(),
            plan,
            was_existing: false,
        };

        if !state.worker_running {
            state.worker_running = true;
            log_debug!("Starting enhancement worker");
            tokio::spawn(Arc::clone(self).run_worker());
        }

        Ok(outcome)
    }

    pub async fn get_status(&self, item_id: QueueItemId) -> AppResult<ItemSnapshot> {
        let mut state = self.state.lock().await;
        state.purge_expired(self.config.terminal_retention);
        let item = state
            .items
            .get(&item_id)
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))?;
        Ok(state.snapshot(item))
    }

    /// Cancel an item.
    ///
    /// Queued items are removed immediately. Processing items are flagged and
    /// the worker stops before the next step; an in-flight step finishes.
    pub async fn cancel(&self, item_id: QueueItemId) -> AppResult<CancelOutcome> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))?;

        match item.status {
            QueueItemStatus::Queued => {
                item.transition(QueueItemStatus::Cancelled)?;
                let record_id = item.record_id.clone();
                state.pending.retain(|id| *id != item_id);
                state.mark_terminal(item_id, &record_id);
                LogContext::queue_transition(&item_id.to_string(), &record_id, "queued", "cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            QueueItemStatus::Processing => {
                item.cancel_requested = true;
                log_info!(
                    "Cancellation requested for processing item {} ({})",
                    item_id,
                    item.record_id
                );
                Ok(CancelOutcome::CancelRequested)
            }
            _ => Ok(CancelOutcome::AlreadyTerminal),
        }
    }

    pub async fn statistics(&self) -> QueueStatistics {
        let state = self.state.lock().await;
        let mut stats = QueueStatistics {
            worker_running: state.worker_running,
            locked_records: state.lock.len(),
            ..QueueStatistics::default()
        };
        for item in state.items.values() {
            match item.status {
                QueueItemStatus::Queued => stats.queued += 1,
                QueueItemStatus::Processing => stats.processing += 1,
                QueueItemStatus::Completed => stats.completed += 1,
                QueueItemStatus::Failed => stats.failed += 1,
                QueueItemStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub async fn is_worker_running(&self) -> bool {
        self.state.lock().await.worker_running
    }

    /// Wait until the worker has drained the queue and exited
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.state.lock().await.worker_running {
                return;
            }
            notified.await;
        }
    }

    /// Worker loop: one item at a time until the queue is empty
    async fn run_worker(self: Arc<Self>) {
        log_info!("Enhancement worker started");

        loop {
            let job = {
                let mut state = self.state.lock().await;
                match state.start_next() {
                    Some(job) => job,
                    None => {
                        state.worker_running = false;
                        if !state.lock.is_empty() {
                            log_warn!(
                                "Worker stopped with {} record lock(s) still held",
                                state.lock.len()
                            );
                        }
                        drop(state);
                        self.idle.notify_waiters();
                        log_info!("Enhancement worker stopped: queue empty");
                        return;
                    }
                }
            };

            let outcome = AssertUnwindSafe(self.process(job.clone()))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                log_error!(
                    "Worker panicked while processing item {} ({})",
                    job.item_id,
                    job.record_id
                );
                self.state.lock().await.recover_from_panic(&job);
            }
        }
    }

    async fn process(&self, job: WorkerJob) {
        let mut cancelled = false;

        for entry in &job.plan.entries {
            let step = entry.step;
            log_debug!("Item {}: {}", job.item_id, step.label());
            {
                let mut state = self.state.lock().await;
                let Some(item) = state.items.get_mut(&job.item_id) else {
                    log_error!("Processing item {} disappeared", job.item_id);
                    return;
                };
                if item.cancel_requested {
                    cancelled = true;
                    break;
                }

                if entry.will_skip {
                    let reason = entry
                        .reason
                        .clone()
                        .unwrap_or_else(|| step.existing_data_reason().to_string());
                    if let Err(e) = item.record_progress(step, StepProgress::skipped(reason)) {
                        log_error!("{}", e);
                    }
                    continue;
                }

                item.current_step = Some(step);
                if let Err(e) = item.record_progress(step, StepProgress::in_flight()) {
                    log_error!("{}", e);
                    continue;
                }
            }

            let outcome = self
                .pipeline
                .run_step(&job.record_id, step, job.force_redo)
                .await;

            let mut state = self.state.lock().await;
            if let Some(item) = state.items.get_mut(&job.item_id) {
                if let Err(e) = item.record_progress(step, outcome.to_progress()) {
                    log_error!("{}", e);
                }
                item.current_step = None;
            }
        }

        self.finalize(&job, cancelled).await;
    }

    async fn finalize(&self, job: &WorkerJob, cancelled: bool) {
        let final_status = {
            let mut state = self.state.lock().await;
            let Some(item) = state.items.get_mut(&job.item_id) else {
                log_error!("Cannot finalize missing item {}", job.item_id);
                return;
            };

            let cancelled = cancelled || item.cancel_requested;
            let status = if cancelled {
                item.error = None;
                QueueItemStatus::Cancelled
            } else {
                let verdict = StepPipeline::verdict(&item.requested_steps, &item.progress);
                item.error = verdict.error;
                verdict.status
            };

            if let Err(e) = item.transition(status) {
                log_error!("{}", e);
            }
            let steps_done = item
                .progress
                .values()
                .filter(|p| p.completed)
                .count();
            log_info!(
                "Item {} for {} finished as {} ({} step(s) completed)",
                job.item_id,
                job.record_id,
                status,
                steps_done
            );

            state.mark_terminal(job.item_id, &job.record_id);
            status
        };

        LogContext::queue_transition(
            &job.item_id.to_string(),
            &job.record_id,
            "processing",
            &final_status.to_string(),
        );

        if let Err(e) = self.cache.invalidate(&job.record_id).await {
            log_warn!("Cache invalidation failed for {}: {}", job.record_id, e);
        }
    }
}

/// Requested steps for logging and plan previews
pub fn describe_steps(steps: &[EnhancementStep]) -> String {
    steps
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::enhancement::domain::ports::{
        MockCacheInvalidator, MockRecordStore, MockStepExecutor,
    };
    use crate::modules::enhancement::domain::StepResult;
    use std::time::Duration;

    fn manager_with(
        executor: MockStepExecutor,
        store: MockRecordStore,
        cache: MockCacheInvalidator,
    ) -> Arc<QueueManager> {
        let pipeline = StepPipeline::new(Arc::new(executor), Arc::new(store));
        Arc::new(QueueManager::new(
            pipeline,
            Arc::new(cache),
            QueueConfig::default(),
        ))
    }

    fn empty_store() -> MockRecordStore {
        let mut store = MockRecordStore::new();
        store.expect_has_field().returning(|_, _| Ok(false));
        store
    }

    fn ok_cache() -> MockCacheInvalidator {
        let mut cache = MockCacheInvalidator::new();
        cache.expect_invalidate().returning(|_| Ok(()));
        cache
    }

    #[tokio::test]
    async fn test_title_skipped_values_completed() {
        let mut store = MockRecordStore::new();
        store
            .expect_has_field()
            .returning(|_, step| Ok(step == EnhancementStep::Title));

        let mut executor = MockStepExecutor::new();
        executor
            .expect_run()
            .withf(|_, step, _| *step == EnhancementStep::Values)
            .times(1)
            .returning(|_, _, _| {
                Ok(StepResult::Completed {
                    fields: serde_json::json!({"estimatedValue": 250000}),
                })
            });

        let queue = manager_with(executor, store, ok_cache());
        let request = NewEnhancement::new("R1", "alice")
            .with_steps(&[EnhancementStep::Title, EnhancementStep::Values]);

        let outcome = queue.enqueue(request).await.unwrap();
        assert!(outcome.plan.will_skip(EnhancementStep::Title));
        assert!(!outcome.was_existing);

        queue.wait_until_idle().await;

        let snapshot = queue.get_status(outcome.item_id).await.unwrap();
        assert_eq!(snapshot.status, QueueItemStatus::Completed);
        assert!(snapshot.progress[&EnhancementStep::Title].skipped);
        assert!(snapshot.progress[&EnhancementStep::Values].completed);
        assert_eq!(snapshot.progress.len(), 2);
        assert_eq!(snapshot.current_step, None);
    }

    #[tokio::test]
    async fn test_all_steps_failing_marks_item_failed() {
        let mut executor = MockStepExecutor::new();
        executor
            .expect_run()
            .returning(|_, _, _| Err(AppError::ExternalServiceError("LLM down".into())));

        let queue = manager_with(executor, empty_store(), ok_cache());
        let outcome = queue
            .enqueue(NewEnhancement::new("R2", "alice").with_steps(&[EnhancementStep::Naics]))
            .await
            .unwrap();
        queue.wait_until_idle().await;

        let snapshot = queue.get_status(outcome.item_id).await.unwrap();
        assert_eq!(snapshot.status, QueueItemStatus::Failed);
        assert!(snapshot.error.unwrap().contains("LLM down"));
    }

    #[tokio::test]
    async fn test_lock_released_after_completion() {
        let mut executor = MockStepExecutor::new();
        executor.expect_run().returning(|_, _, _| {
            Ok(StepResult::Completed {
                fields: serde_json::Value::Null,
            })
        });
        let queue = manager_with(executor, empty_store(), ok_cache());

        let first = queue
            .enqueue(NewEnhancement::new("R3", "alice"))
            .await
            .unwrap();
        queue.wait_until_idle().await;

        assert_eq!(queue.check_lock("R3", "bob").await, LockDecision::Granted);
        let second = queue
            .enqueue(NewEnhancement::new("R3", "bob"))
            .await
            .unwrap();
        assert_ne!(first.item_id, second.item_id);
        assert!(!second.was_existing);
        queue.wait_until_idle().await;
    }

    #[tokio::test]
    async fn test_cache_invalidated_on_terminal_state() {
        let mut executor = MockStepExecutor::new();
        executor.expect_run().returning(|_, _, _| {
            Ok(StepResult::Completed {
                fields: serde_json::Value::Null,
            })
        });
        let mut cache = MockCacheInvalidator::new();
        cache
            .expect_invalidate()
            .withf(|record_id| record_id == "R4")
            .times(1)
            .returning(|_| Ok(()));

        let queue = manager_with(executor, empty_store(), cache);
        queue
            .enqueue(NewEnhancement::new("R4", "alice"))
            .await
            .unwrap();
        queue.wait_until_idle().await;
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_break_worker() {
        let mut executor = MockStepExecutor::new();
        executor.expect_run().returning(|_, _, _| {
            Ok(StepResult::Completed {
                fields: serde_json::Value::Null,
            })
        });
        let mut cache = MockCacheInvalidator::new();
        cache
            .expect_invalidate()
            .returning(|_| Err(AppError::ExternalServiceError("cache offline".into())));

        let queue = manager_with(executor, empty_store(), cache);
        let a = queue.enqueue(NewEnhancement::new("R5", "u")).await.unwrap();
        let b = queue.enqueue(NewEnhancement::new("R6", "u")).await.unwrap();
        queue.wait_until_idle().await;

        for id in [a.item_id, b.item_id] {
            let snapshot = queue.get_status(id).await.unwrap();
            assert_eq!(snapshot.status, QueueItemStatus::Completed);
        }
        assert!(!queue.is_worker_running().await);
    }

    #[tokio::test]
    async fn test_empty_step_list_is_rejected() {
        let queue = manager_with(MockStepExecutor::new(), MockRecordStore::new(), ok_cache());
        let mut request = NewEnhancement::new("R7", "alice");
        request.requested_steps.clear();

        let err = queue.enqueue(request).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let queue = manager_with(MockStepExecutor::new(), MockRecordStore::new(), ok_cache());
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            queue.get_status(id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(queue.cancel(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_items_are_purged_after_retention() {
        let mut executor = MockStepExecutor::new();
        executor.expect_run().returning(|_, _, _| {
            Ok(StepResult::Completed {
                fields: serde_json::Value::Null,
            })
        });
        let queue = manager_with(executor, empty_store(), ok_cache());

        let outcome = queue
            .enqueue(NewEnhancement::new("R8", "alice"))
            .await
            .unwrap();
        queue.wait_until_idle().await;
        assert!(queue.get_status(outcome.item_id).await.is_ok());

        tokio::time::advance(QueueConfig::default().terminal_retention + Duration::from_secs(1))
            .await;
        assert!(matches!(
            queue.get_status(outcome.item_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_describe_steps() {
        assert_eq!(
            describe_steps(&[EnhancementStep::Title, EnhancementStep::SetAside]),
            "title, set_aside"
        );
    }
}
