//! Client-side status poller
//!
//! Every tracked record owns one polling task and a `CancellationToken`
//! derived from the poller's root token. Tasks are kept in a `DashMap`
//! arena keyed by record id together with the local state they reconcile.
//! Dropping the poller (or calling `shutdown`) cancels every task.
//!
//! State changes are published on a broadcast channel; presentation layers
//! subscribe instead of being called imperatively.

use crate::modules::enhancement::commands::EnqueueEnhancementRequest;
use crate::modules::enhancement::domain::{CacheInvalidator, EnqueueOutcome, QueueItemId};
use crate::modules::poller::application::reconciler::Reconciler;
use crate::modules::poller::domain::{
    EnhancementTransport, LocalEnhancementState, PollerEvent, StatusPayload, TransportError,
};
use crate::shared::config::PollerConfig;
use crate::shared::utils::logger::LogContext;
use crate::{log_debug, log_info, log_warn};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One tracked record: its timer and reconciled state
struct Tracker {
    token: CancellationToken,
    /// Distinguishes a restarted tracker from the one it replaced
    generation: u64,
    item_id: QueueItemId,
    state: LocalEnhancementState,
}

/// What the loop should do after a poll was applied
enum PollStep {
    Continue,
    Terminal,
    /// Tracker was cancelled or replaced
    Detached,
}

struct PollerInner {
    transport: Arc<dyn EnhancementTransport>,
    cache: Arc<dyn CacheInvalidator>,
    config: PollerConfig,
    trackers: DashMap<String, Tracker>,
    events: broadcast::Sender<PollerEvent>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

impl StatusPoller {
    pub fn new(
        transport: Arc<dyn EnhancementTransport>,
        cache: Arc<dyn CacheInvalidator>,
        config: PollerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(PollerInner {
                transport,
                cache,
                config,
                trackers: DashMap::new(),
                events,
                next_generation: AtomicU64::new(0),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Enqueue through the transport and start tracking the record
    pub async fn enhance(
        &self,
        request: EnqueueEnhancementRequest,
    ) -> Result<LocalEnhancementState, TransportError> {
        let outcome = self.inner.transport.enqueue(&request).await?;
        Ok(self.start(request.record_id.trim(), &outcome))
    }

    /// Seed local state from an enqueue response and begin polling.
    ///
    /// Must be called from within a tokio runtime. Restarting a record that
    /// already tracks the same item keeps the existing state.
    pub fn start(&self, record_id: &str, outcome: &EnqueueOutcome) -> LocalEnhancementState {
        if let Some(existing) = self.inner.trackers.get(record_id) {
            if existing.item_id == outcome.item_id && !existing.token.is_cancelled() {
                return existing.state.clone();
            }
        }

        let state = LocalEnhancementState::seeded(record_id, outcome);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.root.child_token();

        let replaced = self.inner.trackers.insert(
            record_id.to_string(),
            Tracker {
                token: token.clone(),
                generation,
                item_id: outcome.item_id,
                state: state.clone(),
            },
        );
        if let Some(old) = replaced {
            log_debug!("Replacing poller for {} (item {})", record_id, old.item_id);
            old.token.cancel();
        }

        LogContext::poll_event(record_id, &format!("tracking item {}", outcome.item_id));
        self.inner.emit(PollerEvent::StateChanged {
            record_id: record_id.to_string(),
            state: state.clone(),
        });

        tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            record_id.to_string(),
            outcome.item_id,
            generation,
            token,
        ));

        state
    }

    /// Local snapshot for a record, if it is tracked
    pub fn get_state(&self, record_id: &str) -> Option<LocalEnhancementState> {
        self.inner
            .trackers
            .get(record_id)
            .map(|tracker| tracker.state.clone())
    }

    pub fn is_tracking(&self, record_id: &str) -> bool {
        self.inner.trackers.contains_key(record_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.trackers.len()
    }

    /// Stop polling, clear local state, then ask the server to cancel.
    ///
    /// Local state is cleared even if the server call fails. Returns false
    /// when the record was not tracked.
    pub async fn cancel(&self, record_id: &str) -> bool {
        let Some((_, tracker)) = self.inner.trackers.remove(record_id) else {
            return false;
        };

        tracker.token.cancel();
        self.inner.emit(PollerEvent::Cleared {
            record_id: record_id.to_string(),
        });
        LogContext::poll_event(record_id, "cancelled locally");

        if let Err(e) = self.inner.transport.cancel(tracker.item_id).await {
            log_warn!(
                "Server-side cancel for item {} ({}) failed: {}",
                tracker.item_id,
                record_id,
                e
            );
        }
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollerEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel every timer and drop all local state
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        let count = self.inner.trackers.len();
        self.inner.trackers.clear();
        log_info!("Status poller shut down ({} tracked records dropped)", count);
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.inner.root.cancel();
    }
}

impl PollerInner {
    fn emit(&self, event: PollerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Apply one poll result to the tracker if it is still current
    fn apply_poll(
        &self,
        record_id: &str,
        generation: u64,
        result: Result<StatusPayload, TransportError>,
    ) -> PollStep {
        let Some(mut tracker) = self.trackers.get_mut(record_id) else {
            return PollStep::Detached;
        };
        if tracker.generation != generation || tracker.token.is_cancelled() {
            return PollStep::Detached;
        }

        let state = &mut tracker.state;
        let became_terminal = match result {
            Ok(payload) => Reconciler::merge(state, payload),
            Err(TransportError::NotFound) => {
                log_warn!("Item {} for {} no longer exists", state.item_id, record_id);
                Reconciler::synthesize_failure(
                    state,
                    "Enhancement item is no longer known to the server",
                );
                true
            }
            Err(e) if !e.is_transient() => {
                log_warn!("Status poll for {} rejected: {}", record_id, e);
                Reconciler::synthesize_failure(state, format!("Status check rejected: {}", e));
                true
            }
            Err(e) => {
                let failures = Reconciler::record_transport_failure(state);
                log_warn!(
                    "Status poll for {} failed ({}/{}): {}",
                    record_id,
                    failures,
                    self.config.max_consecutive_failures,
                    e
                );
                if failures >= self.config.max_consecutive_failures {
                    Reconciler::synthesize_failure(
                        state,
                        format!(
                            "Lost contact with the enhancement service after {} attempts: {}",
                            failures, e
                        ),
                    );
                    true
                } else {
                    false
                }
            }
        };

        let snapshot = state.clone();
        drop(tracker);

        self.emit(PollerEvent::StateChanged {
            record_id: record_id.to_string(),
            state: snapshot.clone(),
        });

        if became_terminal {
            LogContext::poll_event(record_id, &format!("reached {}", snapshot.status));
            self.emit(PollerEvent::Terminal {
                record_id: record_id.to_string(),
                status: snapshot.status,
                error: snapshot.error,
            });
            PollStep::Terminal
        } else {
            PollStep::Continue
        }
    }

    /// Drop local state and invalidate caches, once per tracker generation
    async fn cleanup(&self, record_id: &str, generation: u64) {
        let removed = self
            .trackers
            .remove_if(record_id, |_, tracker| tracker.generation == generation);
        if removed.is_none() {
            return;
        }

        self.emit(PollerEvent::Cleared {
            record_id: record_id.to_string(),
        });
        LogContext::poll_event(record_id, "cleared");

        if let Err(e) = self.cache.invalidate(record_id).await {
            log_warn!("Cache invalidation for {} failed: {}", record_id, e);
        }
    }
}

async fn poll_loop(
    inner: Arc<PollerInner>,
    record_id: String,
    item_id: QueueItemId,
    generation: u64,
    token: CancellationToken,
) {
    let period = inner.config.poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = inner.transport.fetch_status(item_id) => result,
        };

        match inner.apply_poll(&record_id, generation, result) {
            PollStep::Continue => {}
            PollStep::Terminal => break,
            PollStep::Detached => return,
        }
    }

    tokio::select! {
        _ = token.cancelled() => return,
        _ = sleep(inner.config.cleanup_delay) => {}
    }

    inner.cleanup(&record_id, generation).await;
}
