/// Client-side view of an enhancement run
///
/// `LocalEnhancementState` is what a presentation layer renders. It is
/// seeded from the enqueue response and enriched by every successful poll.
use crate::modules::enhancement::domain::{
    EnhancementStep, EnqueueOutcome, ProgressMap, QueueItemId, QueueItemStatus, StepPlan,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label shown until the first poll answers
pub const INITIAL_STEP_LABEL: &str = "Initializing...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEnhancementState {
    pub record_id: String,
    pub item_id: QueueItemId,
    pub status: QueueItemStatus,
    pub current_step: Option<String>,
    pub queue_position: Option<usize>,
    pub queue_size: Option<usize>,
    pub progress: ProgressMap,
    /// Steps the plan says will actually run
    pub enhancement_types: Vec<EnhancementStep>,
    pub plan: StepPlan,
    pub error: Option<String>,
    /// Consecutive transport failures since the last good poll
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalEnhancementState {
    /// State shown immediately after a successful enqueue
    pub fn seeded(record_id: impl Into<String>, outcome: &EnqueueOutcome) -> Self {
        let now = Utc::now();
        Self {
            record_id: record_id.into(),
            item_id: outcome.item_id,
            status: QueueItemStatus::Queued,
            current_step: Some(INITIAL_STEP_LABEL.to_string()),
            queue_position: Some(outcome.position),
            queue_size: Some(outcome.queue_size),
            progress: ProgressMap::new(),
            enhancement_types: outcome.plan.steps_to_run(),
            plan: outcome.plan.clone(),
            error: None,
            retry_count: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Status response as the client decodes it.
///
/// Every field is optional: the server may omit values that did not change
/// since the previous poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusPayload {
    pub item_id: Option<QueueItemId>,
    pub status: Option<QueueItemStatus>,
    pub current_step: Option<String>,
    pub position: Option<usize>,
    pub queue_size: Option<usize>,
    pub progress: Option<ProgressMap>,
    pub plan: Option<StepPlan>,
    pub error: Option<String>,
}

/// State transitions published to subscribers (UI, notifications)
#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent {
    StateChanged {
        record_id: String,
        state: LocalEnhancementState,
    },
    /// First time a terminal status is observed (or synthesized)
    Terminal {
        record_id: String,
        status: QueueItemStatus,
        error: Option<String>,
    },
    /// Local state for the record was removed
    Cleared { record_id: String },
}

impl PollerEvent {
    pub fn record_id(&self) -> &str {
        match self {
            PollerEvent::StateChanged { record_id, .. }
            | PollerEvent::Terminal { record_id, .. }
            | PollerEvent::Cleared { record_id } => record_id,
        }
    }
}
