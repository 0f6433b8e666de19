/// Domain entities for the enhancement queue
///
/// A queue item represents one request to enrich a procurement opportunity
/// record. It moves forward through `queued -> processing -> terminal` and
/// carries a per-step progress map that clients poll.
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type QueueItemId = Uuid;

/// Enhancement steps in pipeline order.
///
/// The derived `Ord` follows declaration order, so a `BTreeMap` keyed by
/// step iterates (and serializes) in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementStep {
    Title,
    Values,
    Naics,
    SetAside,
}

impl EnhancementStep {
    pub const ALL: [EnhancementStep; 4] = [
        EnhancementStep::Title,
        EnhancementStep::Values,
        EnhancementStep::Naics,
        EnhancementStep::SetAside,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementStep::Title => "title",
            EnhancementStep::Values => "values",
            EnhancementStep::Naics => "naics",
            EnhancementStep::SetAside => "set_aside",
        }
    }

    /// Human-readable label shown while the step runs
    pub fn label(&self) -> &'static str {
        match self {
            EnhancementStep::Title => "Rewriting title",
            EnhancementStep::Values => "Parsing contract value",
            EnhancementStep::Naics => "Classifying NAICS code",
            EnhancementStep::SetAside => "Standardizing set-aside",
        }
    }

    /// Reason reported when the record already carries this step's output
    pub fn existing_data_reason(&self) -> &'static str {
        match self {
            EnhancementStep::Title => "Record already has an enhanced title",
            EnhancementStep::Values => "Record already has a parsed contract value",
            EnhancementStep::Naics => "Record already has an AI-classified NAICS code",
            EnhancementStep::SetAside => "Record already has a standardized set-aside",
        }
    }

    /// De-duplicate and sort requested steps into pipeline order.
    /// `None` means every step.
    pub fn normalize(requested: Option<&[EnhancementStep]>) -> Vec<EnhancementStep> {
        match requested {
            None => Self::ALL.to_vec(),
            Some(steps) => Self::ALL
                .iter()
                .copied()
                .filter(|step| steps.contains(step))
                .collect(),
        }
    }
}

impl std::fmt::Display for EnhancementStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnhancementStep {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "title" => Ok(EnhancementStep::Title),
            "values" | "value" | "value_parsing" => Ok(EnhancementStep::Values),
            "naics" | "naics_classification" => Ok(EnhancementStep::Naics),
            "set_aside" | "setaside" | "set_aside_processing" => Ok(EnhancementStep::SetAside),
            _ => Err(AppError::ValidationError(format!(
                "Unknown enhancement step: {}",
                s
            ))),
        }
    }
}

/// Queue item lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueItemStatus::Completed | QueueItemStatus::Failed | QueueItemStatus::Cancelled
        )
    }

    /// Position in the lifecycle; terminal states share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            QueueItemStatus::Queued => 0,
            QueueItemStatus::Processing => 1,
            _ => 2,
        }
    }

    pub fn can_transition_to(&self, next: QueueItemStatus) -> bool {
        use QueueItemStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemStatus::Queued => write!(f, "queued"),
            QueueItemStatus::Processing => write!(f, "processing"),
            QueueItemStatus::Completed => write!(f, "completed"),
            QueueItemStatus::Failed => write!(f, "failed"),
            QueueItemStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-step progress entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepProgress {
    pub attempted: bool,
    pub completed: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub error: Option<String>,
}

impl StepProgress {
    pub fn in_flight() -> Self {
        Self {
            attempted: true,
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            attempted: true,
            completed: true,
            ..Self::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.attempted && !self.completed && self.error.is_some()
    }
}

pub type ProgressMap = BTreeMap<EnhancementStep, StepProgress>;

/// Run/skip decision for one step, computed before processing starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPlanEntry {
    pub step: EnhancementStep,
    pub will_skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepPlan {
    pub entries: Vec<StepPlanEntry>,
}

impl StepPlan {
    pub fn new(entries: Vec<StepPlanEntry>) -> Self {
        Self { entries }
    }

    /// Steps that will actually invoke the executor
    pub fn steps_to_run(&self) -> Vec<EnhancementStep> {
        self.entries
            .iter()
            .filter(|entry| !entry.will_skip)
            .map(|entry| entry.step)
            .collect()
    }

    pub fn will_skip(&self, step: EnhancementStep) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.step == step && entry.will_skip)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validated request to enhance a record
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnhancement {
    pub record_id: String,
    pub user_id: String,
    pub requested_steps: Vec<EnhancementStep>,
    pub force_redo: bool,
}

impl NewEnhancement {
    pub fn new(record_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            user_id: user_id.into(),
            requested_steps: EnhancementStep::ALL.to_vec(),
            force_redo: false,
        }
    }

    pub fn with_steps(mut self, steps: &[EnhancementStep]) -> Self {
        self.requested_steps = EnhancementStep::normalize(Some(steps));
        self
    }

    pub fn with_force_redo(mut self, force_redo: bool) -> Self {
        self.force_redo = force_redo;
        self
    }
}

/// One enqueued enhancement request and its lifecycle state
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub record_id: String,
    pub requesting_user_id: String,
    pub status: QueueItemStatus,
    pub requested_steps: Vec<EnhancementStep>,
    pub force_redo: bool,
    pub plan: StepPlan,
    pub progress: ProgressMap,
    pub current_step: Option<EnhancementStep>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(request: NewEnhancement, plan: StepPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id: request.record_id,
            requesting_user_id: request.user_id,
            status: QueueItemStatus::Queued,
            requested_steps: request.requested_steps,
            force_redo: request.force_redo,
            plan,
            progress: ProgressMap::new(),
            current_step: None,
            error: None,
            cancel_requested: false,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next`, rejecting anything but a forward transition
    pub fn transition(&mut self, next: QueueItemStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InternalError(format!(
                "Invalid transition for item {}: {} -> {}",
                self.id, self.status, next
            )));
        }

        let now = Utc::now();
        match next {
            QueueItemStatus::Processing => self.started_at = Some(now),
            status if status.is_terminal() => {
                self.finished_at = Some(now);
                self.current_step = None;
            }
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Write a progress entry; steps outside the request are refused
    pub fn record_progress(&mut self, step: EnhancementStep, progress: StepProgress) -> AppResult<()> {
        if !self.requested_steps.contains(&step) {
            return Err(AppError::InternalError(format!(
                "Step {} was not requested for item {}",
                step, self.id
            )));
        }
        self.progress.insert(step, progress);
        Ok(())
    }
}

/// Decision returned by the enhancement lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDecision {
    Granted,
    Blocked {
        held_by_user_id: String,
        item_id: QueueItemId,
    },
}

/// Result of an enqueue call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub item_id: QueueItemId,
    pub status: QueueItemStatus,
    pub position: usize,
    pub queue_size: usize,
    pub plan: StepPlan,
    pub was_existing: bool,
}

/// Point-in-time view of a queue item, as returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub item_id: QueueItemId,
    pub record_id: String,
    pub status: QueueItemStatus,
    pub current_step: Option<EnhancementStep>,
    pub position: usize,
    pub queue_size: usize,
    pub progress: ProgressMap,
    pub plan: StepPlan,
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Item was still queued and has been removed
    Cancelled,
    /// Item is processing; it will stop before its next step
    CancelRequested,
    AlreadyTerminal,
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Records whose enhancement lock is currently held
    pub locked_records: usize,
    pub worker_running: bool,
}
