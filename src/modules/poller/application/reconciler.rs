/// Merges partial status responses into local state
///
/// Fields the server omits keep their previous value. `current_step` and
/// `error` are replaced on every poll. Status never moves backwards.
use crate::modules::enhancement::domain::QueueItemStatus;
use crate::modules::poller::domain::{LocalEnhancementState, StatusPayload};
use chrono::Utc;

pub struct Reconciler;

impl Reconciler {
    /// Apply one poll response. Returns true when the status became
    /// terminal with this merge.
    pub fn merge(state: &mut LocalEnhancementState, payload: StatusPayload) -> bool {
        let was_terminal = state.is_terminal();

        if let Some(status) = payload.status {
            if status.rank() >= state.status.rank() && !was_terminal {
                state.status = status;
            }
        }

        state.current_step = payload.current_step;
        state.error = payload.error;

        if let Some(position) = payload.position {
            state.queue_position = Some(position);
        }
        if let Some(queue_size) = payload.queue_size {
            state.queue_size = Some(queue_size);
        }
        if let Some(progress) = payload.progress {
            state.progress.extend(progress);
        }
        if let Some(plan) = payload.plan {
            if !plan.is_empty() {
                state.enhancement_types = plan.steps_to_run();
                state.plan = plan;
            }
        }

        state.retry_count = 0;
        state.updated_at = Utc::now();

        !was_terminal && state.is_terminal()
    }

    /// Record a failed poll; returns the new consecutive failure count
    pub fn record_transport_failure(state: &mut LocalEnhancementState) -> u32 {
        state.retry_count = state.retry_count.saturating_add(1);
        state.updated_at = Utc::now();
        state.retry_count
    }

    /// Force a local `failed` state with a diagnostic message
    pub fn synthesize_failure(state: &mut LocalEnhancementState, message: impl Into<String>) {
        state.status = QueueItemStatus::Failed;
        state.current_step = None;
        state.error = Some(message.into());
        state.updated_at = Utc::now();
    }
}
