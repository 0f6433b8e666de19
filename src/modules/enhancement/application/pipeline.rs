/// Step pipeline: plans which enhancement steps run and executes them one at a time
///
/// Key responsibilities:
/// - Build the step plan before processing (skip steps whose field already exists)
/// - Run a single step through the executor, containing errors and panics
/// - Decide an item's terminal status from its progress map
use crate::modules::enhancement::domain::{
    EnhancementStep, ProgressMap, QueueItemStatus, RecordStore, StepExecutor, StepPlan,
    StepPlanEntry, StepProgress, StepResult,
};
use crate::shared::errors::AppError;
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::{log_debug, log_error, log_warn};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Outcome of running one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn to_progress(&self) -> StepProgress {
        match self {
            StepOutcome::Completed => StepProgress::completed(),
            StepOutcome::Skipped { reason } => {
                // The executor was invoked, so the step counts as attempted
                StepProgress {
                    attempted: true,
                    ..StepProgress::skipped(reason.clone())
                }
            }
            StepOutcome::Failed { error } => StepProgress::failed(error.clone()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Skipped { .. } => "skipped",
            StepOutcome::Failed { .. } => "failed",
        }
    }
}

/// Terminal status plus the non-fatal error summary for an item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemVerdict {
    pub status: QueueItemStatus,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct StepPipeline {
    executor: Arc<dyn StepExecutor>,
    record_store: Arc<dyn RecordStore>,
}

impl StepPipeline {
    pub fn new(executor: Arc<dyn StepExecutor>, record_store: Arc<dyn RecordStore>) -> Self {
        Self {
            executor,
            record_store,
        }
    }

    /// Decide per requested step whether it will run.
    ///
    /// A step is skipped when the record already has its field and
    /// `force_redo` is off. A failed lookup counts as "field absent".
    pub async fn plan(
        &self,
        record_id: &str,
        requested_steps: &[EnhancementStep],
        force_redo: bool,
    ) -> StepPlan {
        let mut entries = Vec::with_capacity(requested_steps.len());

        for step in EnhancementStep::normalize(Some(requested_steps)) {
            if force_redo {
                entries.push(StepPlanEntry {
                    step,
                    will_skip: false,
                    reason: None,
                });
                continue;
            }

            let has_field = match self.record_store.has_field(record_id, step).await {
                Ok(has_field) => has_field,
                Err(e) => {
                    log_warn!(
                        "Could not check {} field for {}, planning to run it: {}",
                        step,
                        record_id,
                        e
                    );
                    false
                }
            };

            entries.push(StepPlanEntry {
                step,
                will_skip: has_field,
                reason: has_field.then(|| step.existing_data_reason().to_string()),
            });
        }

        log_debug!(
            "Planned {} step(s) for {}: {} to run",
            entries.len(),
            record_id,
            entries.iter().filter(|e| !e.will_skip).count()
        );

        StepPlan::new(entries)
    }

    /// Run one step. Errors and panics from the executor become `Failed`.
    pub async fn run_step(
        &self,
        record_id: &str,
        step: EnhancementStep,
        force_redo: bool,
    ) -> StepOutcome {
        let timer = TimedOperation::new(&format!("{} step for {}", step, record_id));

        // The call is made inside the future so a panic on invocation is caught too
        let call = async { self.executor.run(record_id, step, force_redo).await };
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(StepResult::Completed { .. })) => StepOutcome::Completed,
            Ok(Ok(StepResult::Skipped { reason })) => StepOutcome::Skipped { reason },
            Ok(Err(e)) => StepOutcome::Failed {
                error: e.to_string(),
            },
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log_error!("Executor panicked on {} for {}: {}", step, record_id, message);
                StepOutcome::Failed {
                    error: AppError::StepFailure(format!("executor panicked: {}", message))
                        .to_string(),
                }
            }
        };

        let duration = timer.elapsed_ms();
        LogContext::step_outcome(record_id, step.as_str(), outcome.label(), Some(duration));
        if let StepOutcome::Failed { error } = &outcome {
            log_warn!("Step {} failed for {}: {}", step, record_id, error);
        }

        outcome
    }

    /// Terminal status for a finished (not cancelled) item.
    ///
    /// `failed` only when every requested step failed; otherwise
    /// `completed`, with a summary of any failed steps.
    pub fn verdict(requested_steps: &[EnhancementStep], progress: &ProgressMap) -> ItemVerdict {
        let failures: Vec<String> = requested_steps
            .iter()
            .filter_map(|step| {
                progress
                    .get(step)
                    .filter(|p| p.is_failure())
                    .map(|p| format!("{}: {}", step, p.error.as_deref().unwrap_or("unknown error")))
            })
            .collect();

        if failures.is_empty() {
            return ItemVerdict {
                status: QueueItemStatus::Completed,
                error: None,
            };
        }

        if !requested_steps.is_empty() && failures.len() == requested_steps.len() {
            return ItemVerdict {
                status: QueueItemStatus::Failed,
                error: Some(format!("All steps failed: {}", failures.join("; "))),
            };
        }

        ItemVerdict {
            status: QueueItemStatus::Completed,
            error: Some(format!(
                "{} of {} steps failed: {}",
                failures.len(),
                requested_steps.len(),
                failures.join("; ")
            )),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
