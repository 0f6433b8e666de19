/// Collaborator interfaces consumed by the enhancement queue
///
/// The LLM calls, the record persistence layer and the downstream caches
/// live outside this crate. The queue only sees these traits.
use crate::modules::enhancement::domain::entities::EnhancementStep;
use crate::shared::errors::AppResult;
use async_trait::async_trait;

/// What the executor reports for a step that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Fields produced by the step (already persisted by the executor's side)
    Completed { fields: serde_json::Value },
    /// The executor decided there was nothing to do
    Skipped { reason: String },
}

/// Performs one enrichment operation (title rewrite, value parsing, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run(
        &self,
        record_id: &str,
        step: EnhancementStep,
        force_redo: bool,
    ) -> AppResult<StepResult>;
}

/// Read access to a record's enriched fields, used for skip planning
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether the record already holds a usable value for this step's field
    async fn has_field(&self, record_id: &str, step: EnhancementStep) -> AppResult<bool>;
}

/// Downstream cache that must be refreshed once a record's enhancement ends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, record_id: &str) -> AppResult<()>;
}
