/// Enhancement queue module
///
/// Accepts enrichment requests for procurement opportunity records and runs
/// them one at a time through the step pipeline:
/// title rewrite, contract value parsing, NAICS classification and
/// set-aside standardization.
///
/// Architecture:
/// - Domain: Entities and collaborator ports (executor, record store, cache)
/// - Application: Enhancement lock, step pipeline, queue manager + worker
/// - Infrastructure: Rate-limited executor decorator and in-memory adapters
/// - Commands: Boundary handlers for enqueue / status / cancel
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

// Re-exports for easy access
pub use application::{QueueManager, StepPipeline};
pub use domain::{
    entities::{
        CancelOutcome, EnhancementStep, EnqueueOutcome, ItemSnapshot, LockDecision,
        NewEnhancement, QueueItemId, QueueItemStatus, QueueStatistics, StepPlan, StepProgress,
    },
    ports::{CacheInvalidator, RecordStore, StepExecutor, StepResult},
};
pub use infrastructure::{InMemoryRecordStore, LoggingCacheInvalidator, RateLimitedExecutor};
