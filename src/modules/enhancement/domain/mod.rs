pub mod entities;
pub mod ports;

pub use entities::{
    CancelOutcome, EnhancementStep, EnqueueOutcome, ItemSnapshot, LockDecision, NewEnhancement,
    ProgressMap, QueueItem, QueueItemId, QueueItemStatus, QueueStatistics, StepPlan,
    StepPlanEntry, StepProgress,
};
pub use ports::{CacheInvalidator, RecordStore, StepExecutor, StepResult};
