pub mod lock;
pub mod pipeline;
pub mod queue_manager;

pub use lock::{EnhancementLock, LockHolder};
pub use pipeline::{ItemVerdict, StepOutcome, StepPipeline};
pub use queue_manager::QueueManager;
