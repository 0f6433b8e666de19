pub mod enhancement;

pub use enhancement::{
    cancel_enhancement, enqueue_enhancement, get_enhancement_status, CancelResponse,
    EnqueueEnhancementRequest,
};
