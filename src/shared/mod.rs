// Shared Kernel
// Cross-module configuration, errors and utilities

pub mod config;          // Runtime configuration
pub mod errors;          // Shared error types
pub mod utils;           // Logging and validation helpers

// Re-exports for convenience
pub use config::{EnhancementConfig, ExecutorConfig, PollerConfig, QueueConfig};
pub use errors::{ApiError, AppError, AppResult};
