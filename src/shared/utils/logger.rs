use log::{debug, info};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system
/// This should be called once at application startup
pub fn init_logger() {
    INIT.call_once(|| {
        let result = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info) // Default level
            .filter_module("enhancer_lib", log::LevelFilter::Debug) // More verbose for our crate
            .filter_module("reqwest", log::LevelFilter::Warn) // Reduce HTTP noise
            .filter_module("hyper", log::LevelFilter::Warn)
            .filter_module("tokio", log::LevelFilter::Warn) // Reduce tokio noise
            .format_timestamp_secs()
            .format_target(false)
            .format_module_path(false)
            .try_init();

        // Another logger (e.g. a test harness) may already be installed
        if result.is_ok() {
            info!("Logging system initialized");
        }
    });
}

/// Macro for structured logging with context
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

/// Structured logging helpers for common patterns
pub struct LogContext;

impl LogContext {
    /// Log a queue item lifecycle transition
    pub fn queue_transition(item_id: &str, record_id: &str, from: &str, to: &str) {
        info!("Queue: item {} ({}) {} -> {}", item_id, record_id, from, to);
    }

    /// Log a step result
    pub fn step_outcome(record_id: &str, step: &str, outcome: &str, duration_ms: Option<u64>) {
        match duration_ms {
            Some(duration) => info!(
                "Step: {} on {} {} in {}ms",
                step, record_id, outcome, duration
            ),
            None => debug!("Step: {} on {} {}", step, record_id, outcome),
        }
    }

    /// Log poller activity for a tracked record
    pub fn poll_event(record_id: &str, event: &str) {
        debug!("Poller: {} {}", record_id, event);
    }
}

/// Helper for timing operations
pub struct TimedOperation {
    start: std::time::Instant,
}

impl TimedOperation {
    pub fn new(operation: &str) -> Self {
        debug!("Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds elapsed without logging
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
