/// Client-side status poller
///
/// Tracks enhancement runs from the client's point of view: seeds local
/// state on enqueue, polls the status route on a fixed interval, merges
/// partial responses without regressing, and clears state once a run ends.
///
/// Architecture:
/// - Domain: Local state, status payload, events, transport port
/// - Application: Reconciler and the per-record polling arena
/// - Infrastructure: HTTP and in-process transports
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{Reconciler, StatusPoller};
pub use domain::{
    EnhancementTransport, LocalEnhancementState, PollerEvent, StatusPayload, TransportError,
};
pub use infrastructure::{HttpEnhancementTransport, LocalEnhancementTransport};
