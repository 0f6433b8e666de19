pub mod reconciler;
pub mod status_poller;

pub use reconciler::Reconciler;
pub use status_poller::StatusPoller;
