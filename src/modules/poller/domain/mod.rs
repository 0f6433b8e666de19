pub mod entities;
pub mod transport;

pub use entities::{LocalEnhancementState, PollerEvent, StatusPayload, INITIAL_STEP_LABEL};
pub use transport::{EnhancementTransport, TransportError};
