/// Transport used by the poller to reach the enhancement routes
use crate::modules::enhancement::commands::EnqueueEnhancementRequest;
use crate::modules::enhancement::domain::{EnqueueOutcome, QueueItemId};
use crate::modules::poller::domain::entities::StatusPayload;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Enhancement item not found")]
    NotFound,

    #[error("Record is already being enhanced by user {enhancement_user_id}")]
    Conflict { enhancement_user_id: String },

    #[error("Request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether a status poll failing this way should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Decode(_) => true,
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::NotFound | TransportError::Conflict { .. } => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                404 => TransportError::NotFound,
                code => TransportError::Rejected {
                    status: code,
                    message: err.to_string(),
                },
            }
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnhancementTransport: Send + Sync {
    async fn enqueue(
        &self,
        request: &EnqueueEnhancementRequest,
    ) -> Result<EnqueueOutcome, TransportError>;

    async fn fetch_status(&self, item_id: QueueItemId) -> Result<StatusPayload, TransportError>;

    async fn cancel(&self, item_id: QueueItemId) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Decode("eof".into()).is_transient());
        assert!(TransportError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!TransportError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!TransportError::NotFound.is_transient());
    }
}
