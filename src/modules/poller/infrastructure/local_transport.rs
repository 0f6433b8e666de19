use crate::modules::enhancement::application::QueueManager;
use crate::modules::enhancement::commands::{
    cancel_enhancement, enqueue_enhancement, get_enhancement_status, EnqueueEnhancementRequest,
};
use crate::modules::enhancement::domain::{EnqueueOutcome, QueueItemId};
use crate::modules::poller::domain::{EnhancementTransport, StatusPayload, TransportError};
use crate::shared::errors::ApiError;
use async_trait::async_trait;
use std::sync::Arc;

/// In-process transport that calls the boundary commands directly.
///
/// Goes through the same validation and JSON shapes as the HTTP routes, so
/// a client wired to it behaves like one talking to a remote server.
pub struct LocalEnhancementTransport {
    queue: Arc<QueueManager>,
}

impl LocalEnhancementTransport {
    pub fn new(queue: Arc<QueueManager>) -> Self {
        Self { queue }
    }
}

impl From<ApiError> for TransportError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound { .. } => TransportError::NotFound,
            ApiError::Conflict {
                held_by_user_id, ..
            } => TransportError::Conflict {
                enhancement_user_id: held_by_user_id,
            },
            other => TransportError::Rejected {
                status: other.status_code(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl EnhancementTransport for LocalEnhancementTransport {
    async fn enqueue(
        &self,
        request: &EnqueueEnhancementRequest,
    ) -> Result<EnqueueOutcome, TransportError> {
        Ok(enqueue_enhancement(request.clone(), &self.queue).await?)
    }

    async fn fetch_status(&self, item_id: QueueItemId) -> Result<StatusPayload, TransportError> {
        let snapshot = get_enhancement_status(&item_id.to_string(), &self.queue).await?;
        // Same wire shape the HTTP route returns
        let body = serde_json::to_value(snapshot)?;
        Ok(serde_json::from_value(body)?)
    }

    async fn cancel(&self, item_id: QueueItemId) -> Result<(), TransportError> {
        cancel_enhancement(&item_id.to_string(), &self.queue).await?;
        Ok(())
    }
}
