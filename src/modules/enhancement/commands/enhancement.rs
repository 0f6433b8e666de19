//! Enhancement boundary commands
//!
//! Framework-agnostic handlers behind the three enhancement routes:
//! - `POST enqueue`
//! - `GET status/{itemId}`
//! - `POST status/{itemId}/cancel`
//!
//! Requests are validated before the queue is touched. Failures come back as
//! `ApiError`, which knows its HTTP status and JSON body.

use crate::modules::enhancement::application::QueueManager;
use crate::modules::enhancement::domain::{
    CancelOutcome, EnhancementStep, EnqueueOutcome, ItemSnapshot, NewEnhancement,
};
use crate::shared::errors::{ApiError, AppError, AppResult};
use crate::shared::utils::validation::Validator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueEnhancementRequest {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_redo: Option<bool>,
    pub user_id: String,
}

impl EnqueueEnhancementRequest {
    pub fn new(record_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            requested_steps: None,
            force_redo: None,
            user_id: user_id.into(),
        }
    }

    /// Validate and convert into the domain request
    pub fn into_domain(self) -> AppResult<NewEnhancement> {
        let record_id = self.record_id.trim().to_string();
        let user_id = self.user_id.trim().to_string();
        Validator::validate_record_id(&record_id)?;
        Validator::validate_user_id(&user_id)?;

        let requested_steps = match self.requested_steps {
            None => EnhancementStep::ALL.to_vec(),
            Some(names) => {
                let parsed = names
                    .iter()
                    .map(|name| name.parse::<EnhancementStep>())
                    .collect::<AppResult<Vec<_>>>()?;
                let steps = EnhancementStep::normalize(Some(&parsed));
                if steps.is_empty() {
                    return Err(AppError::ValidationError(
                        "requestedSteps cannot be empty".to_string(),
                    ));
                }
                steps
            }
        };

        Ok(NewEnhancement {
            record_id,
            user_id,
            requested_steps,
            force_redo: self.force_redo.unwrap_or(false),
        })
    }
}

/// `{cancelled: true}` or `{alreadyTerminal: true}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_terminal: Option<bool>,
}

impl From<CancelOutcome> for CancelResponse {
    fn from(outcome: CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Cancelled | CancelOutcome::CancelRequested => Self {
                cancelled: Some(true),
                already_terminal: None,
            },
            CancelOutcome::AlreadyTerminal => Self {
                cancelled: None,
                already_terminal: Some(true),
            },
        }
    }
}

/// Queue an enhancement for a record
pub async fn enqueue_enhancement(
    request: EnqueueEnhancementRequest,
    queue: &Arc<QueueManager>,
) -> Result<EnqueueOutcome, ApiError> {
    log::debug!("Command: enqueue_enhancement for record {}", request.record_id);

    let request = request.into_domain().map_err(|e| {
        log::warn!("Rejected enqueue request: {}", e);
        ApiError::from(e)
    })?;

    queue.enqueue(request).await.map_err(ApiError::from)
}

/// Current state of a queue item
pub async fn get_enhancement_status(
    item_id: &str,
    queue: &QueueManager,
) -> Result<ItemSnapshot, ApiError> {
    let item_id = Validator::validate_item_id(item_id)?;
    queue.get_status(item_id).await.map_err(ApiError::from)
}

/// Cancel a queue item
pub async fn cancel_enhancement(
    item_id: &str,
    queue: &QueueManager,
) -> Result<CancelResponse, ApiError> {
    let item_id = Validator::validate_item_id(item_id)?;
    log::debug!("Command: cancel_enhancement for item {}", item_id);

    queue
        .cancel(item_id)
        .await
        .map(CancelResponse::from)
        .map_err(|e| {
            log::error!("Failed to cancel item {}: {}", item_id, e);
            ApiError::from(e)
        })
}
