use crate::modules::enhancement::commands::EnqueueEnhancementRequest;
use crate::modules::enhancement::domain::{EnqueueOutcome, QueueItemId};
use crate::modules::poller::domain::{EnhancementTransport, StatusPayload, TransportError};
use crate::shared::config::PollerConfig;
use crate::shared::errors::{AppResult, ConflictBody};
use crate::log_debug;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const USER_AGENT: &str = "Opportunity-Enhancer/1.0";

/// JSON over HTTP against the enhancement routes
pub struct HttpEnhancementTransport {
    client: Client,
    base_url: String,
}

impl HttpEnhancementTransport {
    pub fn new(config: &PollerConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn status_url(&self, item_id: QueueItemId) -> String {
        format!(
            "{}/status/{}",
            self.base_url,
            urlencoding::encode(&item_id.to_string())
        )
    }

    /// Map non-success statuses onto transport errors, decode the rest
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        match status {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound),
            StatusCode::CONFLICT => {
                let body = response.json::<ConflictBody>().await?;
                Err(TransportError::Conflict {
                    enhancement_user_id: body.enhancement_user_id,
                })
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(TransportError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl EnhancementTransport for HttpEnhancementTransport {
    async fn enqueue(
        &self,
        request: &EnqueueEnhancementRequest,
    ) -> Result<EnqueueOutcome, TransportError> {
        let url = format!("{}/enqueue", self.base_url);
        log_debug!("POST {} for record {}", url, request.record_id);

        let response = self.client.post(&url).json(request).send().await?;
        Self::decode(response).await
    }

    async fn fetch_status(&self, item_id: QueueItemId) -> Result<StatusPayload, TransportError> {
        let response = self.client.get(self.status_url(item_id)).send().await?;
        Self::decode(response).await
    }

    async fn cancel(&self, item_id: QueueItemId) -> Result<(), TransportError> {
        let url = format!("{}/cancel", self.status_url(item_id));
        let response = self.client.post(&url).send().await?;
        Self::decode::<serde_json::Value>(response).await.map(|_| ())
    }
}
