use super::{GridInstantMessage, OfflineMessageStore};
use crate::http::{HandlerError, RestHandler, RestRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// REST surface for offline messages:
///
/// * `GET /offline/<agent-id>` drains and returns the agent's messages as JSON.
/// * `POST /offline` with a JSON message stores it and answers `true` or `false`.
pub struct OfflineMessagesHandler {
    store: Arc<dyn OfflineMessageStore>,
}

impl OfflineMessagesHandler {
    #[must_use]
    pub fn new(store: Arc<dyn OfflineMessageStore>) -> Self {
        Self { store }
    }

    async fn fetch(&self, url: &str) -> Result<String, HandlerError> {
        let path = url.split('?').next().unwrap_or_default();
        let agent = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .nth(1)
            .ok_or_else(|| HandlerError::BadRequest("missing agent id".to_string()))?;
        let agent_id = Uuid::parse_str(agent)
            .map_err(|e| HandlerError::BadRequest(format!("invalid agent id {agent}: {e}")))?;

        let messages = self.store.offline_messages(agent_id).await?;
        debug!(%agent_id, count = messages.len(), "offline messages delivered");

        serde_json::to_string(&messages).map_err(|e| HandlerError::Internal(e.into()))
    }

    async fn keep(&self, body: &str) -> Result<String, HandlerError> {
        let message: GridInstantMessage = serde_json::from_str(body)
            .map_err(|e| HandlerError::BadRequest(format!("invalid message: {e}")))?;

        let kept = self.store.add_offline_message(message).await?;
        Ok(kept.to_string())
    }
}

#[async_trait]
impl RestHandler for OfflineMessagesHandler {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn handle_rest(&self, request: RestRequest) -> Result<String, HandlerError> {
        match request.method.as_str() {
            "GET" => self.fetch(&request.url).await,
            "POST" => self.keep(&request.body).await,
            other => Err(HandlerError::BadRequest(format!("unsupported method {other}"))),
        }
    }
}
