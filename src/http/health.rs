use crate::{
    http::registry::{HandlerError, RestHandler, RestRequest},
    GIT_COMMIT_HASH,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

/// REST handler reporting the running build.
#[derive(Clone, Copy, Debug, Default)]
pub struct Health;

#[async_trait]
impl RestHandler for Health {
    #[instrument(skip_all)]
    async fn handle_rest(&self, _request: RestRequest) -> Result<String, HandlerError> {
        let short_hash = if GIT_COMMIT_HASH.len() > 7 {
            &GIT_COMMIT_HASH[0..7]
        } else {
            GIT_COMMIT_HASH
        };

        let body = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "build": short_hash,
        });

        Ok(body.to_string())
    }
}
