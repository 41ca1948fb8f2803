//! Handler registry for the dispatch server.
//!
//! Two independent maps: REST handlers keyed by the first path segment and
//! XML-RPC handlers keyed by method name. The first registration of a key
//! wins; later attempts are rejected without side effects.

use crate::xmlrpc::{MethodCall, MethodResponse};
use async_trait::async_trait;
use std::{
    collections::{hash_map::Entry, HashMap},
    future::Future,
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A REST-style call as seen by a [`RestHandler`].
#[derive(Clone, Debug)]
pub struct RestRequest {
    pub body: String,
    /// Path and query exactly as requested.
    pub url: String,
    pub method: String,
}

#[async_trait]
pub trait RestHandler: Send + Sync {
    async fn handle_rest(&self, request: RestRequest) -> Result<String, HandlerError>;
}

#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle_rpc(&self, call: MethodCall) -> Result<MethodResponse, HandlerError>;
}

#[async_trait]
impl<F, Fut> RestHandler for F
where
    F: Fn(RestRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, HandlerError>> + Send + 'static,
{
    async fn handle_rest(&self, request: RestRequest) -> Result<String, HandlerError> {
        self(request).await
    }
}

#[async_trait]
impl<F, Fut> RpcHandler for F
where
    F: Fn(MethodCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<MethodResponse, HandlerError>> + Send + 'static,
{
    async fn handle_rpc(&self, call: MethodCall) -> Result<MethodResponse, HandlerError> {
        self(call).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    rest: HashMap<String, Arc<dyn RestHandler>>,
    rpc: HashMap<String, Arc<dyn RpcHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `path` already has a handler.
    pub fn add_rest_handler(&mut self, path: impl Into<String>, handler: Arc<dyn RestHandler>) -> bool {
        match self.rest.entry(path.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
        }
    }

    /// Returns `false` if `method` already has a handler.
    pub fn add_rpc_handler(&mut self, method: impl Into<String>, handler: Arc<dyn RpcHandler>) -> bool {
        match self.rpc.entry(method.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
        }
    }

    #[must_use]
    pub fn rest_handler(&self, path: &str) -> Option<&Arc<dyn RestHandler>> {
        self.rest.get(path)
    }

    #[must_use]
    pub fn rpc_handler(&self, method: &str) -> Option<&Arc<dyn RpcHandler>> {
        self.rpc.get(method)
    }

    #[must_use]
    pub fn rest_paths(&self) -> Vec<&str> {
        self.rest.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn rpc_methods(&self) -> Vec<&str> {
        self.rpc.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("rest", &self.rest_paths())
            .field("rpc", &self.rpc_methods())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::xmlrpc::Value;

    fn rest_reply(reply: &'static str) -> Arc<dyn RestHandler> {
        Arc::new(move |_request: RestRequest| async move {
            Ok::<_, HandlerError>(reply.to_string())
        })
    }

    fn rpc_reply(reply: &'static str) -> Arc<dyn RpcHandler> {
        Arc::new(move |_call: MethodCall| async move {
            Ok::<_, HandlerError>(MethodResponse::new(reply))
        })
    }

    #[tokio::test]
    async fn first_rest_registration_wins() -> anyhow::Result<()> {
        let mut registry = HandlerRegistry::new();
        assert!(registry.add_rest_handler("health", rest_reply("first")));
        assert!(!registry.add_rest_handler("health", rest_reply("second")));

        let handler = registry.rest_handler("health").unwrap();
        let reply = handler
            .handle_rest(RestRequest {
                body: String::new(),
                url: "/health".to_string(),
                method: "GET".to_string(),
            })
            .await?;
        assert_eq!(reply, "first");
        Ok(())
    }

    #[tokio::test]
    async fn first_rpc_registration_wins() -> anyhow::Result<()> {
        let mut registry = HandlerRegistry::new();
        assert!(registry.add_rpc_handler("login_to_simulator", rpc_reply("first")));
        assert!(!registry.add_rpc_handler("login_to_simulator", rpc_reply("second")));

        let handler = registry.rpc_handler("login_to_simulator").unwrap();
        let response = handler
            .handle_rpc(MethodCall {
                method_name: "login_to_simulator".to_string(),
                params: Vec::new(),
            })
            .await?;
        assert_eq!(response.value, Value::from("first"));
        Ok(())
    }

    #[test]
    fn rest_and_rpc_keys_are_independent() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.add_rest_handler("same", rest_reply("rest")));
        assert!(registry.add_rpc_handler("same", rpc_reply("rpc")));
        assert!(registry.rest_handler("same").is_some());
        assert!(registry.rpc_handler("same").is_some());
        assert!(registry.rest_handler("other").is_none());
        assert!(registry.rpc_handler("other").is_none());
    }
}
