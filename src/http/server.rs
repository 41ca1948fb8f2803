//! The request dispatch server.
//!
//! One HTTP endpoint multiplexes three protocols onto the handler registry,
//! keyed by the declared content type. Every response closes the connection.

use crate::{
    http::{
        protocol::{normalize_declared_encoding, rest_key, Protocol},
        registry::{HandlerError, HandlerRegistry, RestHandler, RestRequest, RpcHandler},
    },
    xmlrpc::{MethodCall, MethodResponse, Value},
};
use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{
        header::{CONNECTION, CONTENT_TYPE},
        HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Router,
};
use std::{
    any::Any,
    collections::BTreeMap,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::timeout};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, warn, Span};
use ulid::Ulid;

const DEFAULT_HANDLER_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    address: IpAddr,
    port: u16,
    handler_timeout: Duration,
    max_body_bytes: usize,
}

impl ServerConfig {
    /// Listen on every IPv4 address of the host.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            handler_timeout: Duration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECONDS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }
}

/// Dispatch server in its registration phase. Handlers must be registered
/// before [`HttpServer::start`], which freezes the registry.
#[derive(Debug)]
pub struct HttpServer {
    config: ServerConfig,
    registry: HandlerRegistry,
}

impl HttpServer {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
        }
    }

    /// Returns `false`, leaving the existing handler in place, if `path` is taken.
    pub fn register_rest_handler(&mut self, path: &str, handler: Arc<dyn RestHandler>) -> bool {
        let added = self.registry.add_rest_handler(path, handler);
        if added {
            debug!(path, "REST handler registered");
        } else {
            warn!(path, "REST handler already registered");
        }
        added
    }

    /// Returns `false`, leaving the existing handler in place, if `method` is taken.
    pub fn register_rpc_handler(&mut self, method: &str, handler: Arc<dyn RpcHandler>) -> bool {
        let added = self.registry.add_rpc_handler(method, handler);
        if added {
            debug!(method, "XML-RPC handler registered");
        } else {
            warn!(method, "XML-RPC handler already registered");
        }
        added
    }

    /// Build the service without binding a listener.
    #[must_use]
    pub fn router(self) -> Router {
        let dispatcher = Arc::new(Dispatcher {
            registry: self.registry,
            handler_timeout: self.config.handler_timeout,
            max_body_bytes: self.config.max_body_bytes,
        });

        Router::new()
            .fallback(move |request: Request| {
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.handle_request(request).await }
            })
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestHeaderLayer::if_not_present(
                        HeaderName::from_static("x-request-id"),
                        |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                    ))
                    .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                        "x-request-id",
                    )))
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(CatchPanicLayer::custom(handle_panic)),
            )
    }

    /// Bind the listener and serve on a background task. Each accepted
    /// connection is served on its own task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = bind(self.config.address, self.config.port).await?;
        self.serve(listener)
    }

    /// Serve on a listener the caller already bound, for when handlers need
    /// the real port before the server starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub fn serve(self, listener: TcpListener) -> Result<ServerHandle> {
        let local_addr = listener.local_addr()?;

        info!("Starting up HTTP server on {}", local_addr);
        debug!(registry = ?self.registry, "handlers");

        let app = self.router();
        let (shutdown, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                    info!("Gracefully shutdown");
                })
                .await;

            if let Err(e) = served {
                error!("HTTP server stopped: {}", e);
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Bind a TCP listener on `address:port`; port 0 picks a free port.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(address: IpAddr, port: u16) -> Result<TcpListener> {
    let address = SocketAddr::new(address, port);
    TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {address}"))
}

/// Running server. Dropping the handle starts a graceful shutdown without
/// waiting for it; [`ServerHandle::shutdown`] waits for the drain.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain in-flight connections and wait for the serve task.
    ///
    /// # Errors
    ///
    /// Returns an error if the serve task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.context("HTTP server task failed")
    }
}

struct Dispatcher {
    registry: HandlerRegistry,
    handler_timeout: Duration,
    max_body_bytes: usize,
}

impl Dispatcher {
    async fn handle_request(&self, request: Request) -> Response {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        let protocol = Protocol::classify(content_type.as_deref());

        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let url = request
            .uri()
            .path_and_query()
            .map_or_else(|| path.clone(), ToString::to_string);

        let body = match to_bytes(request.into_body(), self.max_body_bytes).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return respond(StatusCode::PAYLOAD_TOO_LARGE, None, String::new());
            }
        };

        let response_body = match protocol {
            Protocol::XmlRpc => {
                let serialized = self.parse_xml_rpc(&body).await;
                normalize_declared_encoding(&serialized).into_owned()
            }
            Protocol::Llsd => Self::parse_llsd(&body),
            Protocol::Rest => {
                self.parse_rest(&path, RestRequest { body, url, method })
                    .await
            }
            Protocol::Unhandled => {
                debug!(content_type = ?content_type, "unhandled content type");
                String::new()
            }
        };

        respond(StatusCode::OK, protocol.response_content_type(), response_body)
    }

    async fn parse_xml_rpc(&self, body: &str) -> String {
        let call = match MethodCall::from_xml(body) {
            Ok(call) => call,
            Err(e) => {
                error!("Failed to decode XML-RPC request: {}", e);
                return String::new();
            }
        };

        let method_name = call.method_name.clone();
        let response = match self.registry.rpc_handler(&method_name) {
            Some(handler) => {
                match self.invoke(&method_name, handler.handle_rpc(call)).await {
                    Some(response) => response,
                    None => return String::new(),
                }
            }
            None => {
                debug!(method = %method_name, "unknown XML-RPC method");
                unknown_method_response()
            }
        };

        response.to_xml()
    }

    async fn parse_rest(&self, path: &str, request: RestRequest) -> String {
        let Some(handler) = rest_key(path).and_then(|key| self.registry.rest_handler(key)) else {
            debug!(path, "no REST handler");
            return String::new();
        };

        self.invoke(path, handler.handle_rest(request))
            .await
            .unwrap_or_default()
    }

    // structured XML is reserved; the empty body is the contract for now
    fn parse_llsd(_body: &str) -> String {
        String::new()
    }

    async fn invoke<T>(
        &self,
        key: &str,
        call: impl Future<Output = Result<T, HandlerError>>,
    ) -> Option<T> {
        match timeout(self.handler_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                error!(handler = key, "Handler failed: {}", e);
                None
            }
            Err(_) => {
                error!(
                    handler = key,
                    timeout = ?self.handler_timeout,
                    "Handler timed out"
                );
                None
            }
        }
    }
}

/// Body sent for XML-RPC calls to a method nobody registered.
#[must_use]
pub fn unknown_method_response() -> MethodResponse {
    let mut error = BTreeMap::new();
    error.insert("reason".to_string(), Value::from("XmlRequest"));
    error.insert("message".to_string(), Value::from("Unknown Rpc request"));
    error.insert("login".to_string(), Value::from("false"));
    MethodResponse::new(error)
}

fn respond(status: StatusCode, content_type: Option<&'static str>, body: String) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    match content_type {
        Some(content_type) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        None => {
            headers.remove(CONTENT_TYPE);
        }
    }
    response
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    error!("Handler panicked: {}", detail);

    respond(StatusCode::INTERNAL_SERVER_ERROR, None, String::new())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = request.uri().path(),
        http.content_type = content_type,
        request_id
    )
}
