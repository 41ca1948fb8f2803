//! HTTP front door: the dispatch server, its registry and the protocol
//! classifier.

pub mod health;
pub mod protocol;
pub mod registry;
mod server;

pub use self::registry::{HandlerError, HandlerRegistry, RestHandler, RestRequest, RpcHandler};
pub use self::server::{bind, unknown_method_response, HttpServer, ServerConfig, ServerHandle};
