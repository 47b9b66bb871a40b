//! # berth
//!
//! An embeddable HTTP server shell for services that run either under an
//! orchestration platform or on their own.
//!
//! berth owns the parts that are the same in every service and leaves the
//! application to register routes:
//!
//! - **Connectors**: which addresses and ports to listen on, derived from
//!   configuration (internal/external platform roles or a list of service
//!   URIs), with ephemeral ports resolved once the listeners are bound.
//! - **Handler chain**: optional security gate, pre-handlers (static files),
//!   a radix-tree [`Router`], post-handlers (request logs), in that order.
//! - **Request logs**: file, syslog and `tracing` sinks fed by a shared
//!   registry of named log fields.
//! - **Lifecycle**: start, graceful stop, SIGTERM / Ctrl-C handling.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use berth::log::{build_request_logs, LogFields, ServerInfo};
//! use berth::selftest::SelfTestEndpoint;
//! use berth::{Connectors, HttpServer, Pipeline, Request, Response, Router, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), berth::Error> {
//!     let settings = Settings::load("berth.toml")?;
//!
//!     let router = Router::new()
//!         .get("/users/{id}", get_user)
//!         .selftest(SelfTestEndpoint::new());
//!
//!     let registry = Arc::new(LogFields::new(ServerInfo::default()));
//!     let pipeline = Pipeline::new(router)
//!         .post_shared(build_request_logs(&settings.request_log, registry)?);
//!
//!     let connectors = Connectors::from_settings(&settings.connectors)?;
//!     let mut server = HttpServer::new(&settings.server, connectors, pipeline)?;
//!     server.run_until_signal().await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod tls;

pub mod chain;
pub mod config;
pub mod connector;
pub mod log;
pub mod selftest;
pub mod static_files;

pub use chain::Pipeline;
// `config` alone would also name the external config crate.
pub use crate::config::Settings;
pub use connector::{Connector, Connectors};
pub use error::{ConfigError, Error};
pub use handler::Handler;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::HttpServer;
