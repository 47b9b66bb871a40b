//! Minimal berth example: a JSON endpoint, a self-test, an API-key gate and
//! an access log.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -H 'x-api-key: letmein' http://localhost:8080/users/42
//!   curl http://localhost:8080/users/42            # 403 Verboten!
//!   curl -H 'x-api-key: letmein' http://localhost:8080/selftest
//!   curl -H 'x-api-key: letmein' http://localhost:8080/nope
//!   tail -f access.log

use std::sync::Arc;

use berth::chain::security_fn;
use berth::log::{build_request_logs, LogFields, ServerInfo};
use berth::selftest::SelfTestEndpoint;
use berth::{Connectors, HttpServer, Pipeline, Request, Response, Router, Settings};
use http::StatusCode;

const SETTINGS: &str = r#"
[connectors]
internal = { ip = "127.0.0.1", http_port = 8080 }

[request_log.file]
enabled = true
file = "access.log"

[request_log.tracing]
enabled = true
"#;

#[tokio::main]
async fn main() -> Result<(), berth::Error> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_toml(SETTINGS)?;

    let router = Router::new()
        .get("/users/{id}", get_user)
        .post("/users", create_user)
        .selftest(SelfTestEndpoint::new());

    let registry = Arc::new(LogFields::new(ServerInfo {
        binary: Some("basic".to_owned()),
        version: Some(env!("CARGO_PKG_VERSION").to_owned()),
        ..ServerInfo::default()
    }));

    let pipeline = Pipeline::new(router)
        .security(security_fn(|req| {
            (req.header("x-api-key") != Some("letmein"))
                .then(|| Response::builder().status(StatusCode::FORBIDDEN).text("Verboten!"))
        }))
        .post_shared(build_request_logs(&settings.request_log, registry)?);

    let connectors = Connectors::from_settings(&settings.connectors)?;
    let mut server = HttpServer::new(&settings.server, connectors, pipeline)?;
    server.run_until_signal().await
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}
