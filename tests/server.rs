//! End-to-end tests over real TCP connections.

use std::fs;
use std::sync::Arc;

use berth::chain::security_fn;
use berth::log::{build_request_logs, LogFields, ServerInfo};
use berth::selftest::SelfTestEndpoint;
use berth::static_files::StaticResources;
use berth::{Connectors, HttpServer, Pipeline, Request, Response, Router, Settings};
use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Reply {
    status: u16,
    headers: String,
    body: String,
}

async fn send(port: u16, method: &str, target: &str, extra_headers: &[(&str, &str)]) -> Reply {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut request = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head.split(' ').nth(1).unwrap().parse().unwrap();
    Reply { status, headers: head.to_ascii_lowercase(), body: body.to_owned() }
}

fn standalone_server(settings: &Settings, pipeline: Pipeline) -> HttpServer {
    let connectors = Connectors::standalone(&["http://127.0.0.1:0"]).unwrap();
    HttpServer::new(&settings.server, connectors, pipeline).unwrap()
}

fn service_port(server: &HttpServer) -> u16 {
    server.connectors().get("service").unwrap().port().unwrap()
}

#[tokio::test]
async fn routes_fallback_and_selftest() {
    let settings = Settings::default();
    let router = Router::new()
        .get("/users/{id}", |req: Request| async move {
            Response::json(format!(r#"{{"id":"{}"}}"#, req.param("id").unwrap_or("?")))
        })
        .selftest(SelfTestEndpoint::new());
    let mut server = standalone_server(&settings, Pipeline::new(router));

    server.start().await.unwrap();
    let port = service_port(&server);
    assert_ne!(port, 0);

    let reply = send(port, "GET", "/users/42", &[]).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, r#"{"id":"42"}"#);

    let reply = send(port, "DELETE", "/users/42", &[]).await;
    assert_eq!(reply.status, 404);
    assert!(reply.headers.contains("content-type: text/plain"));
    assert_eq!(reply.body, "Invalid request to DELETE '/users/42'");

    let reply = send(port, "GET", "/selftest", &[]).await;
    assert_eq!(reply.status, 200);

    server.stop().await.unwrap();
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn security_rejects_before_anything_else() {
    let settings = Settings::default();
    let router = Router::new().get("/secret", |_req: Request| async { "classified" });
    let pipeline = Pipeline::new(router).security(security_fn(|req| {
        (req.header("x-api-key") != Some("letmein"))
            .then(|| Response::builder().status(StatusCode::FORBIDDEN).text("Verboten!"))
    }));
    let mut server = standalone_server(&settings, pipeline);
    server.start().await.unwrap();
    let port = service_port(&server);

    let reply = send(port, "GET", "/secret", &[]).await;
    assert_eq!(reply.status, 403);
    assert_eq!(reply.body, "Verboten!");

    let reply = send(port, "GET", "/secret", &[("X-Api-Key", "letmein")]).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "classified");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn access_log_records_each_request() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs/access.log");
    let settings = Settings::from_toml(&format!(
        r#"
        [server]
        forwarded = true

        [request_log.file]
        enabled = true
        file = "{}"
        fields = "remoteAddr,method,requestUri,query,responseCode,responseContentLength"
        "#,
        log_path.display()
    ))
    .unwrap();

    let router = Router::new()
        .get("/orders", |_req: Request| async { "three orders" })
        .selftest(SelfTestEndpoint::new());
    let registry = Arc::new(LogFields::new(ServerInfo::default()));
    let pipeline = Pipeline::new(router).post_shared(build_request_logs(&settings.request_log, registry).unwrap());
    let mut server = standalone_server(&settings, pipeline);

    server.start().await.unwrap();
    let port = service_port(&server);
    send(port, "GET", "/orders?page=2", &[("X-Forwarded-For", "203.0.113.7, 10.0.0.1")]).await;
    send(port, "GET", "/selftest", &[]).await;
    send(port, "GET", "/missing", &[]).await;
    server.stop().await.unwrap();

    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2, "{log}");
    assert_eq!(lines[0], "203.0.113.7\tGET\t/orders\tpage=2\t200\t12");
    assert!(lines[1].starts_with("127.0.0.1\tGET\t/missing\t\t404\t"), "{}", lines[1]);
}

#[tokio::test]
async fn access_log_sees_the_content_length_header() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("access.log");
    let settings = Settings::from_toml(&format!(
        r#"
        [request_log.file]
        enabled = true
        file = "{}"
        fields = "requestUri,responseHeader:Content-Length,responseContentLength"
        "#,
        log_path.display()
    ))
    .unwrap();

    let router = Router::new().get("/orders", |_req: Request| async { "three orders" });
    let registry = Arc::new(LogFields::new(ServerInfo::default()));
    let pipeline = Pipeline::new(router).post_shared(build_request_logs(&settings.request_log, registry).unwrap());
    let mut server = standalone_server(&settings, pipeline);

    server.start().await.unwrap();
    let reply = send(service_port(&server), "GET", "/orders", &[]).await;
    server.stop().await.unwrap();

    assert!(reply.headers.contains("content-length: 12"));
    assert_eq!(fs::read_to_string(&log_path).unwrap(), "/orders\t12\t12\n");
}

#[tokio::test]
async fn static_resources_answer_before_the_router() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

    let settings = Settings::default();
    let router = Router::new().get("/assets/app.js", |_req: Request| async { "from the router" });
    let pipeline = Pipeline::new(router).pre(StaticResources::new("/assets", dir.path()).unwrap());
    let mut server = standalone_server(&settings, pipeline);
    server.start().await.unwrap();
    let port = service_port(&server);

    let reply = send(port, "GET", "/assets/app.js", &[]).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "console.log(1)");
    assert!(reply.headers.contains("content-type: application/javascript"));
    assert!(reply.headers.contains("last-modified: "));

    let reply = send(port, "GET", "/assets", &[]).await;
    assert_eq!(reply.body, "<h1>home</h1>");

    let reply = send(port, "PUT", "/assets/app.js", &[]).await;
    assert_eq!(reply.status, 405);

    let reply = send(port, "GET", "/assetsfoo", &[]).await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.body, "Invalid request to GET '/assetsfoo'");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_connectors_share_one_listener() {
    let connectors = Connectors::standalone(&["http://127.0.0.1:0", "http://127.0.0.1:0"]).unwrap();
    let mut server = HttpServer::new(
        &Settings::default().server,
        connectors,
        Pipeline::new(Router::new().get("/", |_req: Request| async { "ok" })),
    )
    .unwrap();

    server.start().await.unwrap();
    let first = server.connectors().get("service").unwrap().port().unwrap();
    let second = server.connectors().get("service-1").unwrap().port().unwrap();
    assert_eq!(first, second);
    assert_eq!(send(first, "GET", "/", &[]).await.body, "ok");

    server.stop().await.unwrap();
}
