//! Static resources served from a directory under a URL prefix.
//!
//! Files are assumed not to change while the process runs, so the handler's
//! creation time doubles as every file's `Last-Modified` and a client that
//! already has a copy from after that moment gets `304 Not Modified`.
//!
//! ```rust,no_run
//! use berth::{Pipeline, Router, static_files::StaticResources};
//!
//! # fn main() -> Result<(), berth::ConfigError> {
//! let pipeline = Pipeline::new(Router::new())
//!     .pre(StaticResources::new("/assets", "./public")?);
//! # Ok(())
//! # }
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use http::{Method, StatusCode};

use crate::chain::PreHandler;
use crate::config::ServerSettings;
use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

const INDEX: &str = "index.html";
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub struct StaticResources {
    base_path: String,
    root: PathBuf,
    /// Whole seconds; HTTP dates carry no finer precision.
    started_at: i64,
    disable_304: bool,
}

impl StaticResources {
    pub fn new(base_path: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let base_path = base_path.into();
        if !base_path.starts_with('/') {
            return Err(ConfigError::InvalidBasePath(base_path));
        }
        Ok(Self {
            base_path,
            root: root.into(),
            started_at: DateTime::<Utc>::from(SystemTime::now()).timestamp(),
            disable_304: false,
        })
    }

    /// Serves `base_path` from the configured context root, honouring
    /// `disable_304`. `None` when no root is configured.
    pub fn from_settings(base_path: impl Into<String>, settings: &ServerSettings) -> Result<Option<Self>, ConfigError> {
        if settings.servlet_context_base_path.as_os_str().is_empty() {
            return Ok(None);
        }
        let handler = Self::new(base_path, &settings.servlet_context_base_path)?;
        Ok(Some(handler.disable_304(settings.disable_304)))
    }

    /// Always send the file, even when `If-Modified-Since` says the client
    /// has it.
    pub fn disable_304(mut self, disabled: bool) -> Self {
        self.disable_304 = disabled;
        self
    }

    /// The part of `path` below the base path, or `None` if the request is
    /// not for us.
    fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        match rest {
            "" | "/"                     => Some(INDEX),
            r if r.starts_with('/')      => Some(&r[1..]),
            _ if self.base_path.ends_with('/') => Some(rest),
            _                            => None,
        }
    }

    fn not_modified(&self, req: &Request) -> bool {
        if self.disable_304 {
            return false;
        }
        req.header("if-modified-since")
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .is_some_and(|since| since.timestamp() >= self.started_at)
    }

    async fn serve(&self, req: &Request, relative: &str) -> Response {
        let head = match *req.method() {
            Method::GET  => false,
            Method::HEAD => true,
            _            => return Response::status(StatusCode::METHOD_NOT_ALLOWED),
        };

        if self.not_modified(req) {
            return Response::status(StatusCode::NOT_MODIFIED);
        }

        let Some(file) = resolve(&self.root, relative) else {
            return Response::status(StatusCode::NOT_FOUND);
        };
        let body = match tokio::fs::read(&file).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(path = %file.display(), error = %e, "static resource not found");
                return Response::status(StatusCode::NOT_FOUND);
            }
        };

        let last_modified = DateTime::<Utc>::from_timestamp(self.started_at, 0)
            .map(|t| t.format(HTTP_DATE).to_string())
            .unwrap_or_default();
        let builder = Response::builder().header("last-modified", &last_modified);
        let content_type = mime_type(&file);
        if head {
            builder
                .header("content-type", content_type)
                .header("content-length", &body.len().to_string())
                .no_body()
        } else {
            builder.raw(content_type, body)
        }
    }
}

impl PreHandler for StaticResources {
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move {
            let relative = self.relative(req.path())?;
            Some(self.serve(req, relative).await)
        })
    }
}

/// Joins `relative` onto `root`, refusing anything but plain path segments.
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| root.join(relative))
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css"          => "text/css; charset=utf-8",
        "js"           => "application/javascript",
        "json"         => "application/json",
        "txt"          => "text/plain; charset=utf-8",
        "xml"          => "application/xml",
        "svg"          => "image/svg+xml",
        "png"          => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif"          => "image/gif",
        "ico"          => "image/x-icon",
        "woff2"        => "font/woff2",
        _              => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Duration;

    use super::*;

    fn fixture() -> (tempfile::TempDir, StaticResources) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        let handler = StaticResources::new("/static", dir.path()).unwrap();
        (dir, handler)
    }

    async fn fetch(handler: &StaticResources, method: Method, path: &str) -> Option<Response> {
        let req = Request::builder().method(method).path(path).build();
        handler.handle(&req).await
    }

    #[test]
    fn base_path_must_be_absolute() {
        assert!(matches!(StaticResources::new("", "."), Err(ConfigError::InvalidBasePath(_))));
        assert!(matches!(StaticResources::new("static", "."), Err(ConfigError::InvalidBasePath(_))));
    }

    #[test]
    fn settings_without_a_root_serve_nothing() {
        assert!(StaticResources::from_settings("/static", &ServerSettings::default()).unwrap().is_none());

        let settings = ServerSettings { servlet_context_base_path: ".".into(), disable_304: true, ..ServerSettings::default() };
        let handler = StaticResources::from_settings("/static", &settings).unwrap().unwrap();
        assert!(handler.disable_304);
    }

    #[tokio::test]
    async fn base_path_serves_the_index() {
        let (_dir, handler) = fixture();
        for path in ["/static", "/static/"] {
            let resp = fetch(&handler, Method::GET, path).await.unwrap();
            assert_eq!(resp.status_code(), StatusCode::OK);
            assert_eq!(resp.body(), b"<h1>home</h1>");
            assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
            assert!(resp.header("last-modified").is_some_and(|v| v.ends_with(" GMT")));
        }
    }

    #[tokio::test]
    async fn siblings_of_the_base_path_are_ignored() {
        let (_dir, handler) = fixture();
        assert!(fetch(&handler, Method::GET, "/staticfoo").await.is_none());
        assert!(fetch(&handler, Method::GET, "/other").await.is_none());
    }

    #[tokio::test]
    async fn nested_files_and_head() {
        let (_dir, handler) = fixture();

        let resp = fetch(&handler, Method::GET, "/static/css/site.css").await.unwrap();
        assert_eq!(resp.body(), b"body{}");
        assert_eq!(resp.header("content-type"), Some("text/css; charset=utf-8"));

        let resp = fetch(&handler, Method::HEAD, "/static/css/site.css").await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(resp.body().is_empty());
        assert_eq!(resp.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(resp.header("content-length"), Some("6"));
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let (_dir, handler) = fixture();
        let resp = fetch(&handler, Method::POST, "/static/index.html").await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn missing_files_and_traversal_are_not_found() {
        let (_dir, handler) = fixture();
        for path in ["/static/nope.txt", "/static/../secret", "/static/css/../../secret"] {
            let resp = fetch(&handler, Method::GET, path).await.unwrap();
            assert_eq!(resp.status_code(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn if_modified_since_after_startup_is_not_modified() {
        let (_dir, handler) = fixture();
        let later = (Utc::now() + Duration::minutes(5)).format(HTTP_DATE).to_string();
        let earlier = (Utc::now() - Duration::days(1)).format(HTTP_DATE).to_string();

        let req = Request::builder().path("/static/").header("if-modified-since", &later).build();
        let resp = handler.handle(&req).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::NOT_MODIFIED);

        let req = Request::builder().path("/static/").header("if-modified-since", &earlier).build();
        let resp = handler.handle(&req).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);

        let handler = handler.disable_304(true);
        let req = Request::builder().path("/static/").header("if-modified-since", &later).build();
        let resp = handler.handle(&req).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);
    }
}
