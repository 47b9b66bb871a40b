//! Radix-tree request router: the dispatch stage of the pipeline.
//!
//! One tree per HTTP method. O(path-length) lookup. Requests that match no
//! route go to the fallback handler, which by default answers `404` with a
//! plain-text body and logs a warning: reaching it usually means a client
//! or a proxy is misconfigured.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::selftest::SelfTestEndpoint;

/// Path the self-test endpoint is mounted on.
pub const SELFTEST_PATH: &str = "/selftest";

/// The application router.
///
/// Build it once at startup and hand it to a [`Pipeline`](crate::Pipeline).
/// Registration methods return `self` so they chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    fallback: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), fallback: invalid_request.into_boxed_handler() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Replaces the handler used for requests no route matches.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = handler.into_boxed_handler();
        self
    }

    /// Mounts `endpoint` on `GET /selftest`.
    pub fn selftest(self, endpoint: SelfTestEndpoint) -> Self {
        let endpoint = Arc::new(endpoint);
        self.get(SELFTEST_PATH, move |_req: Request| {
            let endpoint = Arc::clone(&endpoint);
            async move { endpoint.run().await }
        })
    }

    pub(crate) async fn dispatch(&self, mut req: Request) -> Response {
        let handler = match self.lookup(&req.method, &req.path) {
            Some((handler, params)) => {
                req.params = params;
                handler
            }
            None => Arc::clone(&self.fallback),
        };
        handler.call(req).await
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Default fallback: every request reaching it is a routing mistake.
async fn invalid_request(req: Request) -> Response {
    tracing::warn!(method = %req.method, path = %req.path, "request served by the fallback handler");
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text(format!("Invalid request to {} '{}'", req.method, req.path))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_user(req: Request) -> Response {
        Response::text(format!("user {}", req.param("id").unwrap_or("?")))
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let router = Router::new().get("/users/{id}", get_user);

        let req = Request::builder().path("/users/42").build();
        let resp = router.dispatch(req).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"user 42");
    }

    #[tokio::test]
    async fn unmatched_requests_get_plain_text_404() {
        let router = Router::new().get("/users/{id}", get_user);

        let req = Request::builder().method(Method::POST).path("/users/42").build();
        let resp = router.dispatch(req).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(resp.body(), b"Invalid request to POST '/users/42'");
    }

    #[tokio::test]
    async fn custom_fallback_replaces_the_default() {
        let router = Router::new().fallback(|_req: Request| async { StatusCode::GONE });
        let resp = router.dispatch(Request::builder().path("/nope").build()).await;
        assert_eq!(resp.status_code(), StatusCode::GONE);
    }
}
