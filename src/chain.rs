//! The request pipeline.
//!
//! Every request walks the same fixed sequence:
//!
//! ```text
//! [security?] → [pre-handlers…] → [dispatch (Router)] → [post-handlers…]
//! ```
//!
//! - **Security** (optional, at most one) sees the request first. A response
//!   from it ends processing right there: no pre-handler, no dispatch, no
//!   post-handler runs. This is where allow/deny policies live.
//! - **Pre-handlers** run in registration order. The first one to return a
//!   response marks the request handled; the remaining pre-handlers and the
//!   router are skipped. Static resources are a pre-handler.
//! - **Dispatch** is the [`Router`].
//! - **Post-handlers** observe the finished request/response pair. They
//!   cannot change it. Request logs are post-handlers.
//!
//! Panics inside a stage are not caught here; they unwind into the engine's
//! connection task.

use std::sync::Arc;

use http::Method;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

// ── Stage traits ──────────────────────────────────────────────────────────────

/// Gatekeeper wrapped around the whole pipeline.
pub trait SecurityHandler: Send + Sync + 'static {
    /// `Some(response)` rejects the request with that response.
    fn check<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>>;
}

/// A stage that may answer a request before the router sees it.
pub trait PreHandler: Send + Sync + 'static {
    /// `Some(response)` marks the request handled.
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>>;
}

/// Observer of completed exchanges.
///
/// `on_start` / `on_stop` follow the server lifecycle, so sinks that own a
/// resource (an open file, a socket) can acquire and release it.
pub trait PostHandler: Send + Sync + 'static {
    fn observe(&self, req: &Request, resp: &Response);

    fn on_start(&self) {}

    fn on_stop(&self) {}
}

/// Adapts a plain closure into a [`SecurityHandler`].
///
/// ```rust
/// use berth::{Pipeline, Response, Router};
/// use berth::chain::security_fn;
/// use http::StatusCode;
///
/// let pipeline = Pipeline::new(Router::new()).security(security_fn(|req| {
///     (req.header("x-api-key") != Some("letmein"))
///         .then(|| Response::builder().status(StatusCode::FORBIDDEN).text("Verboten!"))
/// }));
/// ```
pub fn security_fn<F>(f: F) -> SecurityFn<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    SecurityFn(f)
}

/// See [`security_fn`].
#[derive(Debug)]
pub struct SecurityFn<F>(F);

impl<F> SecurityHandler for SecurityFn<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    fn check<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>> {
        let verdict = (self.0)(req);
        Box::pin(async move { verdict })
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The assembled handler chain of one server.
pub struct Pipeline {
    security: Option<Arc<dyn SecurityHandler>>,
    pre: Vec<Arc<dyn PreHandler>>,
    router: Router,
    post: Vec<Arc<dyn PostHandler>>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self { security: None, pre: Vec::new(), router, post: Vec::new() }
    }

    /// Installs the security handler, replacing any previous one.
    pub fn security(mut self, handler: impl SecurityHandler) -> Self {
        self.security = Some(Arc::new(handler));
        self
    }

    pub fn pre(mut self, handler: impl PreHandler) -> Self {
        self.pre.push(Arc::new(handler));
        self
    }

    pub fn post(mut self, handler: impl PostHandler) -> Self {
        self.post.push(Arc::new(handler));
        self
    }

    /// Appends already-shared post-handlers, e.g. the request logs built by
    /// [`build_request_logs`](crate::log::build_request_logs).
    pub fn post_shared(mut self, handlers: impl IntoIterator<Item = Arc<dyn PostHandler>>) -> Self {
        self.post.extend(handlers);
        self
    }

    pub fn has_security(&self) -> bool {
        self.security.is_some()
    }

    /// Runs one request through the whole chain.
    pub async fn handle(&self, req: Request) -> Response {
        if let Some(security) = &self.security {
            if let Some(rejected) = security.check(&req).await {
                return rejected;
            }
        }

        let mut handled = None;
        for stage in &self.pre {
            if let Some(resp) = stage.handle(&req).await {
                handled = Some(resp);
                break;
            }
        }

        let mut response = match handled {
            Some(resp) => resp,
            None => self.router.dispatch(req.clone()).await,
        };
        // HEAD bodies are empty on purpose; only the handler knows the length.
        if *req.method() != Method::HEAD {
            response.fill_content_length();
        }

        for observer in &self.post {
            observer.observe(&req, &response);
        }
        response
    }

    pub(crate) fn start_observers(&self) {
        for observer in &self.post {
            observer.on_start();
        }
    }

    pub(crate) fn stop_observers(&self) {
        for observer in &self.post {
            observer.on_stop();
        }
    }
}
