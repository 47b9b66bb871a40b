//! Self-test endpoint for orchestration probes.
//!
//! Orchestration asks one question over HTTP: is this service ready? The
//! answer comes from a list of registered [`SelfTest`] checks plus an
//! optional [`DefaultSelfTest`] that can answer with a richer status:
//!
//! | Outcome | Status |
//! |---|---|
//! | no checks registered | `200` |
//! | every check passes, no default check | `200` |
//! | any check fails | `500`, later checks are skipped |
//! | every check passes, default check present | whatever the default check returns |
//! | default check fails | `500` |
//!
//! Mount the endpoint with [`Router::selftest`](crate::Router::selftest):
//!
//! ```rust,no_run
//! use berth::{Router, selftest::SelfTestEndpoint};
//!
//! let router = Router::new().selftest(SelfTestEndpoint::new());
//! ```

use std::sync::Arc;

use http::StatusCode;

use crate::handler::BoxFuture;
use crate::response::Response;

/// Error type returned by failing checks.
pub type SelfTestError = Box<dyn std::error::Error + Send + Sync>;

/// A single health check. `Err` fails the whole self-test.
pub trait SelfTest: Send + Sync + 'static {
    fn run(&self) -> BoxFuture<'_, Result<(), SelfTestError>>;
}

/// The distinguished check consulted after all plain checks passed. Its
/// response is forwarded to the caller unchanged.
pub trait DefaultSelfTest: Send + Sync + 'static {
    fn run(&self) -> BoxFuture<'_, Result<Response, SelfTestError>>;
}

/// Aggregates the registered checks into one HTTP answer.
#[derive(Default)]
pub struct SelfTestEndpoint {
    tests: Vec<Arc<dyn SelfTest>>,
    default: Option<Arc<dyn DefaultSelfTest>>,
}

impl SelfTestEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, test: impl SelfTest) -> Self {
        self.tests.push(Arc::new(test));
        self
    }

    pub fn default_check(mut self, test: impl DefaultSelfTest) -> Self {
        self.default = Some(Arc::new(test));
        self
    }

    pub async fn run(&self) -> Response {
        for test in &self.tests {
            if let Err(e) = test.run().await {
                tracing::warn!(error = %e, "self-test failed");
                return failure(&e);
            }
        }

        match &self.default {
            None => Response::status(StatusCode::OK),
            Some(default) => match default.run().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "default self-test failed");
                    failure(&e)
                }
            },
        }
    }
}

fn failure(e: &SelfTestError) -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .text(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Passing(Arc<AtomicUsize>);

    impl SelfTest for Passing {
        fn run(&self) -> BoxFuture<'_, Result<(), SelfTestError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok::<(), SelfTestError>(()) })
        }
    }

    struct Failing;

    impl SelfTest for Failing {
        fn run(&self) -> BoxFuture<'_, Result<(), SelfTestError>> {
            Box::pin(async { Err::<(), SelfTestError>("database unreachable".into()) })
        }
    }

    struct Answer(StatusCode);

    impl DefaultSelfTest for Answer {
        fn run(&self) -> BoxFuture<'_, Result<Response, SelfTestError>> {
            let status = self.0;
            Box::pin(async move { Ok::<_, SelfTestError>(Response::builder().status(status).text("degraded")) })
        }
    }

    #[tokio::test]
    async fn no_checks_is_success() {
        let resp = SelfTestEndpoint::new().run().await;
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn any_failing_check_is_a_server_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = SelfTestEndpoint::new()
            .check(Passing(Arc::clone(&calls)))
            .check(Failing)
            .check(Passing(Arc::clone(&calls)))
            .default_check(Answer(StatusCode::OK));

        let resp = endpoint.run().await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), b"database unreachable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_check_status_is_forwarded_verbatim() {
        for status in [StatusCode::ACCEPTED, StatusCode::SEE_OTHER, StatusCode::CONFLICT, StatusCode::SERVICE_UNAVAILABLE] {
            let calls = Arc::new(AtomicUsize::new(0));
            let endpoint = SelfTestEndpoint::new()
                .check(Passing(Arc::clone(&calls)))
                .default_check(Answer(status));

            let resp = endpoint.run().await;
            assert_eq!(resp.status_code(), status);
            assert_eq!(resp.body(), b"degraded");
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
