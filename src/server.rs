//! The HTTP server: connectors in, pipeline on every request.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──▶ Running ──stop()──▶ Stopped
//! ```
//!
//! A server starts at most once. `start` on a running or stopped server and
//! `stop` on a server that is idle or already stopped are lifecycle errors.
//!
//! `start` binds one listener per distinct connector, publishes the ports
//! the OS picked for ephemeral connectors, opens the request logs and spawns
//! one accept loop per listener. `stop`:
//!
//! 1. Stops every `listener.accept()`; no new connections are made.
//! 2. Asks every open connection to finish its in-flight request and close.
//! 3. Waits up to `shutdown_timeout`, then aborts whatever is left.
//! 4. Closes the request logs.
//!
//! # Graceful shutdown and Kubernetes
//!
//! [`HttpServer::run_until_signal`] wires this to SIGTERM / Ctrl-C. Set the
//! pod's `terminationGracePeriodSeconds` longer than `shutdown_timeout`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::chain::Pipeline;
use crate::config::ServerSettings;
use crate::connector::{
    Connectors, Scheme, EXTERNAL_HTTP, EXTERNAL_HTTPS, INTERNAL_HTTP, INTERNAL_HTTPS,
};
use crate::error::{ConfigError, Error};
use crate::request::Request;
use crate::response::Response;

/// hyper refuses smaller HTTP/1 read buffers.
const MIN_BUF_SIZE: usize = 8192;

enum State {
    Idle,
    Running {
        shutdown: watch::Sender<bool>,
        accept_loops: JoinSet<()>,
    },
    Stopped,
}

/// What every connection task needs.
struct Shared {
    pipeline: Pipeline,
    forwarded: bool,
    max_idle_time: Duration,
    max_header_size: usize,
}

pub struct HttpServer {
    connectors: Connectors,
    shared: Arc<Shared>,
    tls: Option<TlsAcceptor>,
    shutdown_timeout: Option<Duration>,
    state: State,
}

impl HttpServer {
    /// Assembles a server. Nothing is bound until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingTls`] when a connector is secure but `settings`
    /// carries no certificate, or [`ConfigError::Tls`] when the certificate
    /// cannot be loaded.
    pub fn new(settings: &ServerSettings, connectors: Connectors, pipeline: Pipeline) -> Result<Self, Error> {
        let tls = match connectors.iter().find(|c| c.is_secure()) {
            None => None,
            Some(secure) => {
                let tls = settings
                    .tls
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingTls(secure.role().to_owned()))?;
                Some(TlsAcceptor::from(crate::tls::server_config(tls)?))
            }
        };

        let shared = Shared {
            pipeline,
            forwarded: settings.forwarded,
            max_idle_time: settings.max_idle_time(),
            max_header_size: settings.max_header_size.max(MIN_BUF_SIZE),
        };

        Ok(Self {
            connectors,
            shared: Arc::new(shared),
            tls,
            shutdown_timeout: settings.shutdown_timeout(),
            state: State::Idle,
        })
    }

    pub fn connectors(&self) -> &Connectors {
        &self.connectors
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Binds every connector and starts serving.
    ///
    /// If any listener fails to bind, the ones already bound are released and
    /// the server stays idle.
    pub async fn start(&mut self) -> Result<(), Error> {
        match self.state {
            State::Idle => {}
            State::Running { .. } => return Err(Error::Lifecycle("server was already started")),
            State::Stopped        => return Err(Error::Lifecycle("server was already stopped")),
        }

        let mut bound = Vec::new();
        for connector in self.connectors.distinct() {
            let listener = TcpListener::bind((connector.address(), connector.requested_port())).await?;
            let port = listener.local_addr()?.port();
            bound.push((connector, listener, port));
        }

        for (connector, _, port) in &bound {
            self.connectors.publish_port(connector, *port)?;
        }
        self.connectors.mark_started();
        self.shared.pipeline.start_observers();

        let (shutdown, _) = watch::channel(false);
        let mut accept_loops = JoinSet::new();
        for (connector, listener, port) in bound {
            info!(role = connector.role(), %connector, port, "listening");
            let tls = connector.is_secure().then(|| self.tls.clone()).flatten();
            accept_loops.spawn(accept_loop(listener, tls, Arc::clone(&self.shared), shutdown.subscribe()));
        }

        self.state = State::Running { shutdown, accept_loops };
        info!("server started");
        Ok(())
    }

    /// Stops accepting, drains open connections and closes the request logs.
    pub async fn stop(&mut self) -> Result<(), Error> {
        let (shutdown, mut accept_loops) = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running { shutdown, accept_loops } => (shutdown, accept_loops),
            State::Idle => {
                self.state = State::Idle;
                return Err(Error::Lifecycle("server was never started"));
            }
            State::Stopped => return Err(Error::Lifecycle("server was already stopped")),
        };

        info!("stopping server");
        if shutdown.send(true).is_err() {
            debug!("every accept loop had already exited");
        }

        if let Some(timeout) = self.shutdown_timeout {
            let drain = async { while accept_loops.join_next().await.is_some() {} };
            if tokio::time::timeout(timeout, drain).await.is_err() {
                warn!(timeout_ms = timeout.as_millis() as u64, "connections still open after shutdown timeout, aborting");
            }
        }
        accept_loops.shutdown().await;

        self.shared.pipeline.stop_observers();
        info!("server stopped");
        Ok(())
    }

    /// Starts, waits for SIGTERM or Ctrl-C, then stops.
    pub async fn run_until_signal(&mut self) -> Result<(), Error> {
        self.start().await?;
        shutdown_signal().await;
        info!("shutdown signal received");
        self.stop().await
    }

    // ── Role accessors ────────────────────────────────────────────────────────

    pub fn internal_http_port(&self) -> Result<Option<u16>, Error> {
        self.connectors.role_port(INTERNAL_HTTP, Scheme::Http)
    }

    pub fn internal_https_port(&self) -> Result<Option<u16>, Error> {
        self.connectors.role_port(INTERNAL_HTTPS, Scheme::Https)
    }

    pub fn external_http_port(&self) -> Result<Option<u16>, Error> {
        self.connectors.role_port(EXTERNAL_HTTP, Scheme::Http)
    }

    pub fn external_https_port(&self) -> Result<Option<u16>, Error> {
        self.connectors.role_port(EXTERNAL_HTTPS, Scheme::Https)
    }

    pub fn internal_address(&self) -> Option<&str> {
        self.connectors.role_address([INTERNAL_HTTP, INTERNAL_HTTPS])
    }

    pub fn external_address(&self) -> Option<&str> {
        self.connectors.role_address([EXTERNAL_HTTP, EXTERNAL_HTTPS])
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown first, so a stop request wins over queued connections.
            biased;

            _ = shutdown.changed() => break,

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let shared = Arc::clone(&shared);
                let shutdown = shutdown.clone();
                match tls.clone() {
                    None => {
                        connections.spawn(serve_connection(stream, peer, shared, shutdown));
                    }
                    Some(acceptor) => {
                        connections.spawn(async move {
                            match tokio::time::timeout(shared.max_idle_time, acceptor.accept(stream)).await {
                                Ok(Ok(stream)) => serve_connection(stream, peer, shared, shutdown).await,
                                Ok(Err(e)) => debug!(%peer, "tls handshake failed: {e}"),
                                Err(_) => debug!(%peer, "tls handshake timed out"),
                            }
                        });
                    }
                }
            }

            // Reap finished connections so the set does not grow unbounded.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection<I>(io: I, peer: SocketAddr, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let svc = {
        let shared = Arc::clone(&shared);
        service_fn(move |req| {
            let shared = Arc::clone(&shared);
            async move { Ok::<_, Infallible>(shared.dispatch(req, peer).await) }
        })
    };

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(shared.max_idle_time)
        .max_buf_size(shared.max_header_size);

    let conn = builder.serve_connection(TokioIo::new(io), svc);
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = res {
        debug!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

impl Shared {
    /// Buffers one request and runs it through the pipeline. Never fails:
    /// every problem becomes a status code.
    async fn dispatch(&self, req: hyper::Request<Incoming>, peer: SocketAddr) -> http::Response<Full<Bytes>> {
        let received_at = SystemTime::now();
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(%peer, "reading request body failed: {e}");
                return Response::status(StatusCode::BAD_REQUEST).into_inner();
            }
        };

        let request = Request {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            remote_addr: self.client_address(&parts.headers, peer),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            received_at,
            attributes: HashMap::new(),
        };

        self.pipeline.handle(request).await.into_inner()
    }

    /// The peer address, or the first `X-Forwarded-For` hop when the server
    /// sits behind a trusted proxy.
    fn client_address(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        self.forwarded
            .then(|| headers.get("x-forwarded-for"))
            .flatten()
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(|| peer.ip().to_string(), str::to_owned)
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// Windows only Ctrl-C is available. If a handler cannot be installed the
/// failure is logged and that signal is never seen.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
