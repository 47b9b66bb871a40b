//! Unified error types.
//!
//! Two layers:
//!
//! - [`ConfigError`] — something in the configuration is wrong. Raised while
//!   the server is being assembled, never while serving a request.
//! - [`Error`] — everything the public API can fail with: configuration,
//!   lifecycle precondition violations, and listener I/O.
//!
//! Application-level failures (404, 403, a failing self-test) are HTTP
//! [`Response`](crate::Response) values, not errors.

/// Invalid configuration, detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log pattern: unknown field <{0}>")]
    UnknownField(String),

    #[error("Bad specifier \"{0}\" has too many colons")]
    TooManyColons(String),

    #[error("invalid log template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("at least one connector must be enabled")]
    NoConnectors,

    #[error("invalid service uri `{uri}`: {reason}")]
    InvalidServiceUri { uri: String, reason: &'static str },

    #[error("invalid static resource base path `{0}`: must be non-empty and start with `/`")]
    InvalidBasePath(String),

    #[error("connector `{0}` is secure but no TLS certificate is configured")]
    MissingTls(String),

    #[error("tls: {0}")]
    Tls(String),

    #[error("loading settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// The error type returned by berth's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A start/stop call made in the wrong state. Programming error.
    #[error("lifecycle: {0}")]
    Lifecycle(&'static str),

    /// The server is running but the connector never received a bound port.
    #[error("connector `{0}` has no bound port although the server was started")]
    PortNotBound(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
