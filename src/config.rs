//! Startup configuration.
//!
//! Everything berth reads from the outside world lives in [`Settings`]. It is
//! consumed once, while the server is assembled; nothing here is re-read at
//! request time.
//!
//! Values come from an optional TOML file layered under environment
//! variables prefixed `BERTH`, with `__` separating nested keys:
//!
//! ```text
//! BERTH__CONNECTORS__INTERNAL__HTTP_PORT=0
//! BERTH__REQUEST_LOG__FILE__ENABLED=true
//! ```
//!
//! Every field has a default, so an empty file (or none at all) yields a
//! server with one plain-HTTP internal connector on port 8080.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

const ENV_PREFIX: &str = "BERTH";

/// Fields written by the file request log unless configured otherwise.
pub const FILE_LOG_FIELDS_DEFAULT: &str = "timestamp,threadName,responseHeader:X-Trumpet-Track,remoteAddr,\
requestHeader:Authorization,method,requestUri,query,responseCode,responseHeader:Content-Length,elapsedTime";

/// Fields sent by the syslog request log unless configured otherwise.
pub const SYSLOG_LOG_FIELDS_DEFAULT: &str = "responseHeader:X-Trumpet-Track,remoteAddr,responseHeader:Content-Length,\
requestHeader:Authorization,requestHeader:X-Ness-Server-Type,requestHeader:X-Ness-Server-Token,\
method,requestUri,query,responseCode,elapsedTime,serverInfoBinary,serverInfoVersion,serverInfoType,serverInfoToken";

/// Line template of the tracing request log unless configured otherwise.
pub const TRACING_LOG_FORMAT_DEFAULT: &str =
    "Completed $method$ $requestUri$?$query$ with $responseCode$ in $elapsedTime$ms";

/// Root of the configuration tree.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub connectors: ConnectorSettings,
    pub request_log: RequestLogSettings,
}

impl Settings {
    /// Loads settings from `path` (if it exists) overlaid with `BERTH__*`
    /// environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parses settings from an in-memory TOML document. No environment overlay.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Knobs handed through to the HTTP engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Trust `X-Forwarded-For` when reporting the client address.
    pub forwarded: bool,
    /// HTTP/1 header read timeout.
    pub max_idle_time_ms: u64,
    /// Grace period for in-flight connections on stop. `None` aborts them
    /// immediately.
    pub shutdown_timeout_ms: Option<u64>,
    /// Upper bound of the HTTP/1 read buffer, which caps the header size.
    pub max_header_size: usize,
    /// Root directory for static resources. Empty means "not configured".
    pub servlet_context_base_path: PathBuf,
    /// Never answer `304 Not Modified` from the static resource handler.
    pub disable_304: bool,
    pub tls: Option<TlsSettings>,
}

impl ServerSettings {
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            forwarded: false,
            max_idle_time_ms: 30_000,
            shutdown_timeout_ms: Some(1_000),
            max_header_size: 16_384,
            servlet_context_base_path: PathBuf::new(),
            disable_304: false,
            tls: None,
        }
    }
}

/// PEM certificate chain and private key for secure connectors.
#[derive(Clone, Debug, Deserialize)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

// ── Connectors ────────────────────────────────────────────────────────────────

/// How the listener set is described.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorMode {
    /// Internal/external × http/https roles fed from platform IP descriptors.
    #[default]
    Platform,
    /// An explicit list of service URIs.
    Standalone,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub mode: ConnectorMode,
    pub internal_http: bool,
    pub internal_https: bool,
    pub external_http: bool,
    pub external_https: bool,
    pub internal: IpDescriptor,
    pub external: IpDescriptor,
    #[serde(deserialize_with = "comma_list")]
    pub service_uris: Vec<String>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            mode: ConnectorMode::Platform,
            internal_http: true,
            internal_https: false,
            external_http: false,
            external_https: false,
            internal: IpDescriptor::default(),
            external: IpDescriptor::default(),
            service_uris: Vec::new(),
        }
    }
}

/// Address and ports the platform assigned to one network side.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IpDescriptor {
    pub ip: String,
    pub http_port: u16,
    pub https_port: u16,
}

impl Default for IpDescriptor {
    fn default() -> Self {
        Self { ip: "0.0.0.0".to_owned(), http_port: 8080, https_port: 8443 }
    }
}

// ── Request logs ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestLogSettings {
    pub file: FileLogSettings,
    pub syslog: SyslogLogSettings,
    pub tracing: TracingLogSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FileLogSettings {
    pub enabled: bool,
    pub file: PathBuf,
    #[serde(deserialize_with = "comma_list")]
    pub blacklist: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub fields: Vec<String>,
}

impl Default for FileLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            file: PathBuf::from("./access.log"),
            blacklist: default_blacklist(),
            fields: split_list(FILE_LOG_FIELDS_DEFAULT),
        }
    }
}

/// Syslog facility names, RFC 5424 numbering.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    Authpriv,
    Ftp,
    #[default]
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl Facility {
    pub fn code(self) -> u8 {
        match self {
            Self::Kern     => 0,
            Self::User     => 1,
            Self::Mail     => 2,
            Self::Daemon   => 3,
            Self::Auth     => 4,
            Self::Syslog   => 5,
            Self::Lpr      => 6,
            Self::News     => 7,
            Self::Uucp     => 8,
            Self::Cron     => 9,
            Self::Authpriv => 10,
            Self::Ftp      => 11,
            Self::Local0   => 16,
            Self::Local1   => 17,
            Self::Local2   => 18,
            Self::Local3   => 19,
            Self::Local4   => 20,
            Self::Local5   => 21,
            Self::Local6   => 22,
            Self::Local7   => 23,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyslogLogSettings {
    pub enabled: bool,
    #[serde(deserialize_with = "comma_list")]
    pub blacklist: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub fields: Vec<String>,
    pub facility: Facility,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub hostname: Option<String>,
    pub appname: Option<String>,
    /// IANA private enterprise number used in structured-data ids.
    pub namespace: u32,
    pub max_message_length: usize,
}

impl Default for SyslogLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blacklist: default_blacklist(),
            fields: split_list(SYSLOG_LOG_FIELDS_DEFAULT),
            facility: Facility::Local0,
            protocol: "udp".to_owned(),
            host: "localhost".to_owned(),
            port: 514,
            hostname: None,
            appname: None,
            namespace: 12345,
            max_message_length: 1023,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TracingLogSettings {
    pub enabled: bool,
    #[serde(deserialize_with = "comma_list")]
    pub blacklist: Vec<String>,
    pub format: String,
    pub logger_name: String,
}

impl Default for TracingLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blacklist: default_blacklist(),
            format: TRACING_LOG_FORMAT_DEFAULT.to_owned(),
            logger_name: "httpserver".to_owned(),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn default_blacklist() -> Vec<String> {
    vec!["/selftest".to_owned(), "/application.wadl".to_owned()]
}

pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Accepts either a real list or a single comma-separated string, so list
/// values can also be supplied through environment variables.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<String>),
        One(String),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items.into_iter()
            .map(|item| item.trim().to_owned())
            .filter(|item| !item.is_empty())
            .collect(),
        OneOrMany::One(s) => split_list(&s),
    })
}
