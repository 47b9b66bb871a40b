//! Listening endpoints and how configuration turns into them.
//!
//! A [`Connector`] is one role → `(scheme, address, port, secure)` mapping.
//! Its port is a two-phase value: a connector configured with port `0` is
//! [`PortState::Pending`] until the server binds the listener, then
//! [`PortState::Bound`] with whatever port the OS picked. The transition
//! happens once, through a [`OnceLock`], and every reader afterwards sees
//! the same port.
//!
//! | Mode | Roles |
//! |---|---|
//! | platform | `internal-http`, `internal-https`, `external-http`, `external-https` |
//! | standalone | `service`, `service-1`, `service-2`, … (one per URI) |

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use http::Uri;

use crate::config::{ConnectorMode, ConnectorSettings, IpDescriptor};
use crate::error::{ConfigError, Error};

pub const INTERNAL_HTTP: &str = "internal-http";
pub const INTERNAL_HTTPS: &str = "internal-https";
pub const EXTERNAL_HTTP: &str = "external-http";
pub const EXTERNAL_HTTPS: &str = "external-https";

// ── Scheme ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http  => "http",
            Self::Https => "https",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Http  => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Where a connector's port currently stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortState {
    /// Not bound yet. Carries the configured port (`0` = ephemeral).
    Pending(u16),
    /// The listener is bound on this port.
    Bound(u16),
}

/// One configured listening endpoint.
///
/// Two connectors are equal when `secure`, requested port, address and
/// scheme match. The role name and the bound port do not take part.
#[derive(Debug)]
pub struct Connector {
    role: String,
    scheme: Scheme,
    secure: bool,
    address: String,
    requested_port: u16,
    bound_port: OnceLock<u16>,
    started: Arc<AtomicBool>,
}

impl Connector {
    fn new(role: impl Into<String>, scheme: Scheme, address: impl Into<String>, port: u16, started: Arc<AtomicBool>) -> Self {
        Self {
            role: role.into(),
            scheme,
            secure: scheme == Scheme::Https,
            address: address.into(),
            requested_port: port,
            bound_port: OnceLock::new(),
            started,
        }
    }

    pub fn role(&self) -> &str { &self.role }
    pub fn scheme(&self) -> Scheme { self.scheme }
    pub fn is_secure(&self) -> bool { self.secure }
    pub fn address(&self) -> &str { &self.address }
    pub fn requested_port(&self) -> u16 { self.requested_port }

    pub fn port_state(&self) -> PortState {
        match self.bound_port.get() {
            Some(&port) => PortState::Bound(port),
            None        => PortState::Pending(self.requested_port),
        }
    }

    /// The port this connector listens on.
    ///
    /// A fixed port is returned as-is, whatever the server state. An
    /// ephemeral port reads `0` before the server starts and the bound port
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::PortNotBound`] when the server is running but this connector
    /// never received a port. That means the start sequence is broken.
    pub fn port(&self) -> Result<u16, Error> {
        if self.requested_port != 0 {
            return Ok(self.requested_port);
        }
        match self.bound_port.get() {
            Some(&port) => Ok(port),
            None if self.started.load(Ordering::Acquire) => Err(Error::PortNotBound(self.role.clone())),
            None => Ok(0),
        }
    }

    /// Publishes the port the listener actually bound. Single assignment.
    pub(crate) fn bind_port(&self, port: u16) -> Result<(), Error> {
        self.bound_port
            .set(port)
            .map_err(|_already| Error::Lifecycle("connector port was already bound"))
    }
}

impl PartialEq for Connector {
    fn eq(&self, other: &Self) -> bool {
        self.secure == other.secure
            && self.requested_port == other.requested_port
            && self.address == other.address
            && self.scheme == other.scheme
    }
}

impl Eq for Connector {}

impl Hash for Connector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.secure.hash(state);
        self.requested_port.hash(state);
        self.address.hash(state);
        self.scheme.hash(state);
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{} ({})",
            self.scheme,
            self.address,
            self.requested_port,
            if self.secure { "secure" } else { "not secure" },
        )
    }
}

// ── Connectors ────────────────────────────────────────────────────────────────

/// The immutable, ordered role → connector set of one server.
#[derive(Debug)]
pub struct Connectors {
    entries: Vec<Connector>,
    started: Arc<AtomicBool>,
}

impl Connectors {
    /// Builds the connector set described by `settings`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoConnectors`] when nothing is enabled, or a service URI
    /// error in standalone mode.
    pub fn from_settings(settings: &ConnectorSettings) -> Result<Self, ConfigError> {
        match settings.mode {
            ConnectorMode::Platform   => Self::platform(settings),
            ConnectorMode::Standalone => Self::standalone(&settings.service_uris),
        }
    }

    /// Internal/external roles, each enabled by its own flag. `http` roles
    /// take the descriptor's `http_port`, `https` roles its `https_port`.
    pub fn platform(settings: &ConnectorSettings) -> Result<Self, ConfigError> {
        let started = Arc::new(AtomicBool::new(false));
        let roles: [(bool, &str, Scheme, &IpDescriptor); 4] = [
            (settings.internal_http,  INTERNAL_HTTP,  Scheme::Http,  &settings.internal),
            (settings.internal_https, INTERNAL_HTTPS, Scheme::Https, &settings.internal),
            (settings.external_http,  EXTERNAL_HTTP,  Scheme::Http,  &settings.external),
            (settings.external_https, EXTERNAL_HTTPS, Scheme::Https, &settings.external),
        ];

        let entries: Vec<Connector> = roles.into_iter()
            .filter(|(enabled, ..)| *enabled)
            .map(|(_, role, scheme, ip)| {
                let port = match scheme {
                    Scheme::Http  => ip.http_port,
                    Scheme::Https => ip.https_port,
                };
                Connector::new(role, scheme, ip.ip.clone(), port, Arc::clone(&started))
            })
            .collect();

        if entries.is_empty() {
            return Err(ConfigError::NoConnectors);
        }
        Ok(Self { entries, started })
    }

    /// One connector per URI: `service`, then `service-1`, `service-2`, ….
    ///
    /// A URI without a port gets the scheme's default; an explicit `:0` asks
    /// for an ephemeral port.
    pub fn standalone<S: AsRef<str>>(uris: &[S]) -> Result<Self, ConfigError> {
        if uris.is_empty() {
            return Err(ConfigError::NoConnectors);
        }

        let started = Arc::new(AtomicBool::new(false));
        let mut entries = Vec::with_capacity(uris.len());

        for (index, raw) in uris.iter().enumerate() {
            let raw = raw.as_ref();
            let invalid = |reason| ConfigError::InvalidServiceUri { uri: raw.to_owned(), reason };

            let uri: Uri = raw.parse().map_err(|_parse| invalid("not a uri"))?;
            let scheme = match uri.scheme_str() {
                Some("http")  => Scheme::Http,
                Some("https") => Scheme::Https,
                Some(_)       => return Err(invalid("scheme must be http or https")),
                None          => return Err(invalid("missing scheme")),
            };
            let host = uri.host()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                .ok_or_else(|| invalid("missing host"))?;
            let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

            let role = if index == 0 { "service".to_owned() } else { format!("service-{index}") };
            entries.push(Connector::new(role, scheme, host, port, Arc::clone(&started)));
        }

        Ok(Self { entries, started })
    }

    pub fn get(&self, role: &str) -> Option<&Connector> {
        self.entries.iter().find(|c| c.role == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connector> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Connectors that each need their own listener, in configuration order.
    ///
    /// A connector equal to an earlier one under a different role is dropped
    /// with a warning; the first role wins.
    pub(crate) fn distinct(&self) -> Vec<&Connector> {
        let mut seen: Vec<&Connector> = Vec::with_capacity(self.entries.len());
        for connector in &self.entries {
            if seen.contains(&connector) {
                tracing::warn!(role = %connector.role, %connector, "multiple configurations for connector, skipping");
                continue;
            }
            seen.push(connector);
        }
        seen
    }

    /// Publishes a bound port to `bound` and every connector equal to it.
    pub(crate) fn publish_port(&self, bound: &Connector, port: u16) -> Result<(), Error> {
        for connector in self.entries.iter().filter(|c| *c == bound) {
            connector.bind_port(port)?;
        }
        Ok(())
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Port of `role`, but only when that role carries `scheme`.
    pub(crate) fn role_port(&self, role: &str, scheme: Scheme) -> Result<Option<u16>, Error> {
        match self.get(role) {
            Some(c) if c.scheme == scheme => c.port().map(Some),
            _ => Ok(None),
        }
    }

    /// Address of the first present role in `roles`.
    pub(crate) fn role_address(&self, roles: [&str; 2]) -> Option<&str> {
        roles.into_iter().find_map(|role| self.get(role)).map(Connector::address)
    }
}
