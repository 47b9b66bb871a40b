//! Structured request log shipped to syslog as RFC 5424 frames.
//!
//! One datagram per request:
//!
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID [l@12345 m="GET" u="/orders"][rh@12345 accept="*/*"]
//! ```
//!
//! MSGID is the record's random id and PROCID the (whitespace-stripped)
//! name of the thread that served the request. Frames longer than the
//! configured maximum are truncated.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::chain::PostHandler;
use crate::config::{Facility, SyslogLogSettings};
use crate::error::ConfigError;
use crate::log::field::{Exchange, LogFields};
use crate::log::format::{render, StructuredRecord};
use crate::log::spec::{validate_log_fields, FieldSpecifier};
use crate::log::Blacklist;
use crate::request::Request;
use crate::response::Response;

/// RFC 5424 severity `informational`.
const SEVERITY_INFO: u8 = 6;
const NIL: &str = "-";

// ── Transport ─────────────────────────────────────────────────────────────────

/// Where finished frames go.
pub trait SyslogTransport: Send + Sync + 'static {
    fn send(&self, frame: &[u8]) -> io::Result<()>;
}

/// Fire-and-forget UDP. A full socket buffer drops the frame.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let remote = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("`{host}` did not resolve")))?;
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl SyslogTransport for UdpTransport {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.socket.send(frame).map(drop)
    }
}

// ── SyslogRequestLog ──────────────────────────────────────────────────────────

pub struct SyslogRequestLog {
    registry: Arc<LogFields>,
    specs: Vec<FieldSpecifier>,
    blacklist: Blacklist,
    facility: Facility,
    hostname: Option<String>,
    appname: Option<String>,
    namespace: u32,
    max_message_length: usize,
    /// `None` when the configured protocol is unsupported.
    target: Option<(String, u16)>,
    transport: Mutex<Option<Arc<dyn SyslogTransport>>>,
    /// Set by [`with_transport`](Self::with_transport); such a transport
    /// outlives start and stop.
    injected: bool,
    send_failed: AtomicBool,
}

impl SyslogRequestLog {
    pub fn new(settings: &SyslogLogSettings, registry: Arc<LogFields>) -> Result<Self, ConfigError> {
        let specs = validate_log_fields(&registry, &settings.fields)?;

        let target = if settings.protocol.eq_ignore_ascii_case("udp") {
            Some((settings.host.clone(), settings.port))
        } else {
            tracing::warn!(protocol = %settings.protocol, "no syslog transport for protocol, syslog request log disabled");
            None
        };

        Ok(Self {
            registry,
            specs,
            blacklist: Blacklist::new(&settings.blacklist),
            facility: settings.facility,
            hostname: settings.hostname.clone(),
            appname: settings.appname.clone(),
            namespace: settings.namespace,
            max_message_length: settings.max_message_length,
            target,
            transport: Mutex::new(None),
            injected: false,
            send_failed: AtomicBool::new(false),
        })
    }

    /// Uses `transport` instead of connecting to the configured host.
    pub fn with_transport(mut self, transport: impl SyslogTransport) -> Self {
        let transport: Arc<dyn SyslogTransport> = Arc::new(transport);
        self.transport = Mutex::new(Some(transport));
        self.injected = true;
        self
    }

    pub(crate) fn log_at(&self, req: &Request, resp: &Response, now: SystemTime) {
        if self.blacklist.matches(req.path()) {
            return;
        }
        let Some(transport) = self.current_transport() else { return };

        let exchange = Exchange { request: req, response: resp, now };
        let record = StructuredRecord::new(self.namespace, &render(&self.registry, &self.specs, &exchange));
        let frame = self.frame(&record, DateTime::<Utc>::from(now));

        if let Err(e) = transport.send(frame.as_bytes()) {
            if !self.send_failed.swap(true, Ordering::Relaxed) {
                tracing::error!(error = %e, "sending syslog request log failed");
            }
        }
    }

    fn current_transport(&self) -> Option<Arc<dyn SyslogTransport>> {
        self.transport.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn frame(&self, record: &StructuredRecord, at: DateTime<Utc>) -> String {
        let pri = u16::from(self.facility.code()) * 8 + u16::from(SEVERITY_INFO);
        let mut out = format!(
            "<{pri}>1 {} {} {} {} {} ",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            header_field(self.hostname.as_deref()),
            header_field(self.appname.as_deref()),
            header_field(Some(record.thread_name.as_str())),
            header_field(Some(record.message_id.as_str())),
        );

        if record.groups.is_empty() {
            out.push_str(NIL);
        }
        for (id, params) in &record.groups {
            out.push('[');
            out.push_str(id);
            for (name, value) in params {
                out.push_str(&format!(" {name}=\"{}\"", escape_param(value)));
            }
            out.push(']');
        }

        truncate(&mut out, self.max_message_length);
        out
    }
}

impl PostHandler for SyslogRequestLog {
    fn observe(&self, req: &Request, resp: &Response) {
        self.log_at(req, resp, SystemTime::now());
    }

    fn on_start(&self) {
        let mut guard = self.transport.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_some() {
            return;
        }
        let Some((host, port)) = &self.target else { return };
        match UdpTransport::connect(host, *port) {
            Ok(udp) => *guard = Some(Arc::new(udp) as Arc<dyn SyslogTransport>),
            Err(e) => tracing::warn!(host = %host, port, error = %e, "could not reach syslog host"),
        }
    }

    fn on_stop(&self) {
        if self.injected {
            return;
        }
        self.transport.lock().unwrap_or_else(|p| p.into_inner()).take();
    }
}

fn header_field(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(NIL)
}

fn escape_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn truncate(frame: &mut String, max: usize) {
    if frame.len() <= max {
        return;
    }
    let mut end = max;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    frame.truncate(end);
}
