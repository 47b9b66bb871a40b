//! The log field registry.
//!
//! A [`LogField`] pulls one value out of a finished request/response pair.
//! Fields are a closed enum; the [`LogFields`] registry maps the names used
//! in configuration (`remoteAddr`, `cookie`, …) to variants and carries the
//! process-level [`ServerInfo`] some fields report.
//!
//! The registry is built once while the application is wired together and
//! shared by reference (`Arc<LogFields>`) with every request log.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::request::Request;
use crate::response::Response;

// ── FieldValue ────────────────────────────────────────────────────────────────

/// One extracted value, before rendering.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(u64),
    Timestamp(DateTime<Utc>),
    Elapsed(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s)      => f.write_str(s),
            Self::Number(n)    => write!(f, "{n}"),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Elapsed(d)   => write!(f, "{}", d.as_millis()),
        }
    }
}

/// Renders an optional value; absent values become the empty string.
pub(crate) fn display(value: Option<&FieldValue>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

// ── ServerInfo ────────────────────────────────────────────────────────────────

/// Static facts about the running process, reported by the `serverInfo*`
/// fields. Everything is optional; unset facts log as empty.
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    pub binary: Option<String>,
    pub version: Option<String>,
    pub mode: Option<String>,
    pub kind: Option<String>,
    pub token: Option<String>,
}

// ── LogField ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LogField {
    Attribute,
    RequestHeader,
    RequestDateHeader,
    ResponseHeader,
    RequestContentLength,
    ResponseContentLength,
    RequestContentType,
    ResponseContentType,
    Method,
    RequestUri,
    Cookie,
    Query,
    RemoteAddr,
    Timestamp,
    ResponseCode,
    ThreadName,
    ElapsedTime,
    ServerInfoBinary,
    ServerInfoVersion,
    ServerInfoMode,
    ServerInfoType,
    ServerInfoToken,
}

impl LogField {
    pub const ALL: [Self; 22] = [
        Self::Attribute,
        Self::RequestHeader,
        Self::RequestDateHeader,
        Self::ResponseHeader,
        Self::RequestContentLength,
        Self::ResponseContentLength,
        Self::RequestContentType,
        Self::ResponseContentType,
        Self::Method,
        Self::RequestUri,
        Self::Cookie,
        Self::Query,
        Self::RemoteAddr,
        Self::Timestamp,
        Self::ResponseCode,
        Self::ThreadName,
        Self::ElapsedTime,
        Self::ServerInfoBinary,
        Self::ServerInfoVersion,
        Self::ServerInfoMode,
        Self::ServerInfoType,
        Self::ServerInfoToken,
    ];

    /// The name used in field specifiers and templates.
    pub fn key(self) -> &'static str {
        match self {
            Self::Attribute             => "attribute",
            Self::RequestHeader         => "requestHeader",
            Self::RequestDateHeader     => "requestDateHeader",
            Self::ResponseHeader        => "responseHeader",
            Self::RequestContentLength  => "requestContentLength",
            Self::ResponseContentLength => "responseContentLength",
            Self::RequestContentType    => "requestContentType",
            Self::ResponseContentType   => "responseContentType",
            Self::Method                => "method",
            Self::RequestUri            => "requestUri",
            Self::Cookie                => "cookie",
            Self::Query                 => "query",
            Self::RemoteAddr            => "remoteAddr",
            Self::Timestamp             => "timestamp",
            Self::ResponseCode          => "responseCode",
            Self::ThreadName            => "threadName",
            Self::ElapsedTime           => "elapsedTime",
            Self::ServerInfoBinary      => "serverInfoBinary",
            Self::ServerInfoVersion     => "serverInfoVersion",
            Self::ServerInfoMode        => "serverInfoMode",
            Self::ServerInfoType        => "serverInfoType",
            Self::ServerInfoToken       => "serverInfoToken",
        }
    }

    /// The compact name used as a key in structured records.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Attribute             => "ra",
            Self::RequestHeader         => "rh",
            Self::RequestDateHeader     => "rd",
            Self::ResponseHeader        => "rs",
            Self::RequestContentLength  => "cl",
            Self::ResponseContentLength => "cc",
            Self::RequestContentType    => "rt",
            Self::ResponseContentType   => "ru",
            Self::Method                => "m",
            Self::RequestUri            => "u",
            Self::Cookie                => "co",
            Self::Query                 => "q",
            Self::RemoteAddr            => "ip",
            Self::Timestamp             => "ts",
            Self::ResponseCode          => "rc",
            Self::ThreadName            => "tn",
            Self::ElapsedTime           => "t",
            Self::ServerInfoBinary      => "sib",
            Self::ServerInfoVersion     => "siv",
            Self::ServerInfoMode        => "sim",
            Self::ServerInfoType        => "sit",
            Self::ServerInfoToken       => "sio",
        }
    }
}

/// What a field extraction can look at.
#[derive(Clone, Copy, Debug)]
pub struct Exchange<'a> {
    pub request: &'a Request,
    pub response: &'a Response,
    /// The moment the field is evaluated. `elapsedTime` measures up to here.
    pub now: SystemTime,
}

// ── LogFields ─────────────────────────────────────────────────────────────────

/// Immutable name → field registry.
#[derive(Clone, Debug)]
pub struct LogFields {
    by_key: HashMap<&'static str, LogField>,
    server_info: ServerInfo,
}

impl LogFields {
    /// Registers every built-in field.
    pub fn new(server_info: ServerInfo) -> Self {
        let by_key = LogField::ALL.into_iter().map(|f| (f.key(), f)).collect();
        Self { by_key, server_info }
    }

    pub fn get(&self, key: &str) -> Option<LogField> {
        self.by_key.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Evaluates `field` against `exchange`. `None` means "no value".
    pub fn extract(&self, field: LogField, exchange: &Exchange<'_>, parameter: Option<&str>) -> Option<FieldValue> {
        let req = exchange.request;
        let resp = exchange.response;
        let text = |s: &str| Some(FieldValue::Text(s.to_owned()));
        let info = |s: &Option<String>| s.as_deref().and_then(text);
        let param = parameter.map(str::trim).filter(|p| !p.is_empty());

        match field {
            LogField::Attribute             => param.and_then(|p| req.attribute(p)).and_then(text),
            LogField::RequestHeader         => param.and_then(|p| req.header(p)).and_then(text),
            LogField::ResponseHeader        => param.and_then(|p| resp.header(p)).and_then(text),
            LogField::Cookie                => param.and_then(|p| req.cookie(p)).and_then(text),
            LogField::RequestDateHeader     => req.header("date")
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| FieldValue::Timestamp(d.with_timezone(&Utc))),
            LogField::RequestContentLength  => req.header("content-length")
                .and_then(|v| v.trim().parse().ok())
                .map(FieldValue::Number),
            LogField::ResponseContentLength => Some(FieldValue::Number(resp.content_length() as u64)),
            LogField::RequestContentType    => req.header("content-type").and_then(text),
            LogField::ResponseContentType   => resp.header("content-type").and_then(text),
            LogField::Method                => text(req.method().as_str()),
            LogField::RequestUri            => text(req.path()),
            LogField::Query                 => req.query().and_then(text),
            LogField::RemoteAddr            => text(req.remote_addr()),
            LogField::Timestamp             => Some(FieldValue::Timestamp(DateTime::<Utc>::from(req.received_at()))),
            LogField::ResponseCode          => Some(FieldValue::Number(u64::from(resp.status_code().as_u16()))),
            LogField::ThreadName            => std::thread::current().name().and_then(text),
            LogField::ElapsedTime           => Some(FieldValue::Elapsed(
                exchange.now.duration_since(req.received_at()).unwrap_or_default(),
            )),
            LogField::ServerInfoBinary      => info(&self.server_info.binary),
            LogField::ServerInfoVersion     => info(&self.server_info.version),
            LogField::ServerInfoMode        => info(&self.server_info.mode),
            LogField::ServerInfoType        => info(&self.server_info.kind),
            LogField::ServerInfoToken       => info(&self.server_info.token),
        }
    }
}

impl Default for LogFields {
    fn default() -> Self { Self::new(ServerInfo::default()) }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use http::StatusCode;

    use super::*;

    fn at(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    fn extract(field: LogField, req: &Request, resp: &Response, param: Option<&str>) -> String {
        let fields = LogFields::default();
        let exchange = Exchange { request: req, response: resp, now: at(11_500) };
        display(fields.extract(field, &exchange, param).as_ref())
    }

    #[test]
    fn every_field_is_registered_under_its_key() {
        let fields = LogFields::default();
        for field in LogField::ALL {
            assert_eq!(fields.get(field.key()), Some(field));
        }
        assert!(!fields.contains("foo"));
    }

    #[test]
    fn elapsed_time_is_measured_at_evaluation() {
        let req = Request::builder().received_at(at(10_000)).build();
        let resp = Response::status(StatusCode::OK);
        assert_eq!(extract(LogField::ElapsedTime, &req, &resp, None), "1500");
    }

    #[test]
    fn timestamp_is_utc_iso8601() {
        let req = Request::builder().received_at(at(1_500)).build();
        let resp = Response::status(StatusCode::OK);
        assert_eq!(extract(LogField::Timestamp, &req, &resp, None), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn request_date_header_is_normalised_to_utc() {
        let req = Request::builder().header("date", "Sun, 06 Nov 1994 08:49:37 GMT").build();
        let resp = Response::status(StatusCode::OK);
        assert_eq!(extract(LogField::RequestDateHeader, &req, &resp, None), "1994-11-06T08:49:37.000Z");
    }

    #[test]
    fn parameterised_fields_need_a_parameter() {
        let req = Request::builder().header("x-a", "1").attribute("user", "alice").build();
        let resp = Response::builder().header("x-b", "2").no_body();

        assert_eq!(extract(LogField::RequestHeader, &req, &resp, Some("X-A")), "1");
        assert_eq!(extract(LogField::ResponseHeader, &req, &resp, Some("x-b")), "2");
        assert_eq!(extract(LogField::Attribute, &req, &resp, Some("user")), "alice");
        assert_eq!(extract(LogField::RequestHeader, &req, &resp, Some("  ")), "");
        assert_eq!(extract(LogField::RequestHeader, &req, &resp, None), "");
    }

    #[test]
    fn content_lengths() {
        let req = Request::builder().header("content-length", "12").build();
        let resp = Response::text("hello");
        assert_eq!(extract(LogField::RequestContentLength, &req, &resp, None), "12");
        assert_eq!(extract(LogField::ResponseContentLength, &req, &resp, None), "5");
        assert_eq!(extract(LogField::ResponseContentType, &req, &resp, None), "text/plain; charset=utf-8");
    }

    #[test]
    fn server_info_comes_from_the_registry() {
        let fields = LogFields::new(ServerInfo { version: Some("1.2.3".to_owned()), ..ServerInfo::default() });
        let req = Request::builder().build();
        let resp = Response::status(StatusCode::OK);
        let exchange = Exchange { request: &req, response: &resp, now: at(0) };

        assert_eq!(fields.extract(LogField::ServerInfoVersion, &exchange, None), Some(FieldValue::Text("1.2.3".to_owned())));
        assert_eq!(fields.extract(LogField::ServerInfoToken, &exchange, None), None);
    }
}
