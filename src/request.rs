//! Incoming HTTP request type.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// An incoming HTTP request, fully buffered.
///
/// Besides the wire data it carries the client address the server decided
/// to report (see `forwarded` in [`ServerSettings`](crate::config::ServerSettings)),
/// the moment the request was received, and free-form string attributes
/// that earlier pipeline stages can leave for later ones.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: String,
    pub(crate) received_at: SystemTime,
    pub(crate) attributes: HashMap<String, String>,
}

impl Request {
    /// Starts building a request by hand, e.g. to unit-test a handler.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            inner: Request {
                method: Method::GET,
                path: "/".to_owned(),
                query: None,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                params: HashMap::new(),
                remote_addr: String::new(),
                received_at: SystemTime::now(),
                attributes: HashMap::new(),
            },
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> &str { &self.remote_addr }
    pub fn received_at(&self) -> SystemTime { self.received_at }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// First cookie named `name`, compared case-insensitively.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }
}

/// Fluent builder for [`Request`]. Obtain via [`Request::builder()`].
#[derive(Debug)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.inner.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.inner.path = path.into();
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.inner.query = Some(query.into());
        self
    }

    /// Appends a header. Invalid names or values are silently skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.inner.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.inner.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.inner.remote_addr = addr.into();
        self
    }

    pub fn received_at(mut self, at: SystemTime) -> Self {
        self.inner.received_at = at;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.set_attribute(key, value);
        self
    }

    pub fn build(self) -> Request {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_is_case_insensitive_and_first_wins() {
        let req = Request::builder()
            .header("cookie", "a=1; Trumpet-JSON-api-AUTHORIZATION=omgwtfbbq")
            .header("cookie", "trumpet-json-api-authorization=second")
            .build();

        assert_eq!(req.cookie("trumpet-json-api-authorization"), Some("omgwtfbbq"));
        assert_eq!(req.cookie("A"), Some("1"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn no_cookie_header_means_no_cookies() {
        let req = Request::builder().build();
        assert_eq!(req.cookie("anything"), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder().header("X-Trace", "abc").build();
        assert_eq!(req.header("x-trace"), Some("abc"));
    }
}
