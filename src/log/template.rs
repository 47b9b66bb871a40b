//! `$field$` line templates.
//!
//! A template is literal text with field keys wrapped in `$`. Placeholders
//! take no parameter. An unterminated `$` or an unknown key is rejected when
//! the template is compiled, not when a request is logged.

use crate::error::ConfigError;
use crate::log::field::{display, Exchange, LogField, LogFields};

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Field(LogField),
}

/// A compiled line template.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn compile(registry: &LogFields, template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTemplate { template: template.to_owned(), reason };

        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('$') {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }
            let after = &rest[start + 1..];
            let end = after
                .find('$')
                .ok_or_else(|| invalid(format!("unterminated placeholder at `{}`", &rest[start..])))?;
            let key = &after[..end];
            let field = registry
                .get(key)
                .ok_or_else(|| invalid(format!("unknown field `{key}`")))?;
            segments.push(Segment::Field(field));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, registry: &LogFields, exchange: &Exchange<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field)  => out.push_str(&display(registry.extract(*field, exchange, None).as_ref())),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use http::{Method, StatusCode};

    use super::*;
    use crate::config::TRACING_LOG_FORMAT_DEFAULT;
    use crate::request::Request;
    use crate::response::Response;

    #[test]
    fn default_format_renders() {
        let registry = LogFields::default();
        let template = Template::compile(&registry, TRACING_LOG_FORMAT_DEFAULT).unwrap();

        let start = UNIX_EPOCH + Duration::from_secs(100);
        let req = Request::builder()
            .method(Method::POST)
            .path("/orders")
            .query("page=2")
            .received_at(start)
            .build();
        let resp = Response::status(StatusCode::ACCEPTED);
        let exchange = Exchange { request: &req, response: &resp, now: start + Duration::from_millis(37) };

        assert_eq!(template.render(&registry, &exchange), "Completed POST /orders?page=2 with 202 in 37ms");
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = Template::compile(&LogFields::default(), "took $bogus$").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("unknown field `bogus`"));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        let err = Template::compile(&LogFields::default(), "cost: $method").unwrap_err();
        assert!(err.to_string().contains("unterminated placeholder"));
    }

    #[test]
    fn plain_text_is_kept_verbatim() {
        let registry = LogFields::default();
        let template = Template::compile(&registry, "nothing to see").unwrap();
        let req = Request::builder().build();
        let resp = Response::status(StatusCode::OK);
        let exchange = Exchange { request: &req, response: &resp, now: req.received_at() };
        assert_eq!(template.render(&registry, &exchange), "nothing to see");
    }
}
