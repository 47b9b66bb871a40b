//! Field specifiers: `name` or `name:parameter`.
//!
//! Every sink validates its configured specifier list once, at construction.
//! A bad list is a configuration error and aborts startup.

use std::fmt;

use crate::error::ConfigError;
use crate::log::field::{Exchange, FieldValue, LogField, LogFields};

/// A validated reference to a registered field plus its optional parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldSpecifier {
    field: LogField,
    parameter: Option<String>,
}

impl FieldSpecifier {
    /// Parses one specifier against `registry`.
    ///
    /// Empty segments are ignored, so `"cookie:"` is the same as `"cookie"`.
    pub fn parse(registry: &LogFields, spec: &str) -> Result<Self, ConfigError> {
        let mut parts = spec.split(':').map(str::trim).filter(|p| !p.is_empty());
        let name = parts.next().unwrap_or_default();
        let parameter = parts.next().map(str::to_owned);
        if parts.next().is_some() {
            return Err(ConfigError::TooManyColons(spec.to_owned()));
        }

        let field = registry
            .get(name)
            .ok_or_else(|| ConfigError::UnknownField(spec.to_owned()))?;
        Ok(Self { field, parameter })
    }

    pub fn field(&self) -> LogField {
        self.field
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    pub(crate) fn extract(&self, registry: &LogFields, exchange: &Exchange<'_>) -> Option<FieldValue> {
        registry.extract(self.field, exchange, self.parameter())
    }
}

impl fmt::Display for FieldSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "{}:{p}", self.field.key()),
            None    => f.write_str(self.field.key()),
        }
    }
}

/// Validates a whole specifier list, failing on the first bad entry.
pub fn validate_log_fields<S: AsRef<str>>(
    registry: &LogFields,
    specs: &[S],
) -> Result<Vec<FieldSpecifier>, ConfigError> {
    specs.iter().map(|s| FieldSpecifier::parse(registry, s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::split_list;

    fn validate(list: &str) -> Result<Vec<FieldSpecifier>, ConfigError> {
        validate_log_fields(&LogFields::default(), &split_list(list))
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = validate("remoteAddr,foo").unwrap_err();
        assert_eq!(err.to_string(), "Invalid log pattern: unknown field <foo>");
    }

    #[test]
    fn unknown_field_error_names_the_whole_specifier() {
        let err = validate("cookie2:foo").unwrap_err();
        assert_eq!(err.to_string(), "Invalid log pattern: unknown field <cookie2:foo>");
    }

    #[test]
    fn too_many_colons_is_rejected() {
        let err = validate("remoteAddr,cookie:no-here:bar").unwrap_err();
        assert_eq!(err.to_string(), "Bad specifier \"cookie:no-here:bar\" has too many colons");
    }

    #[test]
    fn parameterised_specifiers_are_accepted() {
        let specs = validate("remoteAddr,cookie:trumpet-json-api-authorization").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].field(), LogField::RemoteAddr);
        assert_eq!(specs[0].parameter(), None);
        assert_eq!(specs[1].field(), LogField::Cookie);
        assert_eq!(specs[1].parameter(), Some("trumpet-json-api-authorization"));
        assert_eq!(specs[1].to_string(), "cookie:trumpet-json-api-authorization");
    }

    #[test]
    fn empty_parameter_is_dropped() {
        let specs = validate("cookie:").unwrap();
        assert_eq!(specs[0].parameter(), None);
    }

    #[test]
    fn defaults_are_valid() {
        validate(crate::config::FILE_LOG_FIELDS_DEFAULT).unwrap();
        validate(crate::config::SYSLOG_LOG_FIELDS_DEFAULT).unwrap();
    }
}
