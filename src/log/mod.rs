//! Request logging.
//!
//! A request log is a [`PostHandler`] that turns each finished exchange into
//! one record. Three sinks exist, each enabled independently under
//! `[request_log.*]`:
//!
//! | Sink | Output |
//! |---|---|
//! | [`FileRequestLog`] | tab-delimited line appended to a file |
//! | [`SyslogRequestLog`] | RFC 5424 structured-data frame over UDP |
//! | [`TracingRequestLog`] | `tracing` event rendered from a `$field$` template |
//!
//! What goes into a record is described by field specifiers (`method`,
//! `cookie:session`, …) resolved against a shared [`LogFields`] registry.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use berth::log::{build_request_logs, LogFields, ServerInfo};
//! use berth::{Pipeline, Router, Settings};
//!
//! # fn main() -> Result<(), berth::Error> {
//! let settings = Settings::load("berth.toml")?;
//! let registry = Arc::new(LogFields::new(ServerInfo::default()));
//! let pipeline = Pipeline::new(Router::new())
//!     .post_shared(build_request_logs(&settings.request_log, registry)?);
//! # Ok(())
//! # }
//! ```

pub mod field;
pub mod file;
pub mod format;
pub mod spec;
pub mod syslog;
pub mod template;
pub mod tracing_log;

use std::sync::Arc;

pub use field::{FieldValue, LogField, LogFields, ServerInfo};
pub use file::FileRequestLog;
pub use spec::{validate_log_fields, FieldSpecifier};
pub use syslog::{SyslogRequestLog, SyslogTransport, UdpTransport};
pub use tracing_log::TracingRequestLog;

use crate::chain::PostHandler;
use crate::config::RequestLogSettings;
use crate::error::ConfigError;

/// Path prefixes that are never logged.
#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    prefixes: Vec<String>,
}

impl Blacklist {
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        Self { prefixes: prefixes.iter().map(|p| p.as_ref().to_owned()).collect() }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Builds every enabled request log, validating its configuration.
pub fn build_request_logs(
    settings: &RequestLogSettings,
    registry: Arc<LogFields>,
) -> Result<Vec<Arc<dyn PostHandler>>, ConfigError> {
    let mut logs: Vec<Arc<dyn PostHandler>> = Vec::new();
    if settings.file.enabled {
        logs.push(Arc::new(FileRequestLog::new(&settings.file, Arc::clone(&registry))?));
    }
    if settings.syslog.enabled {
        logs.push(Arc::new(SyslogRequestLog::new(&settings.syslog, Arc::clone(&registry))?));
    }
    if settings.tracing.enabled {
        logs.push(Arc::new(TracingRequestLog::new(&settings.tracing, registry)?));
    }
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn blacklist_matches_prefixes() {
        let blacklist = Blacklist::new(&["/selftest", "/application.wadl"]);
        assert!(blacklist.matches("/selftest"));
        assert!(blacklist.matches("/selftest/deep"));
        assert!(!blacklist.matches("/orders/selftest"));
        assert!(!Blacklist::default().matches("/anything"));
    }

    #[test]
    fn only_enabled_sinks_are_built() {
        let settings = Settings::from_toml(
            r#"
            [request_log.tracing]
            enabled = true

            [request_log.syslog]
            enabled = true
            protocol = "tcp"
            "#,
        )
        .unwrap();

        let logs = build_request_logs(&settings.request_log, Arc::new(LogFields::default())).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn bad_field_list_fails_the_build() {
        let settings = Settings::from_toml(
            r#"
            [request_log.file]
            enabled = true
            fields = "remoteAddr,foo"
            "#,
        )
        .unwrap();

        let err = build_request_logs(&settings.request_log, Arc::new(LogFields::default())).err().unwrap();
        assert_eq!(err.to_string(), "Invalid log pattern: unknown field <foo>");
    }
}
