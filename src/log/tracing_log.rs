//! Request log emitted as `tracing` events.
//!
//! Each request becomes one `INFO` event with target `berth::request`,
//! carrying the rendered template as its message and the configured logger
//! name as the `logger` field. Whatever subscriber the application installs
//! decides where it ends up.

use std::sync::Arc;
use std::time::SystemTime;

use crate::chain::PostHandler;
use crate::config::TracingLogSettings;
use crate::error::ConfigError;
use crate::log::field::{Exchange, LogFields};
use crate::log::template::Template;
use crate::log::Blacklist;
use crate::request::Request;
use crate::response::Response;

pub struct TracingRequestLog {
    registry: Arc<LogFields>,
    template: Template,
    blacklist: Blacklist,
    logger_name: String,
}

impl TracingRequestLog {
    pub fn new(settings: &TracingLogSettings, registry: Arc<LogFields>) -> Result<Self, ConfigError> {
        let template = Template::compile(&registry, &settings.format)?;
        Ok(Self {
            registry,
            template,
            blacklist: Blacklist::new(&settings.blacklist),
            logger_name: settings.logger_name.clone(),
        })
    }

    /// The line that would be logged, or `None` for blacklisted paths.
    pub(crate) fn line_at(&self, req: &Request, resp: &Response, now: SystemTime) -> Option<String> {
        if self.blacklist.matches(req.path()) {
            return None;
        }
        let exchange = Exchange { request: req, response: resp, now };
        Some(self.template.render(&self.registry, &exchange))
    }
}

impl PostHandler for TracingRequestLog {
    fn observe(&self, req: &Request, resp: &Response) {
        if let Some(line) = self.line_at(req, resp, SystemTime::now()) {
            tracing::info!(target: "berth::request", logger = %self.logger_name, "{line}");
        }
    }
}
