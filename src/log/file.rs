//! Access log written to a local file, one tab-delimited line per request.

use std::fs::{self, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::chain::PostHandler;
use crate::config::FileLogSettings;
use crate::error::ConfigError;
use crate::log::field::{Exchange, LogFields};
use crate::log::format::{delimited_line, render};
use crate::log::spec::{validate_log_fields, FieldSpecifier};
use crate::log::Blacklist;
use crate::request::Request;
use crate::response::Response;

type Sink = Box<dyn Write + Send>;

pub struct FileRequestLog {
    path: PathBuf,
    registry: Arc<LogFields>,
    specs: Vec<FieldSpecifier>,
    blacklist: Blacklist,
    writer: Mutex<Option<Sink>>,
    write_failed: AtomicBool,
}

impl FileRequestLog {
    pub fn new(settings: &FileLogSettings, registry: Arc<LogFields>) -> Result<Self, ConfigError> {
        let specs = validate_log_fields(&registry, &settings.fields)?;
        Ok(Self {
            path: settings.file.clone(),
            registry,
            specs,
            blacklist: Blacklist::new(&settings.blacklist),
            writer: Mutex::new(None),
            write_failed: AtomicBool::new(false),
        })
    }

    /// Opens the log file for appending, creating parent directories.
    ///
    /// Failure leaves the log inert; requests are served regardless.
    pub fn open(&self) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!(path = %parent.display(), error = %e, "could not create request log directory");
                return;
            }
        }

        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => {
                tracing::info!(path = %self.path.display(), "opened request log");
                self.install(Box::new(LineWriter::new(file)));
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not open request log");
            }
        }
    }

    /// Flushes and drops the writer.
    pub fn close(&self) {
        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.flush() {
                tracing::error!(path = %self.path.display(), error = %e, "flushing request log failed");
            }
        }
    }

    pub(crate) fn install(&self, writer: Sink) {
        *self.writer.lock().unwrap_or_else(|p| p.into_inner()) = Some(writer);
        self.write_failed.store(false, Ordering::Relaxed);
    }

    pub(crate) fn log_at(&self, req: &Request, resp: &Response, now: SystemTime) {
        if self.blacklist.matches(req.path()) {
            return;
        }

        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let Some(writer) = guard.as_mut() else { return };

        let exchange = Exchange { request: req, response: resp, now };
        let mut line = delimited_line(&render(&self.registry, &self.specs, &exchange));
        line.push('\n');

        if let Err(e) = writer.write_all(line.as_bytes()) {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                tracing::error!(path = %self.path.display(), error = %e, "writing request log failed");
            }
        }
    }
}

impl PostHandler for FileRequestLog {
    fn observe(&self, req: &Request, resp: &Response) {
        self.log_at(req, resp, SystemTime::now());
    }

    fn on_start(&self) {
        self.open();
    }

    fn on_stop(&self) {
        self.close();
    }
}
