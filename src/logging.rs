use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::audit::AuditEvent;
use crate::error::EnvironmentError;

/// Target used for audit lines so they can be filtered separately.
pub const AUDIT_TARGET: &str = "pinentry_audit";

/// Handle to the diagnostic log.
///
/// Every emission runs under this handle's own dispatcher, so nothing is
/// installed globally and tests can capture output per instance. stdout is
/// never written: it carries the Assuan protocol.
///
/// Secret values stay redacted when logged because of their `Debug` and
/// `Display` implementations.
#[derive(Clone)]
pub struct GateLog {
    dispatch: Dispatch,
}

impl fmt::Debug for GateLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateLog").finish_non_exhaustive()
    }
}

impl GateLog {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::LogFile`] if the file cannot be opened.
    pub fn open(path: &Path, filter: EnvFilter) -> Result<Self, EnvironmentError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| EnvironmentError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_writer(Mutex::new(file), filter))
    }

    /// Formats log lines into `make_writer`.
    pub fn with_writer<W>(make_writer: W, filter: EnvFilter) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(make_writer)
            .with_ansi(false)
            .with_env_filter(filter)
            .finish();
        Self::from_dispatch(Dispatch::new(subscriber))
    }

    /// Uses an existing dispatcher.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self::from_dispatch(Dispatch::none())
    }

    /// Returns a logger that tags every line with `request_id`.
    pub fn for_request(&self, request_id: impl Into<String>) -> RequestLog<'_> {
        RequestLog {
            log: self,
            request_id: request_id.into(),
        }
    }

    fn emit(&self, f: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, f);
    }

    /// Logs an info-level message.
    ///
    /// Use with `format_args!`:
    /// ```
    /// # use pinentry_gate::{GateLog, Secret};
    /// let log = GateLog::disabled();
    /// let pin = Secret::new(b"1234".to_vec());
    /// log.info(format_args!("captured {}", pin));
    /// ```
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(|| tracing::info!("{}", args));
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(|| tracing::warn!("{}", args));
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(|| tracing::error!("{}", args));
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(|| tracing::debug!("{}", args));
    }
}

/// A [`GateLog`] bound to one PIN request.
///
/// All messages carry the `request_id` field.
#[derive(Debug)]
pub struct RequestLog<'a> {
    log: &'a GateLog,
    request_id: String,
}

impl RequestLog<'_> {
    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Logs an info-level message.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log
            .emit(|| tracing::info!(request_id = %self.request_id, "{}", args));
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log
            .emit(|| tracing::warn!(request_id = %self.request_id, "{}", args));
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log
            .emit(|| tracing::error!(request_id = %self.request_id, "{}", args));
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log
            .emit(|| tracing::debug!(request_id = %self.request_id, "{}", args));
    }

    /// Writes `event` under [`AUDIT_TARGET`].
    pub fn audit(&self, event: &AuditEvent) {
        self.log.emit(|| {
            tracing::info!(
                target: AUDIT_TARGET,
                request_id = %event.request_id(),
                kind = %event.kind(),
                outcome = %event.outcome(),
                "{}",
                event
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventKind, AuditOutcome};
    use crate::secret::Secret;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(filter: &str) -> (GateLog, Buffer) {
        let buffer = Buffer::default();
        (GateLog::with_writer(buffer.clone(), EnvFilter::new(filter)), buffer)
    }

    #[test]
    fn request_lines_carry_request_id() {
        let (log, buffer) = capture("info");
        log.for_request("req-7").info(format_args!("lookup"));

        let out = buffer.contents();
        assert!(out.contains("lookup"));
        assert!(out.contains("request_id=req-7"));
    }

    #[test]
    fn filter_drops_debug_by_default() {
        let (log, buffer) = capture("info");
        log.debug(format_args!("noisy"));
        log.warn(format_args!("kept"));

        let out = buffer.contents();
        assert!(!out.contains("noisy"));
        assert!(out.contains("kept"));
    }

    #[test]
    fn secrets_stay_redacted() {
        let (log, buffer) = capture("debug");
        let pin = Secret::new(b"zq-pin-xv".to_vec());
        log.for_request("req-1").debug(format_args!("pin {} {:?}", pin, pin));

        let out = buffer.contents();
        assert!(!out.contains("zq-pin-xv"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn audit_lines_use_audit_target() {
        let (log, buffer) = capture("info");
        let event = AuditEvent::new("req-3", AuditEventKind::Release, AuditOutcome::Denied);
        log.for_request("req-3").audit(&event);

        let out = buffer.contents();
        assert!(out.contains(AUDIT_TARGET));
        assert!(out.contains("outcome=denied"));
    }

    #[test]
    fn disabled_log_accepts_everything() {
        let log = GateLog::disabled();
        log.error(format_args!("dropped"));
        log.for_request("req-1").info(format_args!("dropped"));
    }

    #[test]
    fn open_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let log = GateLog::open(&path, EnvFilter::new("info")).unwrap();
        log.info(format_args!("ready"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier run\n"));
        assert!(contents.contains("ready"));
    }

    #[test]
    fn open_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = GateLog::open(dir.path(), EnvFilter::new("info")).unwrap_err();
        assert!(matches!(err, EnvironmentError::LogFile { .. }));
    }
}
