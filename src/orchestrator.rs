//! The decision core: first-use capture versus gated repeat release.

use std::cell::Cell;
use std::rc::Rc;

use crate::audit::{AuditEvent, AuditEventKind, AuditOutcome, AuditTrail};
use crate::auth::Authenticator;
use crate::error::{Error, Violation, ViolationKind};
use crate::gate::{AuthDecision, ReleaseGate};
use crate::logging::{GateLog, RequestLog};
use crate::prompt::{PromptHelper, PromptRequest, DEFAULT_PROMPT, DEFAULT_TITLE};
use crate::request::{CorrelationId, DescriptionParser, PinRequest, RequestParser, SecretLabel};
use crate::secret::Secret;
use crate::store::{SecretRecord, SecretStore, StoreError};

/// Successful outcome of [`AccessOrchestrator::get_secret`].
#[derive(Debug)]
pub enum PinResponse {
    /// A new PIN was entered by the user in this call.
    Captured(Secret<Vec<u8>>),
    /// A stored PIN was released after authentication.
    Released(Secret<Vec<u8>>),
    /// No PIN is returned; the caller may ask again.
    Declined(Decline),
}

impl PinResponse {
    /// Returns the PIN, if any.
    pub fn into_secret(self) -> Option<Secret<Vec<u8>>> {
        match self {
            PinResponse::Captured(pin) | PinResponse::Released(pin) => Some(pin),
            PinResponse::Declined(_) => None,
        }
    }

    /// True if no PIN is returned.
    pub fn is_declined(&self) -> bool {
        matches!(self, PinResponse::Declined(_))
    }
}

/// Why no PIN was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decline {
    /// The authenticator refused the release.
    AuthenticationDenied,
}

/// Answers PIN requests.
///
/// Processes one request at a time to completion. Nothing is cached between
/// calls: each repeat access runs the authenticator again.
///
/// # Examples
///
/// ```
/// use pinentry_gate::{
///     AccessOrchestrator, AuthError, Authenticator, GateLog, MemoryStore, PinRequest,
///     PinResponse, PromptError, PromptHelper, PromptRequest, Secret,
/// };
///
/// struct Typed;
/// impl PromptHelper for Typed {
///     fn ask(&self, _: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
///         Ok(Some(Secret::new(b"1234".to_vec())))
///     }
/// }
///
/// struct Refuse;
/// impl Authenticator for Refuse {
///     fn challenge(&self, _: &str) -> Result<bool, AuthError> {
///         Ok(false)
///     }
/// }
///
/// let store = MemoryStore::new();
/// let gate = AccessOrchestrator::new(&store, Refuse, Typed, GateLog::disabled());
/// let request = PinRequest::from_parts(
///     Some("\"Alice <alice@example.com>\"\nID A1B2C3D4, created 2024-01-01"),
///     Some("n/CACHE1"),
/// );
///
/// // First use stores what was typed.
/// let first = gate.get_secret(&request).unwrap();
/// assert!(matches!(first, PinResponse::Captured(_)));
///
/// // Repeat use is gated by the authenticator.
/// assert!(gate.get_secret(&request).unwrap().is_declined());
/// ```
pub struct AccessOrchestrator<S, A, P, R = DescriptionParser> {
    store: S,
    gate: ReleaseGate<A>,
    prompt: P,
    parser: R,
    log: GateLog,
    audit: Option<Rc<AuditTrail>>,
    title: String,
    prompt_text: String,
    requests: Cell<u64>,
}

impl<S, A: Authenticator, P> AccessOrchestrator<S, A, P> {
    /// Creates an orchestrator with the default description parser.
    pub fn new(store: S, authenticator: A, prompt: P, log: GateLog) -> Self {
        Self {
            store,
            gate: ReleaseGate::new(authenticator),
            prompt,
            parser: DescriptionParser::new(),
            log,
            audit: None,
            title: DEFAULT_TITLE.to_string(),
            prompt_text: DEFAULT_PROMPT.to_string(),
            requests: Cell::new(0),
        }
    }
}

impl<S, A, P, R> AccessOrchestrator<S, A, P, R> {
    /// Replaces the description parser.
    pub fn with_parser<R2>(self, parser: R2) -> AccessOrchestrator<S, A, P, R2> {
        AccessOrchestrator {
            store: self.store,
            gate: self.gate,
            prompt: self.prompt,
            parser,
            log: self.log,
            audit: self.audit,
            title: self.title,
            prompt_text: self.prompt_text,
            requests: self.requests,
        }
    }

    /// Also records every outcome in `trail`.
    pub fn with_audit_trail(mut self, trail: Rc<AuditTrail>) -> Self {
        self.audit = Some(trail);
        self
    }

    /// Overrides the title and prompt text shown by the prompt helper.
    pub fn with_prompt_text(mut self, title: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.title = title.into();
        self.prompt_text = prompt.into();
        self
    }

    /// The diagnostic log this orchestrator writes to.
    pub fn log(&self) -> &GateLog {
        &self.log
    }

    fn begin(&self) -> RequestLog<'_> {
        let n = self.requests.get() + 1;
        self.requests.set(n);
        self.log.for_request(format!("req-{}", n))
    }

    fn record(
        &self,
        log: &RequestLog<'_>,
        kind: AuditEventKind,
        outcome: AuditOutcome,
        label: Option<&SecretLabel>,
        note: Option<&'static str>,
    ) {
        let mut event = AuditEvent::new(log.request_id(), kind, outcome);
        if let Some(label) = label {
            event = event.with_label(label);
        }
        if let Some(note) = note {
            event = event.with_note(note);
        }
        log.audit(&event);
        if let Some(trail) = &self.audit {
            trail.record(event);
        }
    }
}

impl<S, A, P, R> AccessOrchestrator<S, A, P, R>
where
    S: SecretStore,
    A: Authenticator,
    P: PromptHelper,
    R: RequestParser,
{
    /// Returns the PIN for the identity named in `request`.
    ///
    /// If no entry exists the user is prompted and the answer is stored for
    /// next time. If one exists the authenticator must allow the release
    /// before the store is read.
    ///
    /// # Errors
    ///
    /// Errors for which [`Error::is_fatal`] holds mean the process must stop.
    /// The others only fail this request.
    pub fn get_secret(&self, request: &PinRequest) -> Result<PinResponse, Error> {
        let log = self.begin();

        let description = request.description().ok_or_else(|| {
            Violation::new(ViolationKind::MissingDescription, "request carried no description")
        });
        let identity = description.and_then(|d| self.parser.parse(d).map(|id| (d, id)));
        let (description, identity) = match identity {
            Ok(parsed) => parsed,
            Err(violation) => {
                log.error(format_args!("cannot identify request: {}", violation));
                return Err(violation.into());
            }
        };

        let label = identity.label();
        log.info(format_args!("PIN requested for {}", label));

        if self.exists(&log, &label)? {
            self.release(&log, label)
        } else {
            self.capture(&log, request, description, label)
        }
    }

    fn exists(&self, log: &RequestLog<'_>, label: &SecretLabel) -> Result<bool, Error> {
        match self.store.exists(label) {
            Ok(found) => {
                log.debug(format_args!("entry for {} present: {}", label, found));
                Ok(found)
            }
            Err(source) => {
                log.error(format_args!("existence check for {} failed: {}", label, source));
                Err(Error::Lookup {
                    label: label.clone(),
                    source,
                })
            }
        }
    }

    fn capture(
        &self,
        log: &RequestLog<'_>,
        request: &PinRequest,
        description: &str,
        label: SecretLabel,
    ) -> Result<PinResponse, Error> {
        let key_info = request.correlation_id().map(CorrelationId::as_str);
        let prompt = PromptRequest::new(&self.title, description, &self.prompt_text, key_info);

        let pin = match self.prompt.ask(&prompt) {
            Ok(Some(pin)) => pin,
            Ok(None) => {
                log.error(format_args!("prompt helper returned no PIN for {}", label));
                self.record(log, AuditEventKind::Capture, AuditOutcome::Denied, Some(&label), None);
                return Err(Violation::new(
                    ViolationKind::NothingCaptured,
                    format!("prompt helper returned no PIN for {}", label),
                )
                .into());
            }
            Err(err) => {
                log.error(format_args!("prompt for {} failed: {}", label, err));
                self.record(log, AuditEventKind::Capture, AuditOutcome::Error, Some(&label), None);
                return Err(err.into());
            }
        };

        // The helper may have stored the entry itself while the user typed.
        if self.exists(log, &label)? {
            log.info(format_args!(
                "entry for {} was created by the prompt helper; \
                 platform permission will be required on the next run",
                label
            ));
            self.record(
                log,
                AuditEventKind::Capture,
                AuditOutcome::Success,
                Some(&label),
                Some("created by prompt helper"),
            );
            return Ok(PinResponse::Captured(pin));
        }

        let cache_id = match request.correlation_id() {
            Some(correlation_id) => correlation_id.cache_id()?,
            None => {
                return Err(Violation::new(
                    ViolationKind::MissingCorrelationId,
                    format!("cannot store entry for {} without a correlation id", label),
                )
                .into())
            }
        };

        let record = SecretRecord {
            label,
            account: cache_id.to_string(),
            payload: pin,
        };

        match self.store.create(&record) {
            Ok(()) => {
                log.info(format_args!("stored new entry for {}", record.label));
                self.record(
                    log,
                    AuditEventKind::Capture,
                    AuditOutcome::Success,
                    Some(&record.label),
                    Some("stored"),
                );
            }
            Err(StoreError::DuplicateEntry) => {
                log.error(format_args!(
                    "entry for {} appeared after the re-check",
                    record.label
                ));
                self.record(
                    log,
                    AuditEventKind::Capture,
                    AuditOutcome::Error,
                    Some(&record.label),
                    Some("duplicate entry"),
                );
                return Err(Violation::new(
                    ViolationKind::DuplicateEntry,
                    format!("another writer created {} concurrently", record.label),
                )
                .into());
            }
            Err(err) => {
                log.warn(format_args!(
                    "could not store entry for {}: {}",
                    record.label, err
                ));
                self.record(
                    log,
                    AuditEventKind::Capture,
                    AuditOutcome::Success,
                    Some(&record.label),
                    Some("not stored"),
                );
            }
        }

        let SecretRecord { payload, .. } = record;
        Ok(PinResponse::Captured(payload))
    }

    fn release(&self, log: &RequestLog<'_>, label: SecretLabel) -> Result<PinResponse, Error> {
        match self.gate.challenge(&label) {
            AuthDecision::Allowed { reason, cap } => {
                log.info(format_args!("authentication allowed: {}", reason));
                match self.store.read(&label, cap) {
                    Ok(pin) => {
                        self.record(log, AuditEventKind::Release, AuditOutcome::Success, Some(&label), None);
                        Ok(PinResponse::Released(pin))
                    }
                    Err(source) => {
                        log.error(format_args!("reading {} failed: {}", label, source));
                        self.record(
                            log,
                            AuditEventKind::Release,
                            AuditOutcome::Error,
                            Some(&label),
                            Some("read failed"),
                        );
                        Err(Error::Read { label, source })
                    }
                }
            }
            AuthDecision::Denied { reason } => {
                log.info(format_args!("authentication denied: {}", reason));
                self.record(log, AuditEventKind::Release, AuditOutcome::Denied, Some(&label), None);
                Ok(PinResponse::Declined(Decline::AuthenticationDenied))
            }
            AuthDecision::Error(err) => {
                log.error(format_args!("authentication for {} failed: {}", label, err));
                self.record(
                    log,
                    AuditEventKind::Release,
                    AuditOutcome::Error,
                    Some(&label),
                    Some("authenticator failed"),
                );
                Err(err.into())
            }
        }
    }

    /// Answers a confirmation dialog. Always allowed.
    pub fn confirm(&self, description: Option<&str>) -> bool {
        let log = self.begin();
        let label = self.label_of(description);
        log.info(format_args!(
            "confirmation requested for {}; allowed",
            label.as_ref().map_or("an unnamed request", SecretLabel::as_str)
        ));
        self.record(&log, AuditEventKind::Confirm, AuditOutcome::Success, label.as_ref(), None);
        true
    }

    /// Acknowledges an informational message.
    pub fn notify(&self, description: Option<&str>) {
        let log = self.begin();
        let label = self.label_of(description);
        log.info(format_args!(
            "message shown for {}",
            label.as_ref().map_or("an unnamed request", SecretLabel::as_str)
        ));
        self.record(&log, AuditEventKind::Notify, AuditOutcome::Success, label.as_ref(), None);
    }

    fn label_of(&self, description: Option<&str>) -> Option<SecretLabel> {
        description
            .and_then(|d| self.parser.parse(d).ok())
            .map(|identity| identity.label())
    }
}
