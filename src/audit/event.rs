//! Audit event schema.

use std::fmt;

use crate::request::SecretLabel;

/// What kind of access was audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventKind {
    /// A new PIN was collected and stored
    Capture,
    /// A stored PIN was requested
    Release,
    /// A confirmation dialog was requested
    Confirm,
    /// An informational message was requested
    Notify,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEventKind::Capture => write!(f, "capture"),
            AuditEventKind::Release => write!(f, "release"),
            AuditEventKind::Confirm => write!(f, "confirm"),
            AuditEventKind::Notify => write!(f, "notify"),
        }
    }
}

/// How the audited operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// The PIN was delivered, or the dialog was answered
    Success,
    /// The user declined or authentication was refused
    Denied,
    /// The operation failed
    Error,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Denied => write!(f, "denied"),
            AuditOutcome::Error => write!(f, "error"),
        }
    }
}

/// One audited access.
///
/// # Example
///
/// ```
/// use pinentry_gate::audit::{AuditEvent, AuditEventKind, AuditOutcome};
/// use pinentry_gate::SecretLabel;
///
/// let label = SecretLabel::from_parts("Alice", "alice@example.com", "0123ABCD");
/// let event = AuditEvent::new("req-1", AuditEventKind::Release, AuditOutcome::Denied)
///     .with_label(&label)
///     .with_note("authentication refused");
///
/// assert_eq!(event.label(), Some("Alice <alice@example.com> (0123ABCD)"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    request_id: String,
    label: Option<String>,
    kind: AuditEventKind,
    outcome: AuditOutcome,
    note: Option<&'static str>,
}

impl AuditEvent {
    /// Creates an event without a label.
    pub fn new(request_id: impl Into<String>, kind: AuditEventKind, outcome: AuditOutcome) -> Self {
        Self {
            request_id: request_id.into(),
            label: None,
            kind,
            outcome,
            note: None,
        }
    }

    /// Attaches the label of the secret involved.
    pub fn with_label(mut self, label: &SecretLabel) -> Self {
        self.label = Some(label.as_str().to_string());
        self
    }

    /// Attaches a fixed explanation.
    pub fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Request the event belongs to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Label of the secret involved, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// What was accessed.
    pub fn kind(&self) -> AuditEventKind {
        self.kind
    }

    /// How it ended.
    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuditEvent[kind={}, outcome={}, request_id={}, label={}",
            self.kind,
            self.outcome,
            self.request_id,
            self.label.as_deref().unwrap_or("<none>")
        )?;
        if let Some(note) = self.note {
            write!(f, ", note={}", note)?;
        }
        write!(f, "]")
    }
}
