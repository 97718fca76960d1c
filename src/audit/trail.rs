use super::{AuditEvent, AuditEventKind, AuditOutcome};
use std::cell::RefCell;

/// In-memory recorder for audit events, in the order they happened.
///
/// ```
/// use pinentry_gate::audit::{AuditEvent, AuditEventKind, AuditOutcome, AuditTrail};
///
/// let trail = AuditTrail::new();
/// trail.record(AuditEvent::new("req-1", AuditEventKind::Release, AuditOutcome::Success));
///
/// assert_eq!(trail.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: RefCell<Vec<AuditEvent>>,
}

impl AuditTrail {
    /// Creates an empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`.
    pub fn record(&self, event: AuditEvent) {
        self.events.borrow_mut().push(event);
    }

    /// Returns a snapshot of all recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.borrow().clone()
    }

    /// Outcomes of the recorded events of `kind`.
    pub fn outcomes(&self, kind: AuditEventKind) -> Vec<AuditOutcome> {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .map(AuditEvent::outcome)
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Drops all recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
