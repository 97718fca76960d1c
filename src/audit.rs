//! Audit records of PIN access decisions.
//!
//! - `AuditEvent`: what happened to which label, and how it ended
//! - `AuditTrail`: in-memory recorder, mostly for tests and embedding
//!
//! Events only hold labels, request ids and outcomes. PIN bytes never
//! reach an event.

mod event;
mod trail;

pub use event::{AuditEvent, AuditEventKind, AuditOutcome};
pub use trail::AuditTrail;
