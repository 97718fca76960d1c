use crate::{
    auth::{AuthError, Authenticator},
    capability::ReleaseCap,
    request::SecretLabel,
};

/// Result of one release challenge. Consumed immediately, never stored.
#[derive(Debug)]
pub enum AuthDecision {
    /// The user confirmed; `cap` permits a single read of the entry.
    Allowed {
        /// Reason text the user was shown
        reason: String,
        /// Grant for one store read
        cap: ReleaseCap,
    },
    /// The user declined or failed the challenge.
    Denied {
        /// Reason text the user was shown
        reason: String,
    },
    /// No decision could be reached.
    Error(AuthError),
}

/// The release gate.
///
/// `ReleaseGate` is the only way to obtain a [`ReleaseCap`]. It runs the
/// authenticator once per call; nothing is cached between requests.
///
/// # Examples
///
/// ```
/// use pinentry_gate::{AuthDecision, AuthError, Authenticator, ReleaseGate, SecretLabel};
///
/// struct AlwaysYes;
/// impl Authenticator for AlwaysYes {
///     fn challenge(&self, _reason: &str) -> Result<bool, AuthError> {
///         Ok(true)
///     }
/// }
///
/// let gate = ReleaseGate::new(AlwaysYes);
/// let label = SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4");
///
/// match gate.challenge(&label) {
///     AuthDecision::Allowed { reason, .. } => {
///         assert_eq!(reason, "access the PIN for Alice <alice@example.com> (A1B2C3D4)");
///     }
///     other => panic!("unexpected decision: {:?}", other),
/// }
/// ```
#[derive(Debug)]
pub struct ReleaseGate<A> {
    authenticator: A,
}

impl<A: Authenticator> ReleaseGate<A> {
    /// Creates a gate in front of `authenticator`.
    pub fn new(authenticator: A) -> Self {
        Self { authenticator }
    }

    /// Reason text shown to the user when releasing `label`.
    pub fn reason_for(label: &SecretLabel) -> String {
        format!("access the PIN for {}", label)
    }

    /// Challenges the user and, if allowed, mints a [`ReleaseCap`].
    pub fn challenge(&self, label: &SecretLabel) -> AuthDecision {
        let reason = Self::reason_for(label);

        match self.authenticator.challenge(&reason) {
            Ok(true) => AuthDecision::Allowed {
                reason,
                cap: ReleaseCap::new(),
            },
            Ok(false) => AuthDecision::Denied { reason },
            Err(err) => AuthDecision::Error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording {
        answer: fn() -> Result<bool, AuthError>,
        reasons: RefCell<Vec<String>>,
    }

    impl Authenticator for Recording {
        fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
            self.reasons.borrow_mut().push(reason.to_string());
            (self.answer)()
        }
    }

    fn label() -> SecretLabel {
        SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4")
    }

    #[test]
    fn allowed_challenge_grants_cap() {
        let gate = ReleaseGate::new(Recording {
            answer: || Ok(true),
            reasons: RefCell::new(Vec::new()),
        });

        assert!(matches!(gate.challenge(&label()), AuthDecision::Allowed { .. }));
    }

    #[test]
    fn denied_challenge_carries_reason() {
        let gate = ReleaseGate::new(Recording {
            answer: || Ok(false),
            reasons: RefCell::new(Vec::new()),
        });

        match gate.challenge(&label()) {
            AuthDecision::Denied { reason } => {
                assert_eq!(reason, "access the PIN for Alice <alice@example.com> (A1B2C3D4)");
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn authenticator_errors_are_reported() {
        let gate = ReleaseGate::new(Recording {
            answer: || Err(AuthError::Unavailable("no biometrics enrolled".to_string())),
            reasons: RefCell::new(Vec::new()),
        });

        assert!(matches!(gate.challenge(&label()), AuthDecision::Error(_)));
    }

    #[test]
    fn every_call_runs_a_fresh_challenge() {
        let auth = Recording {
            answer: || Ok(true),
            reasons: RefCell::new(Vec::new()),
        };
        let gate = ReleaseGate::new(&auth);

        let _ = gate.challenge(&label());
        let _ = gate.challenge(&label());

        assert_eq!(auth.reasons.borrow().len(), 2);
    }
}
