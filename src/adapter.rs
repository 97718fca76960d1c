//! Glue between the Assuan server and the orchestrator.

use crate::assuan::{CallbackError, Callbacks, ErrorCode, Settings};
use crate::auth::Authenticator;
use crate::error::Error;
use crate::orchestrator::AccessOrchestrator;
use crate::prompt::PromptHelper;
use crate::request::{PinRequest, RequestParser};
use crate::secret::Secret;
use crate::store::SecretStore;

/// Serves pinentry callbacks from an [`AccessOrchestrator`].
///
/// A declined request is reported as a cancellation. A non-fatal error is
/// reported as a general error and the session continues. A fatal error ends
/// the session.
pub struct PinentrySession<S, A, P, R> {
    orchestrator: AccessOrchestrator<S, A, P, R>,
}

impl<S, A, P, R> PinentrySession<S, A, P, R> {
    /// Wraps `orchestrator`.
    pub fn new(orchestrator: AccessOrchestrator<S, A, P, R>) -> Self {
        Self { orchestrator }
    }

    /// The wrapped orchestrator.
    pub fn orchestrator(&self) -> &AccessOrchestrator<S, A, P, R> {
        &self.orchestrator
    }
}

fn callback_error(err: Error) -> CallbackError {
    if err.is_fatal() {
        CallbackError::Fatal(err)
    } else {
        CallbackError::Failed(ErrorCode::GENERAL)
    }
}

impl<S, A, P, R> Callbacks for PinentrySession<S, A, P, R>
where
    S: SecretStore,
    A: Authenticator,
    P: PromptHelper,
    R: RequestParser,
{
    fn get_pin(&mut self, settings: &Settings) -> Result<Option<Secret<Vec<u8>>>, CallbackError> {
        let request = PinRequest::from_parts(settings.description.as_deref(), settings.key_info.as_deref());

        match self.orchestrator.get_secret(&request) {
            Ok(response) => Ok(response.into_secret()),
            Err(err) => {
                self.orchestrator
                    .log()
                    .debug(format_args!("GETPIN failed: {}", err));
                Err(callback_error(err))
            }
        }
    }

    fn confirm(&mut self, settings: &Settings) -> Result<bool, CallbackError> {
        Ok(self.orchestrator.confirm(settings.description.as_deref()))
    }

    fn message(&mut self, settings: &Settings) -> Result<(), CallbackError> {
        self.orchestrator.notify(settings.description.as_deref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assuan::{ServeError, Server};
    use crate::auth::AuthError;
    use crate::logging::GateLog;
    use crate::prompt::{PromptError, PromptRequest};
    use crate::request::DescriptionParser;
    use crate::capability::ReleaseCap;
    use crate::store::{MemoryStore, SecretRecord, StoreError};
    use std::io::Cursor;

    struct Typed(&'static [u8]);

    impl PromptHelper for Typed {
        fn ask(&self, _: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
            Ok(Some(Secret::new(self.0.to_vec())))
        }
    }

    struct Broken;

    impl PromptHelper for Broken {
        fn ask(&self, _: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
            Err(PromptError::Closed)
        }
    }

    struct Allow(bool);

    impl Authenticator for Allow {
        fn challenge(&self, _: &str) -> Result<bool, AuthError> {
            Ok(self.0)
        }
    }

    struct Unreadable<'a>(&'a MemoryStore);

    impl SecretStore for Unreadable<'_> {
        fn exists(&self, label: &crate::SecretLabel) -> Result<bool, StoreError> {
            self.0.exists(label)
        }

        fn read(&self, _: &crate::SecretLabel, _: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
            Err(StoreError::backend("interaction not allowed"))
        }

        fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
            self.0.create(record)
        }
    }

    fn serve<S: SecretStore, P: PromptHelper>(
        store: S,
        allow: bool,
        prompt: P,
        script: &str,
    ) -> (Result<(), ServeError>, String) {
        let orchestrator = AccessOrchestrator::new(store, Allow(allow), prompt, GateLog::disabled());
        let mut session: PinentrySession<_, _, _, DescriptionParser> = PinentrySession::new(orchestrator);
        let mut output = Vec::new();
        let result = Server::new(&mut session, GateLog::disabled())
            .serve(Cursor::new(script.as_bytes().to_vec()), &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    const SETUP: &str = "SETDESC %22Alice <alice@example.com>%22%0AID A1B2C3D4, created\n\
                         SETKEYINFO n/CACHE01\n";

    #[test]
    fn captured_pin_is_sent_as_data() {
        let store = MemoryStore::new();
        let (result, out) = serve(&store, false, Typed(b"1234"), &format!("{}GETPIN\nBYE\n", SETUP));

        result.unwrap();
        assert!(out.contains("\nD 1234\nOK\n"));
    }

    #[test]
    fn denied_release_is_cancelled() {
        let store = MemoryStore::new();
        store.insert(
            &crate::SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4"),
            "CACHE01",
            b"1234",
        );
        let (result, out) = serve(&store, false, Typed(b"0000"), &format!("{}GETPIN\nBYE\n", SETUP));

        result.unwrap();
        assert!(out.contains("ERR 83886179 Operation cancelled <Pinentry>"));
        assert!(!out.contains("1234"));
    }

    #[test]
    fn transient_error_keeps_serving() {
        let memory = MemoryStore::new();
        memory.insert(
            &crate::SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4"),
            "CACHE01",
            b"1234",
        );
        let (result, out) = serve(
            Unreadable(&memory),
            true,
            Broken,
            &format!("{}GETPIN\nGETINFO flavor\nBYE\n", SETUP),
        );

        result.unwrap();
        assert!(out.contains("ERR 83886081 General error <Pinentry>"));
        assert!(out.contains("D gate"));
        assert!(!out.contains("1234"));
    }

    #[test]
    fn failing_helper_ends_the_session() {
        let store = MemoryStore::new();
        let (result, out) = serve(&store, false, Broken, &format!("{}GETPIN\nGETINFO flavor\nBYE\n", SETUP));

        assert!(matches!(result, Err(ServeError::Fatal(_))));
        assert!(out.ends_with("ERR 83886081 General error <Pinentry>\n"));
        assert!(!out.contains("D gate"));
    }

    #[test]
    fn contract_violation_ends_the_session() {
        let store = MemoryStore::new();
        let (result, out) = serve(
            &store,
            true,
            Typed(b"1234"),
            "SETDESC %22Alice <alice@example.com>%22 ID ABCDEFG,\nGETPIN\nBYE\n",
        );

        assert!(matches!(result, Err(ServeError::Fatal(_))));
        assert!(out.contains("ERR 83886081"));
        assert!(!out.contains("closing connection"));
        assert!(store.is_empty());
    }

    #[test]
    fn confirm_and_message_succeed() {
        let store = MemoryStore::new();
        let (result, out) = serve(&store, false, Broken, "CONFIRM\nMESSAGE\nBYE\n");

        result.unwrap();
        assert_eq!(out, "OK pinentry-gate ready\nOK\nOK\nOK closing connection\n");
    }
}
