//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use pinentry_gate::{
    AuthError, Authenticator, GateLog, MemoryStore, PromptError, PromptHelper, PromptRequest,
    ReleaseCap, Secret, SecretLabel, SecretRecord, SecretStore, StoreError,
};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const ALICE_DESC: &str = "Please unlock the card\n\n\
                              Number: 12 345 678\n\
                              Holder: \"Alice <alice@example.com>\"\n\
                              ED25519 key, ID A1B2C3D4, created 2024-01-01.";

pub const ALICE_CORRELATION: &str = "n/CACHE01";

pub fn alice() -> SecretLabel {
    SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4")
}

/// Authenticator answering from a script, recording every reason shown.
#[derive(Default)]
pub struct ScriptedAuth {
    answers: RefCell<VecDeque<Result<bool, AuthError>>>,
    reasons: RefCell<Vec<String>>,
}

impl ScriptedAuth {
    pub fn new(answers: impl IntoIterator<Item = Result<bool, AuthError>>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            reasons: RefCell::default(),
        }
    }

    pub fn allowing() -> Self {
        Self::new((0..8).map(|_| Ok(true)))
    }

    pub fn denying() -> Self {
        Self::new((0..8).map(|_| Ok(false)))
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.reasons.borrow().len()
    }
}

impl Authenticator for ScriptedAuth {
    fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
        self.reasons.borrow_mut().push(reason.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected challenge: {}", reason))
    }
}

/// What the prompt helper sends back.
#[derive(Clone)]
pub enum Typed {
    Pin(&'static [u8]),
    Nothing,
    Fails,
}

/// Prompt helper returning a fixed answer.
///
/// With `racing` set it also stores the typed PIN itself, the way a helper
/// with its own keychain integration does.
pub struct ScriptedPrompt<'a> {
    answer: Typed,
    racing: Option<&'a MemoryStore>,
    calls: Cell<usize>,
    seen: RefCell<Vec<(String, Option<String>)>>,
}

impl<'a> ScriptedPrompt<'a> {
    pub fn new(answer: Typed) -> Self {
        Self {
            answer,
            racing: None,
            calls: Cell::new(0),
            seen: RefCell::default(),
        }
    }

    pub fn racing_into(mut self, store: &'a MemoryStore) -> Self {
        self.racing = Some(store);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Descriptions and key infos the helper was shown.
    pub fn seen(&self) -> Vec<(String, Option<String>)> {
        self.seen.borrow().clone()
    }
}

impl PromptHelper for ScriptedPrompt<'_> {
    fn ask(&self, request: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push((
            request.description.clone(),
            request.key_info.map(str::to_string),
        ));

        match self.answer {
            Typed::Pin(pin) => {
                if let Some(store) = self.racing {
                    store.insert(&alice(), "helper-owned", pin);
                }
                Ok(Some(Secret::new(pin.to_vec())))
            }
            Typed::Nothing => Ok(None),
            Typed::Fails => Err(PromptError::Closed),
        }
    }
}

/// Failure to inject into [`CountingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inject {
    None,
    Duplicate,
    Backend,
}

/// Store wrapper counting calls and injecting failures.
pub struct CountingStore<S> {
    inner: S,
    pub exists_calls: Cell<usize>,
    pub read_calls: Cell<usize>,
    pub create_calls: Cell<usize>,
    pub fail_exists: Cell<bool>,
    pub fail_read: Cell<bool>,
    pub fail_create: Cell<Inject>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            exists_calls: Cell::new(0),
            read_calls: Cell::new(0),
            create_calls: Cell::new(0),
            fail_exists: Cell::new(false),
            fail_read: Cell::new(false),
            fail_create: Cell::new(Inject::None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn touched(&self) -> usize {
        self.exists_calls.get() + self.read_calls.get() + self.create_calls.get()
    }
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

impl<S: SecretStore> SecretStore for CountingStore<S> {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        bump(&self.exists_calls);
        if self.fail_exists.get() {
            return Err(StoreError::backend("keychain locked"));
        }
        self.inner.exists(label)
    }

    fn read(&self, label: &SecretLabel, cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        bump(&self.read_calls);
        if self.fail_read.get() {
            return Err(StoreError::backend("interaction not allowed"));
        }
        self.inner.read(label, cap)
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        bump(&self.create_calls);
        match self.fail_create.get() {
            Inject::None => self.inner.create(record),
            Inject::Duplicate => Err(StoreError::DuplicateEntry),
            Inject::Backend => Err(StoreError::backend("write failed")),
        }
    }
}

/// Captured log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// A debug-level log writing into a fresh buffer.
    pub fn log() -> (GateLog, LogBuffer) {
        let buffer = LogBuffer::default();
        let log = GateLog::with_writer(buffer.clone(), EnvFilter::new("debug"));
        (log, buffer)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
