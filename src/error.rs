use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthError;
use crate::prompt::PromptError;
use crate::request::SecretLabel;
use crate::store::StoreError;

/// Errors produced while answering a single request.
///
/// Some variants mean the caller or the environment broke an assumption the
/// gate cannot recover from. [`Error::is_fatal`] tells the protocol adapter
/// whether to keep serving or to stop the process.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller broke the request contract.
    #[error("contract violation: {0}")]
    Violation(#[from] Violation),

    /// The authenticator could not decide whether access is allowed.
    #[error("authenticator failed: {0}")]
    Authenticator(#[from] AuthError),

    /// The existence check against the secret store failed.
    #[error("secret store lookup failed for {label}: {source}")]
    Lookup {
        /// Label that was being looked up
        label: SecretLabel,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// Reading an entry failed after access was granted.
    #[error("secret store read failed for {label}: {source}")]
    Read {
        /// Label that was being read
        label: SecretLabel,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// The prompt helper failed to run or broke the protocol.
    #[error("prompt helper failed: {0}")]
    Prompt(#[from] PromptError),
}

impl Error {
    /// Returns true when the process must stop serving requests.
    ///
    /// A failed lookup is fatal because the gate cannot tell which branch
    /// it is on. A failed prompt is fatal because first use has no other way
    /// to obtain a PIN. A failed read is not: access was already granted and
    /// the caller can simply ask again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Read { .. })
    }
}

/// A broken assumption about the caller or the storage environment.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Violation {
    /// The kind of violation that occurred
    pub kind: ViolationKind,
    /// Human-readable message explaining the violation
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The kind of contract violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The request carried no description at all
    MissingDescription,
    /// The description has no quoted `"Name <email>"` part
    MissingIdentity,
    /// The description has no `ID <keyId>,` part
    MissingKeyId,
    /// The key identifier is neither 8 nor 16 characters long
    InvalidKeyIdLength {
        /// Length that was found
        len: usize,
    },
    /// A new entry must be stored but no correlation id was supplied
    MissingCorrelationId,
    /// The correlation id is not of the form `x/cacheId`
    MalformedCorrelationId,
    /// The store already held the entry the gate was about to create
    DuplicateEntry,
    /// First use, and the prompt helper returned no PIN
    NothingCaptured,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::MissingDescription => write!(f, "missing description"),
            ViolationKind::MissingIdentity => write!(f, "missing identity"),
            ViolationKind::MissingKeyId => write!(f, "missing key id"),
            ViolationKind::InvalidKeyIdLength { len } => {
                write!(f, "invalid key id length {}", len)
            }
            ViolationKind::MissingCorrelationId => write!(f, "missing correlation id"),
            ViolationKind::MalformedCorrelationId => write!(f, "malformed correlation id"),
            ViolationKind::DuplicateEntry => write!(f, "duplicate entry"),
            ViolationKind::NothingCaptured => write!(f, "nothing captured"),
        }
    }
}

/// Failures detected before the first request is served.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The prompt helper program is not on the execution path.
    #[error("PIN entry program {program:?} not found: {source}")]
    HelperNotFound {
        /// Program name that was searched for
        program: String,
        /// Lookup failure
        #[source]
        source: which::Error,
    },

    /// The authenticator program is not on the execution path.
    #[error("authenticator program {program:?} not found: {source}")]
    AuthenticatorNotFound {
        /// Program name that was searched for
        program: String,
        /// Lookup failure
        #[source]
        source: which::Error,
    },

    /// No platform secret store exists for this operating system.
    #[error("no platform secret store is available on {os}")]
    UnsupportedPlatform {
        /// Operating system name
        os: &'static str,
    },

    /// The diagnostic log file could not be opened.
    #[error("cannot open log file {path:?}: {source}")]
    LogFile {
        /// Path that was opened
        path: PathBuf,
        /// I/O failure
        #[source]
        source: io::Error,
    },
}
