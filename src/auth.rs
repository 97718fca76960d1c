//! User-presence challenge.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::error::EnvironmentError;

/// Failure to obtain an allow/deny answer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The challenge program could not be started.
    #[error("cannot run authenticator {program:?}: {source}")]
    Spawn {
        /// Program that was started
        program: PathBuf,
        /// I/O failure
        #[source]
        source: io::Error,
    },

    /// The challenge program exited with neither "allowed" nor "denied".
    #[error("authenticator {program:?} exited with {status}")]
    Status {
        /// Program that was started
        program: PathBuf,
        /// What it exited with
        status: ExitStatus,
    },

    /// The platform authentication service reported an error.
    #[error("authentication unavailable: {0}")]
    Unavailable(String),
}

/// Blocking biometric (or platform credential) challenge.
///
/// `challenge` shows `reason` to the user and blocks until they respond.
/// `Ok(true)` means allowed, `Ok(false)` means denied.
pub trait Authenticator {
    /// Runs one challenge.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no decision could be reached.
    fn challenge(&self, reason: &str) -> Result<bool, AuthError>;
}

impl<T: Authenticator + ?Sized> Authenticator for &T {
    fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
        (**self).challenge(reason)
    }
}

/// [`Authenticator`] backed by an external challenge program.
///
/// The program receives the reason text as its last argument. Exit status
/// 0 means allowed and 1 means denied; anything else, including death by
/// signal, is an error.
///
/// # Examples
///
/// ```no_run
/// use pinentry_gate::{Authenticator, CommandAuthenticator};
///
/// let auth = CommandAuthenticator::new("/usr/local/bin/touchid-check");
/// let allowed = auth.challenge("access the PIN for Alice <alice@example.com> (A1B2C3D4)")?;
/// # Ok::<(), pinentry_gate::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CommandAuthenticator {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandAuthenticator {
    /// Uses the program at `program` as is.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Resolves `name` on the execution path.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::AuthenticatorNotFound`] if it is missing.
    pub fn locate(name: &str) -> Result<Self, EnvironmentError> {
        which::which(name)
            .map(Self::new)
            .map_err(|source| EnvironmentError::AuthenticatorNotFound {
                program: name.to_string(),
                source,
            })
    }

    /// Adds fixed arguments placed before the reason text.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Path of the challenge program.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Authenticator for CommandAuthenticator {
    fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(reason)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| AuthError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(AuthError::Status {
                program: self.program.clone(),
                status,
            }),
        }
    }
}
