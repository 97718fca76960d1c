//! Collecting a new PIN through an external pinentry program.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::assuan::{ClientError, Connection, ErrorCode};
use crate::error::EnvironmentError;
use crate::secret::Secret;

/// Window title shown by the prompt helper.
pub const DEFAULT_TITLE: &str = "pinentry-gate PIN Prompt";

/// Prompt text shown next to the input field.
pub const DEFAULT_PROMPT: &str = "Please enter your PIN:";

/// Failures while talking to the prompt helper.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The helper could not be started.
    #[error("cannot start {program:?}: {source}")]
    Spawn {
        /// Program that was started
        program: PathBuf,
        /// I/O failure
        #[source]
        source: io::Error,
    },

    /// The helper exited before answering.
    #[error("prompt helper closed the connection")]
    Closed,

    /// The helper broke the protocol or rejected a command.
    #[error("prompt helper protocol error: {0}")]
    Protocol(#[source] ClientError),
}

impl From<ClientError> for PromptError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Closed => PromptError::Closed,
            other => PromptError::Protocol(other),
        }
    }
}

/// What the prompt helper is asked to show.
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    /// Window title
    pub title: &'a str,
    /// Request description with newlines replaced by a literal `\n`
    pub description: String,
    /// Prompt text
    pub prompt: &'a str,
    /// Correlation id passed through for the helper's own caching
    pub key_info: Option<&'a str>,
}

impl<'a> PromptRequest<'a> {
    /// Builds a request, escaping newlines in `description`.
    pub fn new(title: &'a str, description: &str, prompt: &'a str, key_info: Option<&'a str>) -> Self {
        Self {
            title,
            description: description.replace('\n', "\\n"),
            prompt,
            key_info,
        }
    }
}

/// Blocking interactive prompt for a new PIN.
///
/// Returns `Ok(None)` when the user cancelled or entered nothing.
pub trait PromptHelper {
    /// Shows the prompt and waits for the user.
    fn ask(&self, request: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError>;
}

impl<T: PromptHelper + ?Sized> PromptHelper for &T {
    fn ask(&self, request: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
        (**self).ask(request)
    }
}

/// [`PromptHelper`] that runs a pinentry program such as `pinentry-mac`.
#[derive(Debug, Clone)]
pub struct PinentryHelper {
    program: PathBuf,
}

impl PinentryHelper {
    /// Uses the program at `program` as is.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolves `name` on the execution path.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::HelperNotFound`] if it is missing.
    pub fn locate(name: &str) -> Result<Self, EnvironmentError> {
        which::which(name)
            .map(Self::new)
            .map_err(|source| EnvironmentError::HelperNotFound {
                program: name.to_string(),
                source,
            })
    }

    /// Path of the pinentry program.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl PromptHelper for PinentryHelper {
    fn ask(&self, request: &PromptRequest<'_>) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
        let spawn_error = |source| PromptError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let result = match pipes {
            Some((stdin, stdout)) => converse(BufReader::new(stdout), stdin, request),
            None => Err(spawn_error(io::Error::other("child pipes unavailable"))),
        };

        // Pipes are closed by now; the helper exits on EOF or after BYE.
        child.wait().map_err(spawn_error)?;
        result
    }
}

/// Runs the pinentry dialogue over an established pipe pair.
pub(crate) fn converse<R: BufRead, W: Write>(
    reader: R,
    writer: W,
    request: &PromptRequest<'_>,
) -> Result<Option<Secret<Vec<u8>>>, PromptError> {
    let mut conn = Connection::open(reader, writer)?;

    conn.transact("SETTITLE", Some(request.title.as_bytes()))?;
    conn.transact("SETDESC", Some(request.description.as_bytes()))?;
    conn.transact("SETPROMPT", Some(request.prompt.as_bytes()))?;
    if let Some(key_info) = request.key_info {
        conn.transact("SETKEYINFO", Some(key_info.as_bytes()))?;
    }

    let pin = match conn.transact("GETPIN", None) {
        Ok(pin) => Secret::new(pin),
        Err(err) if err.code() == Some(ErrorCode::CANCELED) => {
            let _ = conn.transact("BYE", None);
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    // The helper may exit as soon as it sees BYE.
    let _ = conn.transact("BYE", None);

    if pin.is_empty() {
        Ok(None)
    } else {
        Ok(Some(pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request<'a>(key_info: Option<&'a str>) -> PromptRequest<'a> {
        PromptRequest::new(
            DEFAULT_TITLE,
            "Unlock\n\"Alice <alice@example.com>\"",
            DEFAULT_PROMPT,
            key_info,
        )
    }

    #[test]
    fn newlines_become_literal_markers() {
        let req = request(None);
        assert_eq!(req.description, "Unlock\\n\"Alice <alice@example.com>\"");
    }

    #[test]
    fn full_dialogue_returns_entered_pin() {
        let helper_output = "OK hi\nOK\nOK\nOK\nOK\nD 1234\nOK\nOK closing\n";
        let mut sent = Vec::new();

        let pin = converse(
            Cursor::new(helper_output.as_bytes().to_vec()),
            &mut sent,
            &request(Some("n/CACHE01")),
        )
        .unwrap()
        .expect("pin entered");

        assert_eq!(pin.expose_secret(), b"1234");
        let sent = String::from_utf8(sent).unwrap();
        assert_eq!(
            sent,
            "SETTITLE pinentry-gate PIN Prompt\n\
             SETDESC Unlock\\n\"Alice <alice@example.com>\"\n\
             SETPROMPT Please enter your PIN:\n\
             SETKEYINFO n/CACHE01\n\
             GETPIN\n\
             BYE\n"
        );
    }

    #[test]
    fn keyinfo_is_skipped_without_correlation_id() {
        let helper_output = "OK\nOK\nOK\nOK\nD 1\nOK\nOK\n";
        let mut sent = Vec::new();

        converse(Cursor::new(helper_output.as_bytes().to_vec()), &mut sent, &request(None)).unwrap();

        assert!(!String::from_utf8(sent).unwrap().contains("SETKEYINFO"));
    }

    #[test]
    fn cancel_yields_nothing() {
        let helper_output = "OK\nOK\nOK\nOK\nERR 83886179 Operation cancelled <Pinentry>\nOK\n";
        let result = converse(
            Cursor::new(helper_output.as_bytes().to_vec()),
            Vec::new(),
            &request(None),
        )
        .unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn empty_pin_yields_nothing() {
        let helper_output = "OK\nOK\nOK\nOK\nOK\nOK\n";
        let result = converse(
            Cursor::new(helper_output.as_bytes().to_vec()),
            Vec::new(),
            &request(None),
        )
        .unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn helper_exiting_early_is_closed() {
        let result = converse(Cursor::new(b"OK\nOK\n".to_vec()), Vec::new(), &request(None));
        assert!(matches!(result, Err(PromptError::Closed)));
    }

    #[test]
    fn other_errors_are_protocol_errors() {
        let helper_output = "OK\nOK\nOK\nOK\nERR 83886081 General error\n";
        let result = converse(
            Cursor::new(helper_output.as_bytes().to_vec()),
            Vec::new(),
            &request(None),
        );

        assert!(matches!(result, Err(PromptError::Protocol(_))));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_a_real_helper_process() {
        use std::io::Write as _;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-pinentry");
        let mut script = std::fs::File::create(&path).unwrap();
        writeln!(
            script,
            "#!/bin/sh\n\
             echo 'OK ready'\n\
             while read -r cmd rest; do\n\
               case \"$cmd\" in\n\
                 GETPIN) echo 'D 4321'; echo OK ;;\n\
                 BYE) echo OK; exit 0 ;;\n\
                 *) echo OK ;;\n\
               esac\n\
             done"
        )
        .unwrap();
        drop(script);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let pin = PinentryHelper::new(&path)
            .ask(&request(Some("n/abc")))
            .unwrap()
            .expect("pin entered");
        assert_eq!(pin.expose_secret(), b"4321");
    }

    #[test]
    fn locate_reports_missing_helper() {
        let err = PinentryHelper::locate("pinentry-gate-no-such-helper").unwrap_err();
        assert!(matches!(err, EnvironmentError::HelperNotFound { .. }));
    }
}
