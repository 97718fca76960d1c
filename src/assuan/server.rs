//! Pinentry-side command loop.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use super::codec::{self, split_keyword, CodecError, ErrorCode};
use crate::error::Error;
use crate::logging::GateLog;
use crate::secret::Secret;

/// Dialog settings accumulated from `SET*` and `OPTION` commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `SETDESC`: free-text description of what is being asked for
    pub description: Option<String>,
    /// `SETPROMPT`
    pub prompt: Option<String>,
    /// `SETTITLE`
    pub title: Option<String>,
    /// `SETOK`
    pub ok: Option<String>,
    /// `SETCANCEL`
    pub cancel: Option<String>,
    /// `SETNOTOK`
    pub not_ok: Option<String>,
    /// `SETERROR`; applies to the next `GETPIN` only
    pub error: Option<String>,
    /// `SETKEYINFO`: the correlation id
    pub key_info: Option<String>,
    /// `SETTIMEOUT` in seconds
    pub timeout: Option<u64>,
    /// `SETREPEAT` was sent
    pub repeat: bool,
    /// `OPTION name[=value]` in arrival order
    pub options: Vec<(String, Option<String>)>,
}

impl Settings {
    /// Returns true if `OPTION name` was received.
    pub fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|(n, _)| n == name)
    }

    fn set_option(&mut self, arg: &str) {
        let (name, value) = match arg.split_once(|c: char| c == '=' || c == ' ') {
            Some((name, value)) => (name.trim(), Some(value.trim().to_string())),
            None => (arg.trim(), None),
        };
        self.options.push((name.to_string(), value));
    }
}

/// How a callback failed.
#[derive(Debug)]
pub enum CallbackError {
    /// Report `code` to the peer and keep serving.
    Failed(ErrorCode),
    /// Report a general error and stop serving.
    Fatal(Error),
}

/// The three operations a pinentry exposes.
pub trait Callbacks {
    /// `GETPIN`. `Ok(None)` means nothing was obtained and is reported as a
    /// cancellation.
    fn get_pin(&mut self, settings: &Settings) -> Result<Option<Secret<Vec<u8>>>, CallbackError>;

    /// `CONFIRM`. `Ok(false)` is reported as "Not confirmed".
    fn confirm(&mut self, settings: &Settings) -> Result<bool, CallbackError>;

    /// `MESSAGE` and `CONFIRM --one-button`.
    fn message(&mut self, settings: &Settings) -> Result<(), CallbackError>;
}

impl<T: Callbacks + ?Sized> Callbacks for &mut T {
    fn get_pin(&mut self, settings: &Settings) -> Result<Option<Secret<Vec<u8>>>, CallbackError> {
        (**self).get_pin(settings)
    }

    fn confirm(&mut self, settings: &Settings) -> Result<bool, CallbackError> {
        (**self).confirm(settings)
    }

    fn message(&mut self, settings: &Settings) -> Result<(), CallbackError> {
        (**self).message(settings)
    }
}

/// Why the serve loop stopped early.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Reading from or writing to the peer failed.
    #[error("protocol i/o failed: {0}")]
    Io(#[from] io::Error),

    /// A callback reported a fatal error.
    #[error("fatal request error: {0}")]
    Fatal(Error),
}

enum Flow {
    Continue,
    Bye,
}

/// Serves one Assuan session over a reader/writer pair.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use pinentry_gate::assuan::{CallbackError, Callbacks, Server, Settings};
/// use pinentry_gate::{GateLog, Secret};
///
/// struct Fixed;
/// impl Callbacks for Fixed {
///     fn get_pin(&mut self, _: &Settings) -> Result<Option<Secret<Vec<u8>>>, CallbackError> {
///         Ok(Some(Secret::new(b"1234".to_vec())))
///     }
///     fn confirm(&mut self, _: &Settings) -> Result<bool, CallbackError> {
///         Ok(true)
///     }
///     fn message(&mut self, _: &Settings) -> Result<(), CallbackError> {
///         Ok(())
///     }
/// }
///
/// let mut output = Vec::new();
/// Server::new(Fixed, GateLog::disabled())
///     .serve(Cursor::new(b"GETPIN\nBYE\n".to_vec()), &mut output)
///     .unwrap();
///
/// assert_eq!(output, b"OK pinentry-gate ready\nD 1234\nOK\nOK closing connection\n");
/// ```
pub struct Server<C> {
    callbacks: C,
    settings: Settings,
    log: GateLog,
}

const GREETING: &str = "pinentry-gate ready";

impl<C: Callbacks> Server<C> {
    /// Creates a server for `callbacks`.
    pub fn new(callbacks: C, log: GateLog) -> Self {
        Self {
            callbacks,
            settings: Settings::default(),
            log,
        }
    }

    /// Runs the session until `BYE`, end of input, or a fatal callback error.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Io`] when the peer connection fails and
    /// [`ServeError::Fatal`] when a callback asks to stop.
    pub fn serve<R: BufRead, W: Write>(&mut self, mut reader: R, mut writer: W) -> Result<(), ServeError> {
        codec::write_ok(&mut writer, Some(GREETING))?;
        writer.flush()?;

        let mut line = Vec::new();
        loop {
            match codec::read_line(&mut reader, &mut line) {
                Ok(true) => {}
                Ok(false) => {
                    self.log.debug(format_args!("peer closed the session"));
                    return Ok(());
                }
                Err(CodecError::Io(err)) => return Err(ServeError::Io(err)),
                Err(CodecError::LineTooLong) => {
                    write_code(&mut writer, ErrorCode::LINE_TOO_LONG)?;
                    writer.flush()?;
                    continue;
                }
                Err(_) => {
                    write_code(&mut writer, ErrorCode::PARAMETER)?;
                    writer.flush()?;
                    continue;
                }
            }

            if line.is_empty() || line[0] == b'#' {
                continue;
            }

            let flow = self.dispatch(&line, &mut writer)?;
            writer.flush()?;
            if let Flow::Bye = flow {
                return Ok(());
            }
        }
    }

    fn dispatch<W: Write>(&mut self, line: &[u8], writer: &mut W) -> Result<Flow, ServeError> {
        let (verb, arg) = split_keyword(line);
        let verb = String::from_utf8_lossy(verb).to_ascii_uppercase();
        self.log.debug(format_args!("assuan command {}", verb));

        let text = match decode_text(arg) {
            Ok(text) => text,
            Err(_) => {
                write_code(writer, ErrorCode::PARAMETER)?;
                return Ok(Flow::Continue);
            }
        };
        let value = || (!text.is_empty()).then(|| text.clone());

        match verb.as_str() {
            "OPTION" => self.settings.set_option(&text),
            "SETDESC" => self.settings.description = value(),
            "SETPROMPT" => self.settings.prompt = value(),
            "SETTITLE" => self.settings.title = value(),
            "SETOK" => self.settings.ok = value(),
            "SETCANCEL" => self.settings.cancel = value(),
            "SETNOTOK" => self.settings.not_ok = value(),
            "SETERROR" => self.settings.error = value(),
            "SETKEYINFO" => {
                self.settings.key_info = if text == "--clear" { None } else { value() };
            }
            "SETTIMEOUT" => match text.trim().parse() {
                Ok(secs) => self.settings.timeout = Some(secs),
                Err(_) => {
                    write_code(writer, ErrorCode::PARAMETER)?;
                    return Ok(Flow::Continue);
                }
            },
            "SETREPEAT" => self.settings.repeat = true,
            "SETREPEATERROR" | "SETREPEATOK" | "SETQUALITYBAR" | "SETQUALITYBAR_TT"
            | "SETGENPIN" | "SETGENPIN_TT" | "NOP" => {}
            "RESET" => self.settings = Settings::default(),
            "GETPIN" => return self.get_pin(writer),
            "CONFIRM" if text.trim() == "--one-button" => return self.message(writer),
            "CONFIRM" => return self.confirm(writer),
            "MESSAGE" => return self.message(writer),
            "GETINFO" => return self.get_info(text.trim(), writer),
            "BYE" => {
                codec::write_ok(writer, Some("closing connection"))?;
                return Ok(Flow::Bye);
            }
            _ => {
                write_code(writer, ErrorCode::UNKNOWN_COMMAND)?;
                return Ok(Flow::Continue);
            }
        }

        codec::write_ok(writer, None)?;
        Ok(Flow::Continue)
    }

    fn get_pin<W: Write>(&mut self, writer: &mut W) -> Result<Flow, ServeError> {
        let result = self.callbacks.get_pin(&self.settings);
        self.settings.error = None;

        match result {
            Ok(Some(pin)) => {
                codec::write_data(writer, pin.expose_secret())?;
                codec::write_ok(writer, None)?;
            }
            Ok(None) => write_code(writer, ErrorCode::CANCELED)?,
            Err(err) => return fail(err, writer),
        }
        Ok(Flow::Continue)
    }

    fn confirm<W: Write>(&mut self, writer: &mut W) -> Result<Flow, ServeError> {
        match self.callbacks.confirm(&self.settings) {
            Ok(true) => codec::write_ok(writer, None)?,
            Ok(false) => write_code(writer, ErrorCode::NOT_CONFIRMED)?,
            Err(err) => return fail(err, writer),
        }
        Ok(Flow::Continue)
    }

    fn message<W: Write>(&mut self, writer: &mut W) -> Result<Flow, ServeError> {
        match self.callbacks.message(&self.settings) {
            Ok(()) => codec::write_ok(writer, None)?,
            Err(err) => return fail(err, writer),
        }
        Ok(Flow::Continue)
    }

    fn get_info<W: Write>(&self, what: &str, writer: &mut W) -> Result<Flow, ServeError> {
        let answer = match what {
            "version" => env!("CARGO_PKG_VERSION").to_string(),
            "pid" => std::process::id().to_string(),
            "flavor" => "gate".to_string(),
            "ttyinfo" => "- - -".to_string(),
            _ => {
                write_code(writer, ErrorCode::PARAMETER)?;
                return Ok(Flow::Continue);
            }
        };
        codec::write_data(writer, answer.as_bytes())?;
        codec::write_ok(writer, None)?;
        Ok(Flow::Continue)
    }
}

fn decode_text(arg: &[u8]) -> Result<String, CodecError> {
    let bytes = codec::percent_decode(arg)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_code<W: Write>(writer: &mut W, code: ErrorCode) -> io::Result<()> {
    codec::write_err(writer, code, code.description())
}

fn fail<W: Write>(err: CallbackError, writer: &mut W) -> Result<Flow, ServeError> {
    match err {
        CallbackError::Failed(code) => {
            write_code(writer, code)?;
            Ok(Flow::Continue)
        }
        CallbackError::Fatal(err) => {
            write_code(writer, ErrorCode::GENERAL)?;
            writer.flush()?;
            Err(ServeError::Fatal(err))
        }
    }
}
