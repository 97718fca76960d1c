//! Requesting side of an Assuan session.

use std::io::{BufRead, Write};

use thiserror::Error;
use zeroize::Zeroize;

use super::codec::{self, CodecError, ErrorCode, Response};

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Framing or I/O failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The peer closed the stream before completing a command.
    #[error("peer closed the connection")]
    Closed,

    /// The peer answered with `ERR`.
    #[error("{command} rejected with {code}: {message}")]
    Rejected {
        /// Command that was rejected
        command: String,
        /// Error code
        code: ErrorCode,
        /// Error text
        message: String,
    },

    /// The peer asked for data this client does not provide.
    #[error("unsupported inquiry {0:?}")]
    Inquire(String),
}

impl ClientError {
    /// Returns the error code if the peer rejected the command.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// An open session with an Assuan server.
pub struct Connection<R, W> {
    reader: R,
    writer: W,
    line: Vec<u8>,
}

impl<R: BufRead, W: Write> Connection<R, W> {
    /// Waits for the server greeting.
    ///
    /// # Errors
    ///
    /// Fails if the server greets with `ERR` or closes the stream.
    pub fn open(reader: R, writer: W) -> Result<Self, ClientError> {
        let mut conn = Self {
            reader,
            writer,
            line: Vec::new(),
        };
        conn.collect("greeting")?;
        Ok(conn)
    }

    /// Sends one command and collects its data until `OK`.
    ///
    /// `arg` is percent-escaped before sending. The returned bytes are the
    /// concatenated, decoded `D` lines.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] when the server answers `ERR`.
    pub fn transact(&mut self, command: &str, arg: Option<&[u8]>) -> Result<Vec<u8>, ClientError> {
        let mut out = Vec::with_capacity(command.len() + arg.map_or(0, <[u8]>::len) + 2);
        out.extend_from_slice(command.as_bytes());
        if let Some(arg) = arg {
            out.push(b' ');
            codec::percent_encode(arg, &mut out);
        }
        out.push(b'\n');

        let sent = self.writer.write_all(&out).and_then(|()| self.writer.flush());
        out.zeroize();
        sent.map_err(CodecError::from)?;

        self.collect(command)
    }

    fn collect(&mut self, command: &str) -> Result<Vec<u8>, ClientError> {
        let mut data = Vec::new();

        let outcome = loop {
            match codec::read_line(&mut self.reader, &mut self.line) {
                Ok(true) => {}
                Ok(false) => break Err(ClientError::Closed),
                Err(err) => break Err(err.into()),
            }

            match Response::parse(&self.line) {
                Ok(Response::Ok(_)) => break Ok(()),
                Ok(Response::Err { code, message }) => {
                    break Err(ClientError::Rejected {
                        command: command.to_string(),
                        code,
                        message,
                    })
                }
                Ok(Response::Data(mut bytes)) => {
                    data.extend_from_slice(&bytes);
                    bytes.zeroize();
                }
                Ok(Response::Status { .. }) | Ok(Response::Comment) => {}
                Ok(Response::Inquire(keyword)) => break Err(ClientError::Inquire(keyword)),
                Err(err) => break Err(err.into()),
            }
        };
        self.line.zeroize();

        match outcome {
            Ok(()) => Ok(data),
            Err(err) => {
                data.zeroize();
                Err(err)
            }
        }
    }
}
