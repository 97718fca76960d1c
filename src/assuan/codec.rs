//! Line framing and escaping for the Assuan protocol.

use std::fmt;
use std::io::{self, BufRead, Read, Write};

use thiserror::Error;
use zeroize::Zeroize;

/// Longest line either side may send, excluding the newline.
pub const MAX_LINE_LEN: usize = 1000;

/// Framing failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded [`MAX_LINE_LEN`].
    #[error("line too long")]
    LineTooLong,

    /// A `%XX` escape was truncated or not hexadecimal.
    #[error("invalid percent escape")]
    BadEscape,

    /// A response line did not start with a known keyword.
    #[error("unexpected response line")]
    UnexpectedLine,
}

/// A gpg-error code as carried on `ERR` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// GPG_ERR_GENERAL from the pinentry source.
    pub const GENERAL: ErrorCode = ErrorCode(83886081);
    /// GPG_ERR_CANCELED from the pinentry source.
    pub const CANCELED: ErrorCode = ErrorCode(83886179);
    /// GPG_ERR_NOT_CONFIRMED from the pinentry source.
    pub const NOT_CONFIRMED: ErrorCode = ErrorCode(83886194);
    /// GPG_ERR_ASS_LINE_TOO_LONG from the pinentry source.
    pub const LINE_TOO_LONG: ErrorCode = ErrorCode(83886343);
    /// GPG_ERR_ASS_UNKNOWN_CMD from the pinentry source.
    pub const UNKNOWN_COMMAND: ErrorCode = ErrorCode(83886355);
    /// GPG_ERR_ASS_PARAMETER from the pinentry source.
    pub const PARAMETER: ErrorCode = ErrorCode(83886360);

    /// Default human-readable text for the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::CANCELED => "Operation cancelled",
            ErrorCode::NOT_CONFIRMED => "Not confirmed",
            ErrorCode::LINE_TOO_LONG => "Line too long",
            ErrorCode::UNKNOWN_COMMAND => "Unknown IPC command",
            ErrorCode::PARAMETER => "IPC parameter error",
            _ => "General error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Appends `data` to `out`, escaping `%`, CR and LF.
pub fn percent_encode(data: &[u8], out: &mut Vec<u8>) {
    for &byte in data {
        match byte {
            b'%' | b'\r' | b'\n' => {
                out.push(b'%');
                out.push(hex_digit(byte >> 4));
                out.push(hex_digit(byte & 0x0f));
            }
            _ => out.push(byte),
        }
    }
}

/// Decodes every `%XX` escape in `input`.
///
/// # Errors
///
/// Returns [`CodecError::BadEscape`] on a truncated or non-hex escape.
pub fn percent_decode(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.iter().copied();

    while let Some(byte) = bytes.next() {
        if byte != b'%' {
            out.push(byte);
            continue;
        }
        let hi = bytes.next().and_then(hex_value).ok_or(CodecError::BadEscape)?;
        let lo = bytes.next().and_then(hex_value).ok_or(CodecError::BadEscape)?;
        out.push((hi << 4) | lo);
    }

    Ok(out)
}

fn hex_digit(nibble: u8) -> u8 {
    b"0123456789ABCDEF"[usize::from(nibble)]
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Reads one line into `buf`, without its line ending.
///
/// Returns `Ok(false)` at end of stream. An over-long line is consumed up
/// to its newline before [`CodecError::LineTooLong`] is returned, so the
/// stream stays framed.
pub fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, CodecError> {
    buf.zeroize();
    buf.clear();

    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(true);
    }
    if buf.len() <= MAX_LINE_LEN {
        // Last line of the stream, unterminated.
        return Ok(true);
    }

    let mut rest = Vec::new();
    reader.read_until(b'\n', &mut rest)?;
    buf.zeroize();
    Err(CodecError::LineTooLong)
}

/// Writes `D` lines carrying `data`, split so no line exceeds the limit.
pub fn write_data<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    // Worst case every byte expands to three.
    const CHUNK: usize = (MAX_LINE_LEN - 2) / 3;

    let mut line = Vec::with_capacity(MAX_LINE_LEN + 1);
    for chunk in data.chunks(CHUNK) {
        line.clear();
        line.extend_from_slice(b"D ");
        percent_encode(chunk, &mut line);
        line.push(b'\n');
        writer.write_all(&line)?;
    }
    line.zeroize();
    Ok(())
}

/// Writes an `OK` line with an optional comment.
pub fn write_ok<W: Write>(writer: &mut W, comment: Option<&str>) -> io::Result<()> {
    match comment {
        Some(text) => writeln!(writer, "OK {}", text),
        None => writer.write_all(b"OK\n"),
    }
}

/// Writes an `ERR` line.
pub fn write_err<W: Write>(writer: &mut W, code: ErrorCode, message: &str) -> io::Result<()> {
    writeln!(writer, "ERR {} {} <Pinentry>", code, message)
}

/// One line sent by the serving side.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// Command completed.
    Ok(Option<String>),
    /// Command failed.
    Err {
        /// Error code
        code: ErrorCode,
        /// Text after the code
        message: String,
    },
    /// Decoded payload line.
    Data(Vec<u8>),
    /// Status line.
    Status {
        /// Status keyword
        keyword: String,
        /// Remaining text
        text: String,
    },
    /// The server asks the client for more data.
    Inquire(String),
    /// Comment line.
    Comment,
}

impl Response {
    /// Parses one line without its line ending.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedLine`] on unknown keywords and
    /// [`CodecError::BadEscape`] on a malformed `D` line.
    pub fn parse(line: &[u8]) -> Result<Response, CodecError> {
        let (keyword, rest) = split_keyword(line);
        let text = || String::from_utf8_lossy(rest).into_owned();

        match keyword {
            b"OK" => Ok(Response::Ok(if rest.is_empty() { None } else { Some(text()) })),
            b"ERR" => {
                let (code, message) = split_keyword(rest);
                let code = std::str::from_utf8(code)
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .ok_or(CodecError::UnexpectedLine)?;
                Ok(Response::Err {
                    code: ErrorCode(code),
                    message: String::from_utf8_lossy(message).into_owned(),
                })
            }
            b"D" => Ok(Response::Data(percent_decode(rest)?)),
            b"S" => {
                let (status, text) = split_keyword(rest);
                Ok(Response::Status {
                    keyword: String::from_utf8_lossy(status).into_owned(),
                    text: String::from_utf8_lossy(text).into_owned(),
                })
            }
            b"INQUIRE" => Ok(Response::Inquire(text())),
            _ if line.first() == Some(&b'#') => Ok(Response::Comment),
            _ => Err(CodecError::UnexpectedLine),
        }
    }
}

/// Splits at the first space; the separator is dropped.
pub(crate) fn split_keyword(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|&b| b == b' ') {
        Some(at) => (&line[..at], &line[at + 1..]),
        None => (line, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn percent_encoding_escapes_only_framing_bytes() {
        let mut out = Vec::new();
        percent_encode(b"50% off\r\nnow", &mut out);
        assert_eq!(out, b"50%25 off%0D%0Anow");
    }

    #[test]
    fn percent_decoding_accepts_either_case() {
        assert_eq!(percent_decode(b"a%0ab%0Ac%25").unwrap(), b"a\nb\nc%");
    }

    #[test]
    fn truncated_escape_is_rejected() {
        assert!(matches!(percent_decode(b"abc%0"), Err(CodecError::BadEscape)));
        assert!(matches!(percent_decode(b"%zz"), Err(CodecError::BadEscape)));
    }

    #[test]
    fn read_line_strips_line_endings() {
        let mut reader = Cursor::new(b"GETPIN\r\nBYE\nlast".to_vec());
        let mut buf = Vec::new();

        assert!(read_line(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, b"GETPIN");
        assert!(read_line(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, b"BYE");
        assert!(read_line(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, b"last");
        assert!(!read_line(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn over_long_line_is_skipped_and_reported() {
        let mut input = vec![b'x'; MAX_LINE_LEN + 10];
        input.extend_from_slice(b"\nNOP\n");
        let mut reader = Cursor::new(input);
        let mut buf = Vec::new();

        assert!(matches!(
            read_line(&mut reader, &mut buf),
            Err(CodecError::LineTooLong)
        ));
        assert!(read_line(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, b"NOP");
    }

    #[test]
    fn line_at_the_limit_is_accepted() {
        let mut input = vec![b'y'; MAX_LINE_LEN];
        input.push(b'\n');
        let mut reader = Cursor::new(input);
        let mut buf = Vec::new();

        assert!(read_line(&mut reader, &mut buf).unwrap());
        assert_eq!(buf.len(), MAX_LINE_LEN);
    }

    #[test]
    fn long_data_is_split_across_lines() {
        let data = vec![b'%'; 700];
        let mut out = Vec::new();
        write_data(&mut out, &data).unwrap();

        let lines: Vec<&[u8]> = out.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_LEN));

        let mut decoded = Vec::new();
        for line in lines {
            match Response::parse(line).unwrap() {
                Response::Data(bytes) => decoded.extend(bytes),
                other => panic!("expected data, got {:?}", other),
            }
        }
        assert_eq!(decoded, data);
    }

    #[test]
    fn parses_response_lines() {
        assert_eq!(Response::parse(b"OK").unwrap(), Response::Ok(None));
        assert_eq!(
            Response::parse(b"OK Pleased to meet you").unwrap(),
            Response::Ok(Some("Pleased to meet you".to_string()))
        );
        assert_eq!(
            Response::parse(b"ERR 83886179 Operation cancelled <Pinentry>").unwrap(),
            Response::Err {
                code: ErrorCode::CANCELED,
                message: "Operation cancelled <Pinentry>".to_string(),
            }
        );
        assert_eq!(
            Response::parse(b"D 12%2534").unwrap(),
            Response::Data(b"12%34".to_vec())
        );
        assert_eq!(
            Response::parse(b"S PASSWORD_FROM_CACHE").unwrap(),
            Response::Status {
                keyword: "PASSWORD_FROM_CACHE".to_string(),
                text: String::new(),
            }
        );
        assert_eq!(Response::parse(b"# debug").unwrap(), Response::Comment);
        assert!(matches!(
            Response::parse(b"HELLO"),
            Err(CodecError::UnexpectedLine)
        ));
    }

    #[test]
    fn err_line_format_matches_pinentry() {
        let mut out = Vec::new();
        write_err(&mut out, ErrorCode::CANCELED, "Operation cancelled").unwrap();
        assert_eq!(out, b"ERR 83886179 Operation cancelled <Pinentry>\n");
    }
}
