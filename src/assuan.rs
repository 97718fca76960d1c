//! The Assuan line protocol spoken between gpg-agent and pinentry programs.
//!
//! - `codec`: framing, percent-escaping and response parsing
//! - `server`: the pinentry side, answering gpg-agent on stdin/stdout
//! - `client`: the requesting side, used to drive an external pinentry

pub mod client;
pub mod codec;
pub mod server;

pub use client::{ClientError, Connection};
pub use codec::{CodecError, ErrorCode, Response};
pub use server::{CallbackError, Callbacks, ServeError, Server, Settings};
