//! A pinentry that hands out stored PINs only after the user re-authenticates.
//!
//! gpg-agent asks a pinentry for the PIN of a key. On first use this crate
//! collects the PIN through an external prompt helper and stores it under a
//! label derived from the key's identity. On every later use the stored PIN
//! is released only after an authenticator (Touch ID or similar) allows it.
//!
//! # Core Types
//!
//! - [`AccessOrchestrator`]: the capture/release state machine
//! - [`Secret<T>`]: Wrapper that redacts PIN bytes in logs and zeroizes them
//! - [`ReleaseGate`] and [`ReleaseCap`]: the only way to read a stored entry
//! - [`SecretStore`]: label-addressed storage, [`MemoryStore`] or the macOS keychain
//! - [`GateLog`]: the explicitly constructed diagnostic log
//! - [`assuan`]: the line protocol spoken with gpg-agent and the prompt helper
//!
//! # Examples
//!
//! ```
//! use pinentry_gate::{MemoryStore, ReleaseGate, Secret, SecretLabel, SecretStore};
//! # use pinentry_gate::{AuthError, Authenticator};
//! # struct Yes;
//! # impl Authenticator for Yes {
//! #     fn challenge(&self, _: &str) -> Result<bool, AuthError> { Ok(true) }
//! # }
//!
//! // PINs are redacted whenever they are printed.
//! let pin = Secret::new(b"1234".to_vec());
//! assert_eq!(format!("{:?}", pin), "[REDACTED]");
//!
//! // Reading a stored entry needs a capability only the gate can mint.
//! let store = MemoryStore::new();
//! let label = SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4");
//! store.insert(&label, "CACHE01", b"1234");
//!
//! if let pinentry_gate::AuthDecision::Allowed { cap, .. } = ReleaseGate::new(Yes).challenge(&label) {
//!     let pin = store.read(&label, cap).unwrap();
//!     assert_eq!(pin.expose_secret(), b"1234");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
pub mod assuan;
pub mod audit;
mod auth;
mod capability;
mod config;
mod error;
mod gate;
mod logging;
mod orchestrator;
mod prompt;
mod request;
mod secret;
mod store;

pub use adapter::PinentrySession;
pub use auth::{AuthError, Authenticator, CommandAuthenticator};
pub use capability::ReleaseCap;
pub use config::{Args, Config, ConfigError, PinentryCompat};
pub use error::{EnvironmentError, Error, Violation, ViolationKind};
pub use gate::{AuthDecision, ReleaseGate};
pub use logging::{GateLog, RequestLog, AUDIT_TARGET};
pub use orchestrator::{AccessOrchestrator, Decline, PinResponse};
pub use prompt::{
    PinentryHelper, PromptError, PromptHelper, PromptRequest, DEFAULT_PROMPT, DEFAULT_TITLE,
};
pub use request::{
    CorrelationId, DescriptionParser, Identity, PinRequest, RequestParser, SecretLabel,
};
pub use secret::Secret;
#[cfg(target_os = "macos")]
pub use store::KeychainStore;
pub use store::{MemoryStore, SecretRecord, SecretStore, StoreError};
