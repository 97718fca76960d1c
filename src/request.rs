//! Request identity extraction.
//!
//! The calling signing tool describes the key it wants unlocked in free
//! text. The only structure the gate relies on is two fragments of that
//! text: a quoted `"Name <email>"` and an `ID <keyId>,` marker.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Violation, ViolationKind};

/// Identity of the key a request is about. Derived once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name of the key owner
    pub name: String,
    /// Email address of the key owner
    pub email: String,
    /// Key identifier, 8 or 16 characters
    pub key_id: String,
}

impl Identity {
    /// Derives the store label for this identity.
    pub fn label(&self) -> SecretLabel {
        SecretLabel::from_parts(&self.name, &self.email, &self.key_id)
    }
}

/// Lookup key into the secret store: `"{name} <{email}> ({keyId})"`.
///
/// Two requests with equal identities always produce equal labels; that is
/// the only notion of "the same secret" the gate has.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLabel(String);

impl SecretLabel {
    /// Builds a label from its three identity parts.
    pub fn from_parts(name: &str, email: &str, key_id: &str) -> Self {
        Self(format!("{} <{}> ({})", name, email, key_id))
    }

    /// Returns the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque per-request token from the caller, of the form `x/cacheId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps the raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns everything after the first `/`.
    ///
    /// # Errors
    ///
    /// Returns a `MalformedCorrelationId` violation if there is no `/` or
    /// nothing follows it.
    pub fn cache_id(&self) -> Result<&str, Violation> {
        match self.0.split_once('/') {
            Some((_, cache_id)) if !cache_id.is_empty() => Ok(cache_id),
            _ => Err(Violation::new(
                ViolationKind::MalformedCorrelationId,
                format!("expected x/cacheId, got {:?}", self.0),
            )),
        }
    }
}

/// One "give me the PIN" request as handed over by the protocol layer.
#[derive(Debug, Clone, Default)]
pub struct PinRequest {
    description: Option<String>,
    correlation_id: Option<CorrelationId>,
}

impl PinRequest {
    /// Creates a request from whatever the protocol session collected.
    pub fn from_parts(description: Option<&str>, correlation_id: Option<&str>) -> Self {
        Self {
            description: description.map(str::to_owned),
            correlation_id: correlation_id.map(CorrelationId::new),
        }
    }

    /// The free-text description, if the caller sent one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The correlation id, if the caller sent one.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }
}

/// Turns a request description into an [`Identity`].
///
/// Implementations must fail rather than guess: a description that does not
/// match means the calling tool changed its output format.
pub trait RequestParser {
    /// Extracts the identity fields from `description`.
    ///
    /// # Errors
    ///
    /// Returns a [`Violation`] if a required fragment is absent or the key
    /// identifier has the wrong length.
    fn parse(&self, description: &str) -> Result<Identity, Violation>;
}

/// Quoted `"Name <email>"`. The name is everything before the first ` <`.
static IDENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?P<quoted>[^"<]*<(?P<email>[^">]*)>)""#)
        .expect("Invalid regex pattern for description identity")
});

/// `ID <keyId>,` on the key line.
static KEY_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ID (?P<key_id>[^,\s]*),").expect("Invalid regex pattern for description key id")
});

/// [`RequestParser`] for the descriptions gpg-agent sends.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptionParser;

impl DescriptionParser {
    /// Creates the parser.
    pub fn new() -> Self {
        Self
    }
}

impl RequestParser for DescriptionParser {
    fn parse(&self, description: &str) -> Result<Identity, Violation> {
        let identity = IDENTITY_PATTERN.captures(description).ok_or_else(|| {
            Violation::new(
                ViolationKind::MissingIdentity,
                "description has no quoted \"Name <email>\"",
            )
        })?;
        let key = KEY_ID_PATTERN.captures(description).ok_or_else(|| {
            Violation::new(ViolationKind::MissingKeyId, "description has no \"ID <keyId>,\"")
        })?;

        let key_id = &key["key_id"];
        let len = key_id.chars().count();
        if len != 8 && len != 16 {
            return Err(Violation::new(
                ViolationKind::InvalidKeyIdLength { len },
                format!("key id {:?} must be 8 or 16 characters", key_id),
            ));
        }

        let quoted = &identity["quoted"];
        let name = quoted.split_once(" <").map_or(quoted, |(name, _)| name);

        Ok(Identity {
            name: name.to_string(),
            email: identity["email"].to_string(),
            key_id: key_id.to_string(),
        })
    }
}
