use std::fmt;

use zeroize::Zeroize;

/// A wrapper that keeps PIN material out of logs and error messages.
///
/// `Secret<T>` holds the bytes a user typed into the prompt helper or the
/// payload read back from the secret store. The wrapped value can only be
/// reached through [`expose_secret`](Self::expose_secret), and it is wiped
/// from memory when the wrapper is dropped.
///
/// # Security Properties
///
/// - Does NOT implement `Deref`, `AsRef`, `Borrow`, `Clone`, or `Copy`
/// - Debug and Display output is always `[REDACTED]`
/// - No type information is leaked in formatted output
/// - The inner value is zeroized on drop
///
/// # Examples
///
/// ```
/// use pinentry_gate::Secret;
///
/// let pin = Secret::new(b"1234".to_vec());
///
/// assert_eq!(format!("{:?}", pin), "[REDACTED]");
/// assert_eq!(format!("{}", pin), "[REDACTED]");
/// assert_eq!(pin.expose_secret(), b"1234");
/// ```
// BREAKING CHANGE WARNING: Do NOT add Clone, Copy, or Default derives.
// A cloned PIN outlives the zeroizing drop of the original.
pub struct Secret<T: Zeroize> {
    // BREAKING CHANGE WARNING: This field MUST remain private (CWE-532).
    inner: T,
}

impl<T: Zeroize> Secret<T> {
    /// Wraps a sensitive value in a `Secret`.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Explicitly exposes the secret value.
    ///
    /// # Security Warning
    ///
    /// The exposed reference must not reach a logger, an error message, or
    /// any output other than the protocol data line it is meant for.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl Secret<Vec<u8>> {
    /// Returns true if no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of bytes held. Safe to log.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    /// BREAKING CHANGE WARNING: This MUST unconditionally return "[REDACTED]".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    /// BREAKING CHANGE WARNING: This MUST unconditionally return "[REDACTED]".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
