/// Capability granting permission to read one stored PIN.
///
/// A `ReleaseCap` is proof that the authenticator allowed a release during
/// the current request. [`SecretStore::read`](crate::SecretStore::read)
/// consumes one, so a payload can never be read without a fresh "allowed".
///
/// It cannot be constructed outside this crate, and it is neither `Clone`
/// nor `Copy`: each grant is good for exactly one read.
///
/// # Examples
///
/// ```compile_fail
/// # use pinentry_gate::ReleaseCap;
/// // This does not compile - ReleaseCap cannot be constructed publicly:
/// let cap = ReleaseCap { _private: () }; // Error: _private is private
/// ```
#[derive(Debug)]
pub struct ReleaseCap {
    // BREAKING CHANGE WARNING: This field MUST remain private.
    // A public field lets callers forge a grant and skip the biometric check.
    _private: (),
}

impl ReleaseCap {
    /// Creates a new ReleaseCap.
    ///
    /// This is `pub(crate)` so only [`ReleaseGate`](crate::ReleaseGate) can
    /// mint one after an allowed challenge.
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}
