/// A result type using the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `udr` can emit.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A record could not be synthesized.
    ///
    /// Only timestamp arithmetic can fail: a session window that leaves the
    /// range chrono can represent.
    #[error("UDR generation failed: {reason}")]
    Generation { reason: String },

    /// A record could not be turned into its text form.
    #[error("UDR encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Text could not be turned back into a record.
    #[error("UDR decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A kind tag that names none of the known [`crate::UdrKind`]s.
    #[error("unknown UDR kind `{tag}`")]
    UnknownKind { tag: String },
}
