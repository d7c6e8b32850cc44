//! Error types for the protocol layer.
//!
//! Each crate in Banana defines its own error enum. A `ProtocolError`
//! always means a value failed to parse or (de)serialize. It never means
//! a network or session problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A wallet address did not have the `0x` + hex shape.
    ///
    /// The inner string is the offending input, so logs show what the
    /// wallet provider actually handed us.
    #[error("invalid wallet address: {0:?}")]
    InvalidAddress(String),

    /// Serialization failed (turning a Rust type into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning JSON into a Rust type).
    ///
    /// Common causes: a cached user record written by an older client,
    /// or a response body that isn't the shape the endpoint documents.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
