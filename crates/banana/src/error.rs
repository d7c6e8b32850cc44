//! Unified error type for the Banana client.

use banana_protocol::ProtocolError;
use banana_session::{SessionError, StoreError};
use banana_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `banana` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant auto-generates `From` impls, so the `?` operator converts
/// sub-crate errors automatically.
///
/// Sign-in and restore never return errors (they report outcomes). This
/// type shows up when building a client or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum BananaError {
    /// An endpoint error (bad URL, unreachable host, error status).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (invalid address, encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (signature, timeout, state).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The durable store couldn't be opened or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}
