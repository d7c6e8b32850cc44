//! Error types for the session layer.

use banana_protocol::WalletAddress;
use banana_transport::TransportError;

use crate::{SessionState, StoreError};

/// Errors that can occur while establishing or maintaining a session.
///
/// These never escape [`SessionCoordinator`](crate::SessionCoordinator)'s
/// public operations. The coordinator logs them and turns them into
/// session state. They are public so signers and table users can produce
/// and match them.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The user declined the signature prompt, or the wallet failed to sign.
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// A suspension point outlived its configured timeout.
    #[error("{stage} timed out")]
    TimedOut { stage: &'static str },

    /// The pending operation was cancelled (sign-out, disconnect, or an
    /// explicit cancel).
    #[error("operation cancelled")]
    Cancelled,

    /// The auth endpoint could not be reached or answered with an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Durable storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The endpoint issued a token for a different wallet than the one
    /// that signed. Accepting it would attribute the token to the wrong
    /// address.
    #[error("token issued for {actual}, expected {expected}")]
    AddressMismatch {
        expected: WalletAddress,
        actual: WalletAddress,
    },

    /// A sign-in was requested for a wallet that isn't the connected one.
    #[error("{0} is not the connected wallet")]
    NotActive(WalletAddress),

    /// The wallet already has a validated session.
    #[error("{0} is already authenticated")]
    AlreadyAuthenticated(WalletAddress),

    /// Some sign-in (for any wallet) is already waiting on a signature or
    /// the verify endpoint.
    #[error("a sign-in for {0} is already in progress")]
    SignInInProgress(WalletAddress),

    /// Restore has already run for this wallet in this process.
    #[error("session for {0} was already restored")]
    AlreadyRestored(WalletAddress),

    /// The requested transition isn't allowed from the current state.
    #[error("cannot {action} {address} while {state}")]
    InvalidTransition {
        address: WalletAddress,
        state: SessionState,
        action: &'static str,
    },

    /// No session exists for this wallet.
    #[error("no session for {0}")]
    NotFound(WalletAddress),
}
