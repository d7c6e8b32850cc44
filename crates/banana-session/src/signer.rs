//! Signing hook for proving wallet ownership.
//!
//! Banana doesn't hold keys. Signing happens in the user's wallet (a
//! browser extension, a mobile app over WalletConnect, a hardware device),
//! usually behind an approval prompt the user may ignore for minutes or
//! decline outright.
//!
//! [`WalletSigner`] is the seam: one async method that takes the challenge
//! text and returns a signature or [`SessionError::SignatureRejected`].

use std::future::Future;
use std::sync::Arc;

use banana_protocol::WalletAddress;

use crate::SessionError;

/// Asks a wallet to sign a message.
///
/// # Trait bounds
///
/// - `Send + Sync` → the signer is shared by the coordinator and called
///   from whichever task drives a sign-in.
/// - `'static` → it lives as long as the coordinator.
///
/// # Example
///
/// ```rust
/// use banana_protocol::WalletAddress;
/// use banana_session::{SessionError, WalletSigner};
///
/// /// Returns a fixed signature. Only useful against a test endpoint.
/// struct FixedSigner(String);
///
/// impl WalletSigner for FixedSigner {
///     async fn sign_message(
///         &self,
///         _address: &WalletAddress,
///         message: &str,
///     ) -> Result<String, SessionError> {
///         if message.is_empty() {
///             return Err(SessionError::SignatureRejected("empty".into()));
///         }
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait WalletSigner: Send + Sync + 'static {
    /// Signs `message` with the key behind `address`.
    ///
    /// May stay pending for as long as the user leaves the prompt open.
    /// The coordinator bounds it with
    /// [`SessionConfig::signature_timeout`](crate::SessionConfig).
    ///
    /// # Returns
    /// - `Ok(signature)`: hex signature over `message`
    /// - `Err(SessionError::SignatureRejected)`: user declined
    fn sign_message(
        &self,
        address: &WalletAddress,
        message: &str,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;
}

impl<W: WalletSigner> WalletSigner for Arc<W> {
    fn sign_message(
        &self,
        address: &WalletAddress,
        message: &str,
    ) -> impl Future<Output = Result<String, SessionError>> + Send {
        (**self).sign_message(address, message)
    }
}
