//! Wire protocol for Banana's wallet sign-in.
//!
//! This crate defines the values that cross the boundary between the
//! client and the hosted auth functions:
//!
//! - **Identity** ([`WalletAddress`], [`SessionToken`]): who is signing
//!   in and what they get back.
//! - **Messages** ([`VerifyRequest`], [`VerifyResponse`],
//!   [`ValidateResponse`], [`UserRecord`]): JSON bodies of the auth API.
//! - **Challenge** ([`Challenge`]): the text a wallet signs.
//! - **Errors** ([`ProtocolError`]): parse and (de)serialization failures.
//!
//! It knows nothing about HTTP, storage, or sessions.
//!
//! ```text
//! Transport (HTTP) → Protocol (typed bodies) → Session (per-wallet state)
//! ```

mod challenge;
mod error;
mod types;

pub use challenge::{APP_NAME, Challenge};
pub use error::ProtocolError;
pub use types::{
    ApiErrorBody, SessionToken, UserRecord, ValidateResponse, VerifyRequest,
    VerifyResponse, WalletAddress,
};
