//! Auth endpoint abstraction for Banana.
//!
//! Provides the [`AuthEndpoint`] trait: the two remote calls the session
//! layer needs (exchange a signed challenge for a token, check a token is
//! still good). The session layer only sees the trait, so tests can swap in
//! a scripted endpoint.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpAuthEndpoint`], backed by `reqwest`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::TransportError;
#[cfg(feature = "http")]
pub use http::HttpAuthEndpoint;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use banana_protocol::{
    SessionToken, ValidateResponse, VerifyRequest, VerifyResponse,
};

/// Identifier attached to each outgoing request, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a new `RequestId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The remote authentication service.
///
/// Implementations must be shareable across tasks: the coordinator holds
/// one endpoint and calls it from whichever task drives a sign-in.
pub trait AuthEndpoint: Send + Sync + 'static {
    /// Exchanges a signed challenge for a session token.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, TransportError>> + Send;

    /// Asks whether `token` is still accepted.
    ///
    /// An expired token is `Ok(ValidateResponse { valid: false })`, not an
    /// error. Errors mean the question couldn't be answered.
    fn validate(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<ValidateResponse, TransportError>> + Send;
}

impl<E: AuthEndpoint> AuthEndpoint for Arc<E> {
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, TransportError>> + Send
    {
        (**self).verify(request)
    }

    fn validate(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<ValidateResponse, TransportError>> + Send
    {
        (**self).validate(token)
    }
}
