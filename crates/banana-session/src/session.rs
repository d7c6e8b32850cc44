//! Session types: the data structures that represent one wallet's sign-in.
//!
//! A "session" is the client's record of a wallet. It tracks:
//! - WHO the wallet is (`WalletAddress`)
//! - WHAT state its sign-in is in (idle, restoring, signing in, ...)
//! - WHICH token and user record the endpoint issued for it

use std::fmt;
use std::time::Duration;

use banana_protocol::{SessionToken, UserRecord, WalletAddress};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Sensible defaults are provided. Override only the fields you care about
/// with struct update syntax.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for the user to approve the signature prompt.
    ///
    /// Default: 120 seconds. `None` waits forever.
    pub signature_timeout: Option<Duration>,

    /// Upper bound on each verify/validate call.
    ///
    /// Default: 30 seconds.
    pub request_timeout: Duration,

    /// Query parameter carrying a referral code in landing URLs.
    ///
    /// Default: `ref` (as in `https://banana.app/?ref=FRIEND`).
    pub referral_query_param: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signature_timeout: Some(Duration::from_secs(120)),
            request_timeout: Duration::from_secs(30),
            referral_query_param: "ref".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The current state of a wallet's session.
///
/// ```text
///   Idle ──(restore)──→ Restoring ──→ Authenticated | Unauthenticated
///    │                                                  │
///    └──────────────(sign_in)────→ SigningIn ←──────────┘
///                                     │
///                                     ▼
///                         Authenticated | Unauthenticated
/// ```
///
/// - **Idle**: the wallet is known but its cached token hasn't been
///   looked at yet.
/// - **Restoring**: a cached token is being validated.
/// - **SigningIn**: waiting on the wallet's signature or the verify call.
/// - **Authenticated**: a validated token is held.
/// - **Unauthenticated**: no usable token. The user must sign in.
///
/// `Restoring` and `SigningIn` are transient. While a session is in one of
/// them no other transition may start, which is what serializes restore
/// against sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Restoring,
    Unauthenticated,
    SigningIn,
    Authenticated,
}

impl SessionState {
    /// Returns `true` while a network call or signature is outstanding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Restoring | Self::SigningIn)
    }

    /// Returns `true` if the session holds a validated token.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` if a sign-in may start from this state.
    pub fn can_sign_in(&self) -> bool {
        matches!(self, Self::Idle | Self::Unauthenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Restoring => write!(f, "Restoring"),
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::SigningIn => write!(f, "SigningIn"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single wallet's session.
///
/// Created when the wallet connects (or signs in without a connect event).
/// Destroyed when the wallet disconnects or another wallet takes over.
#[derive(Debug, Clone)]
pub struct Session {
    /// Which wallet this session belongs to.
    pub address: WalletAddress,

    /// Current lifecycle state.
    pub state: SessionState,

    /// The token the endpoint issued. Only `Some` while `Authenticated`.
    pub token: Option<SessionToken>,

    /// Whether the endpoint created the account at sign-in time.
    pub is_new_user: bool,

    /// The last user record received or loaded from storage.
    pub user: Option<UserRecord>,
}

impl Session {
    /// A fresh `Idle` session for `address`.
    pub fn new(address: WalletAddress) -> Self {
        Self {
            address,
            state: SessionState::Idle,
            token: None,
            is_new_user: false,
            user: None,
        }
    }

    /// Returns `true` iff a token is held and was validated.
    pub fn authenticated(&self) -> bool {
        self.state.is_authenticated() && self.token.is_some()
    }
}

// ---------------------------------------------------------------------------
// AuthSnapshot
// ---------------------------------------------------------------------------

/// What the rest of the application sees: the active wallet's auth status.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// The connected wallet, if any.
    pub address: Option<WalletAddress>,
    /// State of the connected wallet's session (`Idle` when none).
    pub state: SessionState,
    pub authenticated: bool,
    /// `true` while restoring or signing in.
    pub loading: bool,
    pub is_new_user: bool,
    pub user: Option<UserRecord>,
}

impl AuthSnapshot {
    /// The snapshot when no wallet is connected.
    pub fn disconnected() -> Self {
        Self {
            address: None,
            state: SessionState::Idle,
            authenticated: false,
            loading: false,
            is_new_user: false,
            user: None,
        }
    }

    pub(crate) fn of(session: &Session) -> Self {
        Self {
            address: Some(session.address.clone()),
            state: session.state,
            authenticated: session.authenticated(),
            loading: session.state.is_transient(),
            is_new_user: session.is_new_user,
            user: session.user.clone(),
        }
    }
}

/// The result of a [`sign_in`](crate::SessionCoordinator::sign_in) call.
///
/// This reports what happened, not why an attempt failed. Failures are
/// logged by the coordinator and leave the session `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// A token was issued and stored.
    SignedIn {
        is_new_user: bool,
        referral_applied: bool,
    },
    /// The wallet already had a validated session. Nothing was done.
    AlreadyAuthenticated,
    /// Another sign-in or a restore is in flight. This call was dropped.
    Busy,
    /// The attempt failed (declined, timed out, cancelled, endpoint error).
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_is_transient() {
        assert!(SessionState::Restoring.is_transient());
        assert!(SessionState::SigningIn.is_transient());
        assert!(!SessionState::Idle.is_transient());
        assert!(!SessionState::Unauthenticated.is_transient());
        assert!(!SessionState::Authenticated.is_transient());
    }

    #[test]
    fn test_session_state_can_sign_in() {
        assert!(SessionState::Idle.can_sign_in());
        assert!(SessionState::Unauthenticated.can_sign_in());
        assert!(!SessionState::Restoring.can_sign_in());
        assert!(!SessionState::SigningIn.can_sign_in());
        assert!(!SessionState::Authenticated.can_sign_in());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::SigningIn.to_string(), "SigningIn");
        assert_eq!(SessionState::Unauthenticated.to_string(), "Unauthenticated");
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.signature_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.referral_query_param, "ref");
    }

    #[test]
    fn test_authenticated_requires_token() {
        let mut session = Session::new(WalletAddress::parse("0x1").unwrap());
        session.state = SessionState::Authenticated;
        assert!(!session.authenticated(), "no token yet");

        session.token = Some(SessionToken::new("t"));
        assert!(session.authenticated());
        assert!(AuthSnapshot::of(&session).authenticated);
    }
}
