//! Wallet session management for Banana.
//!
//! This crate handles the lifecycle of a wallet's sign-in:
//!
//! 1. **Signing**: proving the user controls a wallet ([`WalletSigner`] trait)
//! 2. **Session tracking**: per-wallet state and the one-at-a-time sign-in
//!    slot ([`SessionTable`])
//! 3. **Coordination**: restore, sign-in and sign-out against the auth
//!    endpoint ([`SessionCoordinator`])
//! 4. **Persistence**: the token, user record and referral code that
//!    outlive the process ([`store`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client Layer (above)  ← wires wallet events, config and HTTP together
//!     ↕
//! Session Layer (this crate)  ← owns wallet auth state
//!     ↕
//! Transport Layer (below)  ← talks to the verify/validate endpoints
//! ```

#![allow(async_fn_in_trait)]

mod coordinator;
mod error;
mod manager;
mod referral;
mod session;
mod signer;
pub mod store;

pub use coordinator::SessionCoordinator;
pub use error::SessionError;
pub use manager::SessionTable;
pub use referral::{referral_from_url, resolve_referral};
pub use session::{AuthSnapshot, Session, SessionConfig, SessionState, SignInOutcome};
pub use signer::WalletSigner;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, keys};
