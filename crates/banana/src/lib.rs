//! # Banana
//!
//! Wallet sign-in and session persistence for the Banana client.
//!
//! Banana proves a user controls a wallet by having it sign a challenge,
//! exchanges the signature for a session token, and keeps that token
//! across restarts. The application supplies a [`WalletSigner`] and wallet
//! connect/disconnect events; the client handles restore, sign-in,
//! sign-out and storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use banana::prelude::*;
//!
//! // Implement WalletSigner for your wallet, then:
//! // banana::init_tracing();
//! // let client = BananaClientBuilder::new()
//! //     .config(ClientConfig::from_env()?)
//! //     .build(my_signer)?;
//! // client.connect(address).await;
//! // if !client.snapshot().authenticated {
//! //     client.sign_in(None).await;
//! // }
//! ```

mod client;
mod config;
mod error;
mod logging;
mod wallet;

pub use client::{BananaClient, BananaClientBuilder, ClientStore, HttpBananaClient};
pub use config::{ClientConfig, DEFAULT_API_URL};
pub use error::BananaError;
pub use logging::{DEFAULT_LOG_FILTER, init_tracing, init_tracing_with};
pub use wallet::{WalletEvent, run_wallet_events};

pub use banana_session::WalletSigner;

/// Everything an application usually needs, in one import.
pub mod prelude {
    pub use crate::{
        BananaClient, BananaClientBuilder, BananaError, ClientConfig, ClientStore,
        HttpBananaClient, WalletEvent, init_tracing, init_tracing_with,
    };
    pub use banana_protocol::{Challenge, SessionToken, UserRecord, WalletAddress};
    pub use banana_session::{
        AuthSnapshot, FileStore, KeyValueStore, MemoryStore, SessionConfig, SessionCoordinator,
        SessionError, SessionState, SignInOutcome, StoreError, WalletSigner, keys,
    };
    pub use banana_transport::{AuthEndpoint, HttpAuthEndpoint, TransportError};
}
