//! `BananaClient` builder and handle.
//!
//! This is the entry point for applications. It ties together all the
//! layers: configuration → HTTP endpoint → durable store → coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use banana_protocol::WalletAddress;
use banana_session::{
    AuthSnapshot, FileStore, KeyValueStore, MemoryStore, SessionConfig, SessionCoordinator,
    SignInOutcome, StoreError, WalletSigner,
};
use banana_transport::{AuthEndpoint, HttpAuthEndpoint};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::wallet::{WalletEvent, run_wallet_events};
use crate::{BananaError, ClientConfig};

/// The store picked by configuration: a file when a path is set, memory
/// otherwise.
#[derive(Debug)]
pub enum ClientStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl KeyValueStore for ClientStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key),
            Self::File(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.set(key, value),
            Self::File(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.remove(key),
            Self::File(store) => store.remove(key),
        }
    }
}

/// A client over the hosted HTTP endpoint, as built by
/// [`BananaClientBuilder::build`].
pub type HttpBananaClient<W> = BananaClient<W, HttpAuthEndpoint, ClientStore>;

/// Builder for configuring a [`BananaClient`].
///
/// # Example
///
/// ```rust,ignore
/// use banana::prelude::*;
///
/// let client = BananaClientBuilder::new()
///     .api_url("https://api.banana.app/functions/v1")
///     .anon_key("public-anon-key")
///     .store_path("/var/lib/banana/session.json")
///     .build(my_signer)?;
/// client.connect(address).await;
/// client.sign_in(None).await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct BananaClientBuilder {
    config: ClientConfig,
}

impl BananaClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, e.g. with
    /// [`ClientConfig::from_env`].
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the base URL of the auth functions.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Sets the public API key sent with every request.
    pub fn anon_key(mut self, key: impl Into<String>) -> Self {
        self.config.anon_key = Some(key.into());
        self
    }

    /// Persists the session to a JSON file at `path`.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    /// Keeps the session in memory only.
    pub fn in_memory(mut self) -> Self {
        self.config.store_path = None;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Builds a client over the HTTP endpoint and the configured store.
    ///
    /// # Errors
    /// - [`BananaError::Transport`]: the API URL is unusable
    /// - [`BananaError::Store`]: the store file exists but can't be read
    pub fn build<W: WalletSigner>(self, signer: W) -> Result<HttpBananaClient<W>, BananaError> {
        let mut endpoint = HttpAuthEndpoint::new(&self.config.api_url)?
            .with_timeout(self.config.session.request_timeout)?;
        if let Some(key) = &self.config.anon_key {
            endpoint = endpoint.with_anon_key(key.clone());
        }

        let store = match &self.config.store_path {
            Some(path) => ClientStore::File(FileStore::open(path)?),
            None => ClientStore::Memory(MemoryStore::new()),
        };

        tracing::info!(
            api_url = %endpoint.base_url(),
            persistent = self.config.store_path.is_some(),
            "banana client ready"
        );
        Ok(self.build_with(signer, endpoint, store))
    }

    /// Builds a client over caller-supplied collaborators.
    ///
    /// Only the session part of the configuration applies.
    pub fn build_with<W, E, S>(self, signer: W, endpoint: E, store: S) -> BananaClient<W, E, S>
    where
        W: WalletSigner,
        E: AuthEndpoint,
        S: KeyValueStore,
    {
        BananaClient {
            coordinator: Arc::new(SessionCoordinator::new(
                signer,
                endpoint,
                store,
                self.config.session,
            )),
        }
    }
}

/// A handle to the wallet session. Cheap to clone; clones share state.
pub struct BananaClient<W, E, S> {
    coordinator: Arc<SessionCoordinator<W, E, S>>,
}

impl<W, E, S> Clone for BananaClient<W, E, S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<W, E, S> BananaClient<W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    /// The coordinator behind this client.
    pub fn coordinator(&self) -> &Arc<SessionCoordinator<W, E, S>> {
        &self.coordinator
    }

    /// Makes `address` the connected wallet and restores its session.
    pub async fn connect(&self, address: WalletAddress) -> AuthSnapshot {
        self.coordinator.connect(address).await
    }

    /// Forgets the connected wallet.
    pub fn disconnect(&self) -> AuthSnapshot {
        self.coordinator.disconnect()
    }

    /// Signs in the connected wallet.
    ///
    /// Returns [`SignInOutcome::Failed`] when no wallet is connected.
    pub async fn sign_in(&self, referral_code: Option<&str>) -> SignInOutcome {
        let Some(address) = self.coordinator.snapshot().address else {
            tracing::warn!("sign-in requested with no wallet connected");
            return SignInOutcome::Failed;
        };
        self.coordinator.sign_in(&address, referral_code).await
    }

    pub fn sign_out(&self) -> AuthSnapshot {
        self.coordinator.sign_out()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.coordinator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.coordinator.subscribe()
    }

    /// Records the current page and captures its referral code.
    pub fn set_page_url(&self, url: Url) -> Option<String> {
        self.coordinator.set_page_url(url)
    }

    /// Cancels a pending signature request or network call.
    pub fn cancel_pending(&self) {
        self.coordinator.cancel_pending();
    }

    /// Spawns a task applying wallet events from `events`.
    ///
    /// The task ends when every sender is dropped. The session then leaves
    /// memory but stays in the store, as it does when the runtime shuts
    /// down; only [`WalletEvent::Disconnected`] clears stored keys.
    pub fn spawn_wallet_watcher(&self, events: mpsc::Receiver<WalletEvent>) -> JoinHandle<()> {
        tokio::spawn(run_wallet_events(Arc::clone(&self.coordinator), events))
    }
}
