//! Wallet provider glue: turns connect/disconnect events into session
//! operations.
//!
//! Wallet libraries report the connected account as a stream of changes.
//! The application forwards them into an mpsc channel and
//! [`run_wallet_events`] drives the coordinator from it:
//!
//!   1. `Connected(address)` → make it active, restore its cached session
//!   2. `Disconnected` → drop the session and its stored token
//!   3. channel closed or task aborted → drop the session from memory only;
//!      the stored token stays for the next run

use std::sync::Arc;

use banana_protocol::WalletAddress;
use banana_session::{KeyValueStore, SessionCoordinator, WalletSigner};
use banana_transport::AuthEndpoint;
use tokio::sync::mpsc;

/// A change in the wallet provider's connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// An account is connected. Switching accounts is another `Connected`.
    Connected(WalletAddress),
    /// No account is connected any more.
    Disconnected,
}

/// Drop guard that releases the active wallet when the event loop exits.
///
/// Runs even if the watcher task is aborted or the runtime shuts down.
/// Storage is untouched: losing the event source is not a disconnect.
struct ReleaseGuard<W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    coordinator: Arc<SessionCoordinator<W, E, S>>,
}

impl<W, E, S> Drop for ReleaseGuard<W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    fn drop(&mut self) {
        self.coordinator.release_active();
    }
}

/// Applies wallet events to `coordinator` until the channel closes.
///
/// Events are handled in order. A `Connected` event finishes its restore
/// (bounded by the request timeout) before the next event is read.
pub async fn run_wallet_events<W, E, S>(
    coordinator: Arc<SessionCoordinator<W, E, S>>,
    mut events: mpsc::Receiver<WalletEvent>,
) where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    let _guard = ReleaseGuard {
        coordinator: Arc::clone(&coordinator),
    };

    while let Some(event) = events.recv().await {
        tracing::debug!(?event, "wallet event");
        match event {
            WalletEvent::Connected(address) => {
                let snapshot = coordinator.connect(address).await;
                tracing::debug!(
                    authenticated = snapshot.authenticated,
                    "wallet session ready"
                );
            }
            WalletEvent::Disconnected => {
                coordinator.disconnect();
            }
        }
    }

    tracing::info!("wallet event channel closed");
    // _guard drops here → active wallet released, storage kept.
}
