//! The session coordinator: restore, sign-in and sign-out for the
//! connected wallet.
//!
//! The coordinator owns the [`SessionTable`], the durable store and the two
//! collaborators that can suspend (the wallet signer and the auth
//! endpoint). It's shared via `Arc` and every public operation takes
//! `&self`.
//!
//! # Locking
//!
//! The table lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Store reads and writes happen inside that same critical
//! section, so a state transition and the storage write that goes with it
//! are atomic with respect to every other coordinator call.
//!
//! # Errors
//!
//! Nothing here returns an error to the caller. Failures are logged and
//! become state: the session ends up `Unauthenticated`.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use banana_protocol::{Challenge, SessionToken, ValidateResponse, VerifyRequest, WalletAddress};
use banana_transport::{AuthEndpoint, TransportError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::referral::{referral_from_url, resolve_referral};
use crate::store::{self, KeyValueStore, lock};
use crate::{
    AuthSnapshot, Session, SessionConfig, SessionError, SessionState, SessionTable,
    SignInOutcome, WalletSigner,
};

/// Coordinates wallet sessions for one process.
pub struct SessionCoordinator<W, E, S> {
    signer: W,
    endpoint: E,
    store: S,
    config: SessionConfig,
    table: Mutex<SessionTable>,
    /// The page the user is on. Source of the `ref` query parameter.
    page_url: Mutex<Option<Url>>,
    /// Parent of every pending operation's token. Replaced on cancel.
    cancel: Mutex<CancellationToken>,
    updates: watch::Sender<AuthSnapshot>,
}

impl<W, E, S> SessionCoordinator<W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    pub fn new(signer: W, endpoint: E, store: S, config: SessionConfig) -> Self {
        let (updates, _) = watch::channel(AuthSnapshot::disconnected());
        Self {
            signer,
            endpoint,
            store,
            config,
            table: Mutex::new(SessionTable::new()),
            page_url: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            updates,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The durable store backing this coordinator.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The connected wallet's current auth status.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.table().snapshot()
    }

    /// A receiver that sees a fresh [`AuthSnapshot`] after every transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.updates.subscribe()
    }

    /// A copy of `address`'s session, if one exists.
    pub fn session(&self, address: &WalletAddress) -> Option<Session> {
        self.table().get(address).cloned()
    }

    /// Returns `true` while some sign-in holds the process-wide slot.
    pub fn is_sign_in_in_flight(&self) -> bool {
        self.table().sign_in_in_flight().is_some()
    }

    // -----------------------------------------------------------------
    // Wallet connection
    // -----------------------------------------------------------------

    /// Makes `address` the connected wallet and restores its session.
    ///
    /// Switching from another wallet destroys that wallet's session, clears
    /// its durable keys and cancels whatever it had pending, all before the
    /// new wallet's restore starts.
    pub async fn connect(&self, address: WalletAddress) -> AuthSnapshot {
        let switched_from = {
            let mut table = self.table();
            let previous = table.set_active(address.clone());
            if let Some(previous) = &previous {
                table.remove(previous);
                self.clear_stored_session();
            }
            self.publish(&table);
            previous
        };

        if let Some(previous) = switched_from {
            self.cancel_pending();
            tracing::info!(from = %previous, to = %address, "wallet switched");
        } else {
            tracing::debug!(%address, "wallet connected");
        }

        self.restore(&address).await
    }

    /// Forgets the connected wallet: destroys its session, cancels pending
    /// work and clears the durable session keys.
    pub fn disconnect(&self) -> AuthSnapshot {
        self.cancel_pending();

        let mut table = self.table();
        if let Some(address) = table.clear_active() {
            table.remove(&address);
            tracing::info!(%address, "wallet disconnected");
        }
        self.clear_stored_session();
        self.publish(&table);
        table.snapshot()
    }

    /// Drops the connected wallet's session from memory and cancels its
    /// pending work, leaving the durable keys in place.
    ///
    /// For when the event source goes away rather than the wallet, e.g.
    /// the watcher task ending at shutdown. The next process restores the
    /// session from storage.
    pub fn release_active(&self) -> AuthSnapshot {
        self.cancel_pending();

        let mut table = self.table();
        if let Some(address) = table.clear_active() {
            table.remove(&address);
            tracing::info!(%address, "wallet released, stored session kept");
        }
        self.publish(&table);
        table.snapshot()
    }

    // -----------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------

    /// Picks up a cached session for `address`, at most once per process.
    ///
    /// With no cached token this finishes without touching the network.
    /// Otherwise the token is checked with the validate endpoint and either
    /// kept (`Authenticated`) or dropped from storage (`Unauthenticated`).
    pub async fn restore(&self, address: &WalletAddress) -> AuthSnapshot {
        let cancel = self.pending_token();

        let token = {
            let mut table = self.table();
            if let Err(e) = table.begin_restore(address) {
                tracing::debug!(%address, reason = %e, "restore skipped");
                if matches!(e, SessionError::AlreadyRestored(_)) && table.settle(address) {
                    self.publish(&table);
                }
                return table.snapshot();
            }

            match self.cached_token_for(address) {
                Some(token) => {
                    self.publish(&table);
                    token
                }
                None => {
                    if let Err(e) = table.finish_restore(address, None) {
                        tracing::debug!(%address, reason = %e, "restore result discarded");
                    }
                    tracing::info!(%address, "no cached session");
                    self.publish(&table);
                    return table.snapshot();
                }
            }
        };

        let validation = bounded(
            "token validation",
            Some(self.config.request_timeout),
            &cancel,
            async { self.endpoint.validate(&token).await.map_err(SessionError::from) },
        )
        .await;

        let mut table = self.table();
        let (validated, clear_storage) = match validation {
            Ok(ValidateResponse { valid: true }) => {
                let user = store::load_user(&self.store)
                    .filter(|user| user.address == *address);
                (Some((token, user)), false)
            }
            Ok(ValidateResponse { valid: false }) => {
                tracing::info!(%address, "cached token rejected");
                (None, true)
            }
            Err(SessionError::Cancelled) => {
                tracing::debug!(%address, "restore cancelled");
                (None, false)
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "token validation failed");
                (None, true)
            }
        };

        match table.finish_restore(address, validated) {
            Ok(session) => {
                let authenticated = session.authenticated();
                if clear_storage {
                    self.clear_stored_session();
                }
                tracing::info!(%address, authenticated, "session restored");
            }
            Err(e) => {
                tracing::debug!(%address, reason = %e, "restore result discarded");
            }
        }
        self.publish(&table);
        table.snapshot()
    }

    /// The cached token, if it belongs to `address`.
    ///
    /// The owner is `userAddress`, or the cached user record's address when
    /// that key is missing. A token with no known owner, or recorded for
    /// another wallet, is cleared from storage.
    fn cached_token_for(&self, address: &WalletAddress) -> Option<SessionToken> {
        let token = store::load_token(&self.store)?;
        let owner = store::load_address(&self.store)
            .or_else(|| store::load_user(&self.store).map(|user| user.address));
        match owner {
            Some(owner) if owner == *address => Some(token),
            Some(owner) => {
                tracing::info!(%address, %owner, "discarding token cached for another wallet");
                self.clear_stored_session();
                None
            }
            None => {
                tracing::info!(%address, "discarding token with no recorded owner");
                self.clear_stored_session();
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // Sign-in
    // -----------------------------------------------------------------

    /// Proves ownership of `address` and obtains a session token.
    ///
    /// Only one sign-in runs per process. A call made while another is in
    /// flight (or while `address` is restoring) returns
    /// [`SignInOutcome::Busy`] straight away without touching the network.
    /// `referral_code` overrides the page URL and stored code.
    pub async fn sign_in(
        &self,
        address: &WalletAddress,
        referral_code: Option<&str>,
    ) -> SignInOutcome {
        let cancel = self.pending_token();

        {
            let mut table = self.table();
            match table.active().cloned() {
                Some(active) if active != *address => {
                    let e = SessionError::NotActive(address.clone());
                    tracing::warn!(error = %e, "sign-in refused");
                    return SignInOutcome::Failed;
                }
                Some(_) => {}
                None => {
                    table.set_active(address.clone());
                }
            }

            match table.begin_sign_in(address) {
                Ok(()) => self.publish(&table),
                Err(SessionError::AlreadyAuthenticated(_)) => {
                    tracing::debug!(%address, "already authenticated");
                    return SignInOutcome::AlreadyAuthenticated;
                }
                Err(e) => {
                    tracing::debug!(%address, reason = %e, "sign-in dropped");
                    return SignInOutcome::Busy;
                }
            }
        }

        // Releases the slot and demotes the session on every exit path,
        // including this future being dropped.
        let _guard = SignInGuard {
            coordinator: self,
            address: address.clone(),
        };

        match self.run_sign_in(address, referral_code, &cancel).await {
            Ok(outcome) => outcome,
            Err(SessionError::Cancelled) => {
                tracing::info!(%address, "sign-in cancelled");
                SignInOutcome::Failed
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "sign-in failed");
                SignInOutcome::Failed
            }
        }
    }

    async fn run_sign_in(
        &self,
        address: &WalletAddress,
        referral_code: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SignInOutcome, SessionError> {
        let challenge = Challenge::now(address);
        tracing::debug!(%address, nonce = challenge.nonce, "requesting signature");

        let signature = bounded(
            "signature request",
            self.config.signature_timeout,
            cancel,
            self.signer.sign_message(address, &challenge.message),
        )
        .await?;

        let referral_code = {
            let page_url = lock(&self.page_url);
            resolve_referral(
                referral_code,
                page_url.as_ref(),
                &self.config.referral_query_param,
                &self.store,
            )
        };

        let request = VerifyRequest {
            message: challenge.message,
            signature,
            address: address.clone(),
            referral_code,
        };
        let response = bounded(
            "verify request",
            Some(self.config.request_timeout),
            cancel,
            async { self.endpoint.verify(&request).await.map_err(SessionError::from) },
        )
        .await?;

        if response.user.address != *address {
            return Err(SessionError::AddressMismatch {
                expected: address.clone(),
                actual: response.user.address,
            });
        }
        if response.token.is_empty() {
            return Err(TransportError::MalformedResponse("empty token".into()).into());
        }

        let mut table = self.table();
        // A sign-out or disconnect while we were waiting makes this result
        // stale. Check before writing anything.
        table.ensure_state(address, SessionState::SigningIn, "finish signing in")?;

        store::save_session(&self.store, &response.token, &response.user)?;
        if response.referral_applied {
            if let Err(e) = store::clear_referral(&self.store) {
                tracing::warn!(error = %e, "failed to clear used referral code");
            }
        }

        table.finish_sign_in(
            address,
            response.token,
            response.user,
            response.is_new_user,
        )?;
        tracing::info!(
            %address,
            is_new_user = response.is_new_user,
            referral_applied = response.referral_applied,
            "signed in"
        );
        self.publish(&table);

        Ok(SignInOutcome::SignedIn {
            is_new_user: response.is_new_user,
            referral_applied: response.referral_applied,
        })
    }

    // -----------------------------------------------------------------
    // Sign-out and cancellation
    // -----------------------------------------------------------------

    /// Drops the connected wallet's session and the durable session keys.
    ///
    /// Works from any state, makes no network call, and cancels whatever is
    /// pending.
    pub fn sign_out(&self) -> AuthSnapshot {
        self.cancel_pending();

        let mut table = self.table();
        if let Some(address) = table.active().cloned() {
            if table.sign_out(&address).is_ok() {
                tracing::info!(%address, "signed out");
            }
        }
        self.clear_stored_session();
        self.publish(&table);
        table.snapshot()
    }

    /// Cancels the in-flight signature request or network call, if any.
    ///
    /// The interrupted operation ends `Unauthenticated`. Operations started
    /// afterwards are unaffected.
    pub fn cancel_pending(&self) {
        let mut cancel = lock(&self.cancel);
        cancel.cancel();
        *cancel = CancellationToken::new();
    }

    // -----------------------------------------------------------------
    // Referral capture
    // -----------------------------------------------------------------

    /// Records the page the user is on and captures its referral code.
    pub fn set_page_url(&self, url: Url) -> Option<String> {
        let captured = self.capture_referral(&url);
        *lock(&self.page_url) = Some(url);
        captured
    }

    /// Persists the referral code carried by `url`, if any.
    pub fn capture_referral(&self, url: &Url) -> Option<String> {
        let code = referral_from_url(url, &self.config.referral_query_param)?;
        match store::save_referral(&self.store, &code) {
            Ok(()) => tracing::debug!(referral_code = %code, "referral code captured"),
            Err(e) => tracing::warn!(error = %e, "failed to store referral code"),
        }
        Some(code)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        lock(&self.table)
    }

    fn publish(&self, table: &SessionTable) {
        self.updates.send_replace(table.snapshot());
    }

    fn pending_token(&self) -> CancellationToken {
        lock(&self.cancel).child_token()
    }

    fn clear_stored_session(&self) {
        if let Err(e) = store::clear_session(&self.store) {
            tracing::warn!(error = %e, "failed to clear stored session");
        }
    }
}

/// Runs `work` under an optional timeout, giving up early on cancellation.
async fn bounded<T>(
    stage: &'static str,
    limit: Option<Duration>,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    let work = async move {
        match limit {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| SessionError::TimedOut { stage })?,
            None => work.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        result = work => result,
    }
}

/// Holds the process-wide sign-in slot for one attempt.
///
/// Dropping it frees the slot and, if the attempt didn't finish, demotes
/// the session to `Unauthenticated`.
struct SignInGuard<'a, W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    coordinator: &'a SessionCoordinator<W, E, S>,
    address: WalletAddress,
}

impl<W, E, S> Drop for SignInGuard<'_, W, E, S>
where
    W: WalletSigner,
    E: AuthEndpoint,
    S: KeyValueStore,
{
    fn drop(&mut self) {
        let mut table = self.coordinator.table();
        table.release_sign_in(&self.address);
        if table.fail(&self.address) {
            tracing::debug!(address = %self.address, "sign-in ended without a session");
        }
        self.coordinator.publish(&table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_timeout_returns_timed_out() {
        let cancel = CancellationToken::new();

        let result: Result<(), _> = bounded(
            "signature request",
            Some(Duration::from_secs(5)),
            &cancel,
            std::future::pending(),
        )
        .await;

        assert!(matches!(
            result,
            Err(SessionError::TimedOut { stage: "signature request" })
        ));
    }

    #[tokio::test]
    async fn test_bounded_cancelled_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> =
            bounded("verify request", None, &cancel, std::future::pending()).await;

        assert!(matches!(result, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let cancel = CancellationToken::new();

        let result = bounded("verify request", Some(Duration::from_secs(1)), &cancel, async {
            Ok::<_, SessionError>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }
}
