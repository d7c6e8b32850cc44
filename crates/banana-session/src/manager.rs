//! The session table: per-wallet state and the process-wide sign-in slot.
//!
//! This is the bookkeeping half of the session layer. It's responsible for:
//! - Creating sessions when wallets show up
//! - Enforcing which transitions are allowed from which state
//! - Guaranteeing at most one sign-in is in flight for the whole process
//! - Remembering which wallets have already been restored
//!
//! # Concurrency note
//!
//! `SessionTable` is NOT thread-safe by itself. It's a plain struct owned
//! by the [`SessionCoordinator`](crate::SessionCoordinator) behind a mutex
//! that is never held across an `.await`. Every method here is synchronous
//! and cheap.

use std::collections::{HashMap, HashSet};

use banana_protocol::{SessionToken, UserRecord, WalletAddress};

use crate::{AuthSnapshot, Session, SessionError, SessionState};

/// Tracks every wallet session the process knows about.
///
/// ## Lifecycle
///
/// ```text
/// begin_restore() ──→ finish_restore() ──→ [Authenticated | Unauthenticated]
///                                                 │
/// begin_sign_in() ──→ finish_sign_in() ──→ [Authenticated]
///        │
///        └──(error, cancel, drop)──→ fail() + release_sign_in() ──→ [Unauthenticated]
///
/// sign_out() ──→ [Unauthenticated]        remove() ──→ (gone)
/// ```
#[derive(Debug, Default)]
pub struct SessionTable {
    /// Sessions keyed by wallet address.
    sessions: HashMap<WalletAddress, Session>,

    /// Wallets whose cached token has already been looked at.
    ///
    /// Survives `remove()` so a restore runs at most once per wallet per
    /// process, even across reconnects.
    restored: HashSet<WalletAddress>,

    /// The currently connected wallet.
    active: Option<WalletAddress>,

    /// The wallet whose sign-in is in flight, if any. One slot for the
    /// whole process: a second sign-in is refused, not queued.
    signing_in: Option<WalletAddress>,
}

impl SessionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently connected wallet.
    pub fn active(&self) -> Option<&WalletAddress> {
        self.active.as_ref()
    }

    /// Makes `address` the connected wallet.
    ///
    /// Returns the previously active wallet if it was a different one, so
    /// the caller can tear its session down.
    pub fn set_active(&mut self, address: WalletAddress) -> Option<WalletAddress> {
        self.sessions
            .entry(address.clone())
            .or_insert_with(|| Session::new(address.clone()));

        match self.active.replace(address) {
            Some(previous) if Some(&previous) != self.active.as_ref() => {
                Some(previous)
            }
            _ => None,
        }
    }

    /// Forgets the connected wallet and returns it.
    pub fn clear_active(&mut self) -> Option<WalletAddress> {
        self.active.take()
    }

    /// Starts restoring a cached session: `Idle` → `Restoring`.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyRestored`]: restore already ran for this
    ///   wallet in this process
    /// - [`SessionError::InvalidTransition`]: the session isn't `Idle`
    pub fn begin_restore(
        &mut self,
        address: &WalletAddress,
    ) -> Result<(), SessionError> {
        if self.restored.contains(address) {
            return Err(SessionError::AlreadyRestored(address.clone()));
        }

        let session = self
            .sessions
            .entry(address.clone())
            .or_insert_with(|| Session::new(address.clone()));

        if session.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                address: address.clone(),
                state: session.state,
                action: "restore",
            });
        }

        session.state = SessionState::Restoring;
        self.restored.insert(address.clone());
        tracing::debug!(%address, "restoring session");
        Ok(())
    }

    /// Settles a session that has nothing left to restore: `Idle` →
    /// `Unauthenticated`.
    ///
    /// Returns `true` if the session changed.
    pub fn settle(&mut self, address: &WalletAddress) -> bool {
        match self.sessions.get_mut(address) {
            Some(session) if session.state == SessionState::Idle => {
                session.state = SessionState::Unauthenticated;
                true
            }
            _ => false,
        }
    }

    /// Completes a restore: `Restoring` → `Authenticated` when `validated`
    /// carries a token, `Unauthenticated` otherwise.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the session was removed meanwhile
    /// - [`SessionError::InvalidTransition`]: the session left `Restoring`
    ///   meanwhile (signed out); the result is stale
    pub fn finish_restore(
        &mut self,
        address: &WalletAddress,
        validated: Option<(SessionToken, Option<UserRecord>)>,
    ) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get_mut(address)
            .ok_or_else(|| SessionError::NotFound(address.clone()))?;

        if session.state != SessionState::Restoring {
            return Err(SessionError::InvalidTransition {
                address: address.clone(),
                state: session.state,
                action: "finish restoring",
            });
        }

        match validated {
            Some((token, user)) => {
                session.state = SessionState::Authenticated;
                session.token = Some(token);
                session.user = user;
            }
            None => {
                session.state = SessionState::Unauthenticated;
                session.token = None;
                session.user = None;
            }
        }
        Ok(session)
    }

    /// Claims the process-wide sign-in slot for `address`:
    /// `Idle | Unauthenticated` → `SigningIn`.
    ///
    /// Also marks the wallet restored, so a late restore can't overwrite
    /// the fresh session.
    ///
    /// # Errors
    /// - [`SessionError::SignInInProgress`]: the slot is taken (by any
    ///   wallet)
    /// - [`SessionError::AlreadyAuthenticated`]: nothing to do
    /// - [`SessionError::InvalidTransition`]: a restore is in flight
    pub fn begin_sign_in(
        &mut self,
        address: &WalletAddress,
    ) -> Result<(), SessionError> {
        if let Some(busy) = &self.signing_in {
            return Err(SessionError::SignInInProgress(busy.clone()));
        }

        let session = self
            .sessions
            .entry(address.clone())
            .or_insert_with(|| Session::new(address.clone()));

        match session.state {
            SessionState::Authenticated => {
                return Err(SessionError::AlreadyAuthenticated(address.clone()));
            }
            state if !state.can_sign_in() => {
                return Err(SessionError::InvalidTransition {
                    address: address.clone(),
                    state,
                    action: "sign in",
                });
            }
            _ => {}
        }

        session.state = SessionState::SigningIn;
        self.restored.insert(address.clone());
        self.signing_in = Some(address.clone());
        tracing::debug!(%address, "sign-in started");
        Ok(())
    }

    /// Completes a sign-in: `SigningIn` → `Authenticated`.
    ///
    /// Does not release the sign-in slot; that is [`release_sign_in`]'s job
    /// so it happens on every exit path.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the session was removed meanwhile
    /// - [`SessionError::InvalidTransition`]: the session left `SigningIn`
    ///   meanwhile (signed out); the result is stale
    ///
    /// [`release_sign_in`]: Self::release_sign_in
    pub fn finish_sign_in(
        &mut self,
        address: &WalletAddress,
        token: SessionToken,
        user: UserRecord,
        is_new_user: bool,
    ) -> Result<&Session, SessionError> {
        self.ensure_state(address, SessionState::SigningIn, "finish signing in")?;

        let session = self
            .sessions
            .get_mut(address)
            .ok_or_else(|| SessionError::NotFound(address.clone()))?;
        session.state = SessionState::Authenticated;
        session.token = Some(token);
        session.user = Some(user);
        session.is_new_user = is_new_user;
        Ok(session)
    }

    /// Checks that `address` is currently in `expected`.
    pub fn ensure_state(
        &self,
        address: &WalletAddress,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get(address)
            .ok_or_else(|| SessionError::NotFound(address.clone()))?;
        if session.state != expected {
            return Err(SessionError::InvalidTransition {
                address: address.clone(),
                state: session.state,
                action,
            });
        }
        Ok(())
    }

    /// Demotes a session stuck in a transient state to `Unauthenticated`.
    ///
    /// Returns `true` if the session changed.
    pub fn fail(&mut self, address: &WalletAddress) -> bool {
        match self.sessions.get_mut(address) {
            Some(session) if session.state.is_transient() => {
                session.state = SessionState::Unauthenticated;
                session.token = None;
                true
            }
            _ => false,
        }
    }

    /// Frees the sign-in slot if `address` holds it.
    ///
    /// Returns `true` if the slot was released.
    pub fn release_sign_in(&mut self, address: &WalletAddress) -> bool {
        if self.signing_in.as_ref() == Some(address) {
            self.signing_in = None;
            true
        } else {
            false
        }
    }

    /// Drops the session's token: any state → `Unauthenticated`.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn sign_out(&mut self, address: &WalletAddress) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(address)
            .ok_or_else(|| SessionError::NotFound(address.clone()))?;

        session.state = SessionState::Unauthenticated;
        session.token = None;
        session.user = None;
        session.is_new_user = false;
        Ok(())
    }

    /// Destroys a session. Clears the active wallet if it was this one.
    pub fn remove(&mut self, address: &WalletAddress) -> Option<Session> {
        if self.active.as_ref() == Some(address) {
            self.active = None;
        }
        self.sessions.remove(address)
    }

    /// Looks up a session by wallet address.
    pub fn get(&self, address: &WalletAddress) -> Option<&Session> {
        self.sessions.get(address)
    }

    /// The wallet holding the sign-in slot, if any.
    pub fn sign_in_in_flight(&self) -> Option<&WalletAddress> {
        self.signing_in.as_ref()
    }

    /// The active wallet's auth status.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.active
            .as_ref()
            .and_then(|address| self.sessions.get(address))
            .map(AuthSnapshot::of)
            .unwrap_or_else(AuthSnapshot::disconnected)
    }

    /// Returns the number of sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionTable`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn addr(n: u8) -> WalletAddress {
        WalletAddress::parse(&format!("0x{n:02x}")).unwrap()
    }

    fn token(raw: &str) -> SessionToken {
        SessionToken::new(raw)
    }

    fn signed_in(table: &mut SessionTable, a: &WalletAddress) {
        table.begin_sign_in(a).unwrap();
        table
            .finish_sign_in(a, token("t"), UserRecord::new(a.clone()), false)
            .unwrap();
        table.release_sign_in(a);
    }

    // =====================================================================
    // set_active() / clear_active()
    // =====================================================================

    #[test]
    fn test_set_active_first_wallet_returns_none() {
        let mut table = SessionTable::new();

        assert_eq!(table.set_active(addr(1)), None);
        assert_eq!(table.active(), Some(&addr(1)));
        assert_eq!(table.get(&addr(1)).unwrap().state, SessionState::Idle);
    }

    #[test]
    fn test_set_active_same_wallet_returns_none() {
        let mut table = SessionTable::new();
        table.set_active(addr(1));

        assert_eq!(table.set_active(addr(1)), None);
    }

    #[test]
    fn test_set_active_switch_returns_previous() {
        let mut table = SessionTable::new();
        table.set_active(addr(1));

        assert_eq!(table.set_active(addr(2)), Some(addr(1)));
        assert_eq!(table.active(), Some(&addr(2)));
    }

    #[test]
    fn test_clear_active_returns_wallet() {
        let mut table = SessionTable::new();
        table.set_active(addr(1));

        assert_eq!(table.clear_active(), Some(addr(1)));
        assert_eq!(table.active(), None);
        assert_eq!(table.snapshot(), AuthSnapshot::disconnected());
    }

    // =====================================================================
    // begin_restore() / finish_restore()
    // =====================================================================

    #[test]
    fn test_begin_restore_idle_becomes_restoring() {
        let mut table = SessionTable::new();

        table.begin_restore(&addr(1)).expect("should start");

        assert_eq!(table.get(&addr(1)).unwrap().state, SessionState::Restoring);
    }

    #[test]
    fn test_begin_restore_twice_returns_already_restored() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();
        table.finish_restore(&addr(1), None).unwrap();

        let result = table.begin_restore(&addr(1));

        assert!(matches!(result, Err(SessionError::AlreadyRestored(a)) if a == addr(1)));
    }

    #[test]
    fn test_begin_restore_survives_remove() {
        // Restore runs once per wallet per process, reconnects included.
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();
        table.remove(&addr(1));

        assert!(matches!(
            table.begin_restore(&addr(1)),
            Err(SessionError::AlreadyRestored(_))
        ));
    }

    #[test]
    fn test_settle_reconnected_idle_becomes_unauthenticated() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();
        table.finish_restore(&addr(1), None).unwrap();
        table.remove(&addr(1));
        table.set_active(addr(1));
        assert_eq!(table.get(&addr(1)).unwrap().state, SessionState::Idle);

        assert!(table.settle(&addr(1)));

        assert_eq!(
            table.get(&addr(1)).unwrap().state,
            SessionState::Unauthenticated
        );
        assert!(!table.settle(&addr(1)), "only Idle settles");
    }

    #[test]
    fn test_settle_leaves_authenticated_alone() {
        let mut table = SessionTable::new();
        signed_in(&mut table, &addr(1));

        assert!(!table.settle(&addr(1)));
        assert!(!table.settle(&addr(2)), "unknown wallet");
        assert!(table.get(&addr(1)).unwrap().state.is_authenticated());
    }

    #[test]
    fn test_finish_restore_with_token_authenticates() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();

        let session = table
            .finish_restore(&addr(1), Some((token("t_old"), None)))
            .unwrap();

        assert!(session.authenticated());
        assert_eq!(session.token, Some(token("t_old")));
    }

    #[test]
    fn test_finish_restore_without_token_unauthenticated() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();

        let session = table.finish_restore(&addr(1), None).unwrap();

        assert_eq!(session.state, SessionState::Unauthenticated);
        assert!(!session.authenticated());
    }

    #[test]
    fn test_finish_restore_after_sign_out_is_stale() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();
        table.sign_out(&addr(1)).unwrap();

        let result = table.finish_restore(&addr(1), Some((token("t"), None)));

        assert!(matches!(result, Err(SessionError::InvalidTransition { .. })));
        assert!(!table.get(&addr(1)).unwrap().authenticated());
    }

    #[test]
    fn test_finish_restore_after_remove_not_found() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();
        table.remove(&addr(1));

        let result = table.finish_restore(&addr(1), None);

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    // =====================================================================
    // begin_sign_in() / finish_sign_in() / release_sign_in()
    // =====================================================================

    #[test]
    fn test_begin_sign_in_takes_process_wide_slot() {
        let mut table = SessionTable::new();

        table.begin_sign_in(&addr(1)).expect("should start");

        assert_eq!(table.sign_in_in_flight(), Some(&addr(1)));
        assert_eq!(table.get(&addr(1)).unwrap().state, SessionState::SigningIn);
    }

    #[test]
    fn test_begin_sign_in_second_call_returns_in_progress() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();

        assert!(matches!(
            table.begin_sign_in(&addr(1)),
            Err(SessionError::SignInInProgress(a)) if a == addr(1)
        ));
        // The slot is process-wide, so another wallet is refused too.
        assert!(matches!(
            table.begin_sign_in(&addr(2)),
            Err(SessionError::SignInInProgress(a)) if a == addr(1)
        ));
    }

    #[test]
    fn test_begin_sign_in_while_restoring_is_invalid() {
        let mut table = SessionTable::new();
        table.begin_restore(&addr(1)).unwrap();

        let result = table.begin_sign_in(&addr(1));

        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition { state: SessionState::Restoring, .. })
        ));
        assert_eq!(table.sign_in_in_flight(), None, "slot not taken");
    }

    #[test]
    fn test_begin_sign_in_authenticated_returns_already_authenticated() {
        let mut table = SessionTable::new();
        signed_in(&mut table, &addr(1));

        assert!(matches!(
            table.begin_sign_in(&addr(1)),
            Err(SessionError::AlreadyAuthenticated(_))
        ));
    }

    #[test]
    fn test_begin_sign_in_blocks_later_restore() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();

        assert!(matches!(
            table.begin_restore(&addr(1)),
            Err(SessionError::AlreadyRestored(_))
        ));
    }

    #[test]
    fn test_finish_sign_in_records_token_and_flag() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();

        let session = table
            .finish_sign_in(&addr(1), token("t1"), UserRecord::new(addr(1)), true)
            .unwrap();

        assert!(session.authenticated());
        assert!(session.is_new_user);
        assert_eq!(session.user.as_ref().unwrap().address, addr(1));
    }

    #[test]
    fn test_finish_sign_in_after_sign_out_is_stale() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();
        table.sign_out(&addr(1)).unwrap();

        let result =
            table.finish_sign_in(&addr(1), token("t1"), UserRecord::new(addr(1)), false);

        assert!(matches!(result, Err(SessionError::InvalidTransition { .. })));
    }

    #[test]
    fn test_release_sign_in_only_by_holder() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();

        assert!(!table.release_sign_in(&addr(2)));
        assert!(table.release_sign_in(&addr(1)));
        assert_eq!(table.sign_in_in_flight(), None);
        assert!(!table.release_sign_in(&addr(1)), "already released");
    }

    // =====================================================================
    // fail() / sign_out() / remove()
    // =====================================================================

    #[test]
    fn test_fail_demotes_transient_only() {
        let mut table = SessionTable::new();
        table.begin_sign_in(&addr(1)).unwrap();
        assert!(table.fail(&addr(1)));
        table.release_sign_in(&addr(1));
        assert_eq!(
            table.get(&addr(1)).unwrap().state,
            SessionState::Unauthenticated
        );

        signed_in(&mut table, &addr(2));
        assert!(!table.fail(&addr(2)), "authenticated sessions are untouched");
        assert!(!table.fail(&addr(9)), "unknown wallet");
    }

    #[test]
    fn test_sign_out_clears_token() {
        let mut table = SessionTable::new();
        signed_in(&mut table, &addr(1));

        table.sign_out(&addr(1)).unwrap();

        let session = table.get(&addr(1)).unwrap();
        assert_eq!(session.state, SessionState::Unauthenticated);
        assert_eq!(session.token, None);
        assert!(session.user.is_none());
    }

    #[test]
    fn test_sign_out_unknown_wallet_returns_not_found() {
        let mut table = SessionTable::new();

        assert!(matches!(
            table.sign_out(&addr(9)),
            Err(SessionError::NotFound(a)) if a == addr(9)
        ));
    }

    #[test]
    fn test_remove_active_clears_active() {
        let mut table = SessionTable::new();
        table.set_active(addr(1));

        assert!(table.remove(&addr(1)).is_some());
        assert_eq!(table.active(), None);
        assert!(table.is_empty());
    }

    // =====================================================================
    // snapshot()
    // =====================================================================

    #[test]
    fn test_snapshot_reflects_active_session() {
        let mut table = SessionTable::new();
        table.set_active(addr(1));
        table.begin_sign_in(&addr(1)).unwrap();

        let snap = table.snapshot();
        assert_eq!(snap.address, Some(addr(1)));
        assert!(snap.loading);
        assert!(!snap.authenticated);

        table
            .finish_sign_in(&addr(1), token("t"), UserRecord::new(addr(1)), true)
            .unwrap();
        let snap = table.snapshot();
        assert!(snap.authenticated);
        assert!(!snap.loading);
        assert!(snap.is_new_user);
    }

    #[test]
    fn test_len_tracks_session_count() {
        let mut table = SessionTable::new();
        assert_eq!(table.len(), 0);

        table.set_active(addr(1));
        table.begin_sign_in(&addr(2)).unwrap();
        assert_eq!(table.len(), 2);
    }
}
