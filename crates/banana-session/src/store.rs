//! Durable key-value storage for session state.
//!
//! The session layer caches the token and user record between runs so a
//! returning user doesn't have to sign again. Storage is a flat map of
//! string keys to string values, the same shape as browser local storage,
//! which keeps the stored keys compatible with the web client.
//!
//! Two stores are provided: [`MemoryStore`] for tests and ephemeral
//! clients, and [`FileStore`], a JSON file on disk.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use banana_protocol::{ProtocolError, SessionToken, UserRecord, WalletAddress};

/// The fixed keys the session layer reads and writes.
pub mod keys {
    /// Current session token.
    pub const TOKEN: &str = "rozo_token";
    /// Older clients stored the token here. Read as a fallback, written
    /// alongside [`TOKEN`].
    pub const LEGACY_TOKEN: &str = "auth_token";
    /// JSON-encoded [`UserRecord`](banana_protocol::UserRecord).
    pub const USER: &str = "rozo_user";
    /// The wallet the stored token was issued to.
    pub const USER_ADDRESS: &str = "userAddress";
    /// A referral code captured from a landing URL.
    pub const REFERRAL_CODE: &str = "referralCode";
}

/// Errors from a [`KeyValueStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The backing file exists but isn't a JSON object of strings.
    #[error("storage file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value couldn't be encoded for storage.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A string key-value store that survives process restarts.
///
/// Operations are synchronous, like browser local storage. The coordinator
/// calls them inside its own critical section, so implementations don't
/// need to coordinate concurrent writers beyond being `Sync`.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: KeyValueStore> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Critical sections in this crate don't call out to user code while
/// mutating, so a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A store persisted as a JSON object in a single file.
///
/// The whole map is loaded at open and kept in memory. Every mutation
/// rewrites the file through a temp file and a rename, so a crash mid-write
/// leaves either the old or the new contents, never a torn file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// A missing file is an empty store; it's created on first write.
    ///
    /// # Errors
    /// [`StoreError::Corrupt`] if the file exists but isn't a JSON object
    /// of strings; [`StoreError::Io`] if it can't be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, String> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                StoreError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "file store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Where the store lives on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Protocol(ProtocolError::Encode(e)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Reads a key, logging and swallowing store errors.
fn read<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            tracing::warn!(key, error = %e, "storage read failed");
            None
        }
    }
}

/// The cached session token, from [`keys::TOKEN`] or [`keys::LEGACY_TOKEN`].
pub fn load_token<S: KeyValueStore + ?Sized>(store: &S) -> Option<SessionToken> {
    read(store, keys::TOKEN)
        .or_else(|| read(store, keys::LEGACY_TOKEN))
        .map(SessionToken::new)
}

/// The cached user record. Malformed JSON counts as absent.
pub fn load_user<S: KeyValueStore + ?Sized>(store: &S) -> Option<UserRecord> {
    let raw = read(store, keys::USER)?;
    match UserRecord::from_json(&raw) {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed cached user record");
            None
        }
    }
}

/// The wallet the cached token belongs to. An invalid address counts as
/// absent.
pub fn load_address<S: KeyValueStore + ?Sized>(store: &S) -> Option<WalletAddress> {
    let raw = read(store, keys::USER_ADDRESS)?;
    match WalletAddress::parse(&raw) {
        Ok(address) => Some(address),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed cached wallet address");
            None
        }
    }
}

/// Writes a freshly issued session: token (both keys), user record, and
/// the owning address.
pub fn save_session<S: KeyValueStore + ?Sized>(
    store: &S,
    token: &SessionToken,
    user: &UserRecord,
) -> Result<(), StoreError> {
    let user_json = user.to_json()?;
    // Owner first: a token on disk must never outlive a failed owner write.
    store.set(keys::USER, &user_json)?;
    store.set(keys::USER_ADDRESS, user.address.as_str())?;
    store.set(keys::TOKEN, token.as_str())?;
    store.set(keys::LEGACY_TOKEN, token.as_str())?;
    Ok(())
}

/// Removes everything tied to a session: token, user record, address.
///
/// The referral code is left alone; it belongs to the visit, not the
/// session.
pub fn clear_session<S: KeyValueStore + ?Sized>(store: &S) -> Result<(), StoreError> {
    for key in [
        keys::TOKEN,
        keys::LEGACY_TOKEN,
        keys::USER,
        keys::USER_ADDRESS,
    ] {
        store.remove(key)?;
    }
    Ok(())
}

/// The referral code captured earlier, if any.
pub fn load_referral<S: KeyValueStore + ?Sized>(store: &S) -> Option<String> {
    read(store, keys::REFERRAL_CODE)
}

pub fn save_referral<S: KeyValueStore + ?Sized>(
    store: &S,
    code: &str,
) -> Result<(), StoreError> {
    store.set(keys::REFERRAL_CODE, code)
}

pub fn clear_referral<S: KeyValueStore + ?Sized>(store: &S) -> Result<(), StoreError> {
    store.remove(keys::REFERRAL_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(raw_address: &str) -> UserRecord {
        UserRecord::new(WalletAddress::parse(raw_address).unwrap())
    }

    // =====================================================================
    // MemoryStore
    // =====================================================================

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        // Removing again is fine.
        store.remove("k").unwrap();
    }

    // =====================================================================
    // FileStore
    // =====================================================================

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("session.json")).unwrap();
        assert_eq!(store.get(keys::TOKEN).unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(keys::TOKEN, "t1").unwrap();
            store.set(keys::REFERRAL_CODE, "FRIEND").unwrap();
            store.remove(keys::REFERRAL_CODE).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::TOKEN).unwrap().as_deref(), Some("t1"));
        assert_eq!(reopened.get(keys::REFERRAL_CODE).unwrap(), None);
        assert!(!path.with_extension("tmp").exists(), "temp file renamed away");
    }

    #[test]
    fn test_file_store_failed_write_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::open(&path).unwrap();
        store.set(keys::TOKEN, "t1").unwrap();

        // A directory where the temp file goes makes every write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.set(keys::TOKEN, "t2").is_err());
        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("t1"));

        assert!(store.remove(keys::TOKEN).is_err());
        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("t1"));

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::TOKEN).unwrap().as_deref(), Some("t1"));
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let result = FileStore::open(&path);

        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    // =====================================================================
    // Typed helpers
    // =====================================================================

    #[test]
    fn test_load_token_falls_back_to_legacy_key() {
        let store = MemoryStore::new();
        assert_eq!(load_token(&store), None);

        store.set(keys::LEGACY_TOKEN, "old").unwrap();
        assert_eq!(load_token(&store), Some(SessionToken::new("old")));

        store.set(keys::TOKEN, "new").unwrap();
        assert_eq!(load_token(&store), Some(SessionToken::new("new")));
    }

    #[test]
    fn test_load_token_ignores_empty_value() {
        let store = MemoryStore::new();
        store.set(keys::TOKEN, "").unwrap();
        assert_eq!(load_token(&store), None);
    }

    #[test]
    fn test_load_user_malformed_is_absent() {
        let store = MemoryStore::new();
        store.set(keys::USER, "{broken").unwrap();
        assert_eq!(load_user(&store), None);

        store.set(keys::USER, r#"{"address":"nope"}"#).unwrap();
        assert_eq!(load_user(&store), None, "invalid address inside record");
    }

    #[test]
    fn test_load_address_malformed_is_absent() {
        let store = MemoryStore::new();
        store.set(keys::USER_ADDRESS, "bob").unwrap();
        assert_eq!(load_address(&store), None);
    }

    #[test]
    fn test_save_session_writes_all_keys() {
        let store = MemoryStore::new();
        let token = SessionToken::new("t1");

        save_session(&store, &token, &user("0xABC")).unwrap();

        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("t1"));
        assert_eq!(store.get(keys::LEGACY_TOKEN).unwrap().as_deref(), Some("t1"));
        assert_eq!(
            store.get(keys::USER_ADDRESS).unwrap().as_deref(),
            Some("0xabc")
        );
        assert_eq!(load_user(&store), Some(user("0xabc")));
    }

    /// Refuses writes to one key.
    struct RejectKey {
        inner: MemoryStore,
        key: &'static str,
    }

    impl KeyValueStore for RejectKey {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if key == self.key {
                return Err(StoreError::Io(io::Error::other("disk full")));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_save_session_owner_write_failure_leaves_no_token() {
        for key in [keys::USER, keys::USER_ADDRESS] {
            let store = RejectKey {
                inner: MemoryStore::new(),
                key,
            };

            let result = save_session(&store, &SessionToken::new("t1"), &user("0xabc"));

            assert!(result.is_err());
            assert_eq!(load_token(&store), None, "token written before {key}");
        }
    }

    #[test]
    fn test_clear_session_keeps_referral() {
        let store = MemoryStore::new();
        save_session(&store, &SessionToken::new("t1"), &user("0xabc")).unwrap();
        save_referral(&store, "FRIEND").unwrap();

        clear_session(&store).unwrap();

        assert_eq!(load_token(&store), None);
        assert_eq!(load_user(&store), None);
        assert_eq!(load_address(&store), None);
        assert_eq!(load_referral(&store).as_deref(), Some("FRIEND"));

        clear_referral(&store).unwrap();
        assert!(store.is_empty());
    }
}
