//! Core types exchanged with the auth endpoint and kept in durable storage.
//!
//! These are the structures that get serialized to JSON, sent to the
//! hosted function API, and cached between runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A wallet's public identifier: `0x` followed by hex digits, lowercase.
///
/// Wallet providers hand out checksummed (mixed-case) addresses, while the
/// backend keys users by the lowercase form. Normalizing once, at parse
/// time, means two spellings of the same wallet can never end up with two
/// sessions. The only way to get a `WalletAddress` is through [`parse`],
/// so every value in the system is already normalized.
///
/// Serializes as the plain string. Deserializing validates and normalizes,
/// so a cached record with a checksummed address still loads.
///
/// [`parse`]: WalletAddress::parse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parses and lowercases a wallet address.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidAddress`] if the input is empty,
    /// lacks the `0x` prefix, has nothing after the prefix, or contains
    /// non-hex characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ProtocolError::InvalidAddress(raw.to_string()))?;

        if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidAddress(raw.to_string()));
        }

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// Returns the normalized address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

/// An opaque bearer credential issued by the auth endpoint.
///
/// `Debug` is implemented by hand so tokens never show up in logs, even
/// when a whole session is printed with `{:?}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token, e.g. for an `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The user record returned by the auth endpoint and cached in storage.
///
/// Only the fields the session layer reads are typed. Everything else the
/// backend sends (display name, credit balances, ...) lands in `extra`, so
/// writing the record back to storage doesn't drop anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// The wallet this user record belongs to.
    pub address: WalletAddress,

    /// The user's own referral code, which they can share with others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,

    /// Loyalty points balance, if the backend included it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,

    /// Fields the session layer doesn't interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    /// A record with only the address set.
    pub fn new(address: WalletAddress) -> Self {
        Self {
            address,
            referral_code: None,
            points: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Serializes the record for durable storage.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parses a record previously written by [`to_json`](Self::to_json).
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Auth endpoint messages
// ---------------------------------------------------------------------------

/// Body of `POST /auth/verify`.
///
/// The endpoint recovers the signer from `signature` over `message` and
/// checks it matches `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// The exact challenge text the wallet signed.
    pub message: String,
    /// Hex signature produced by the wallet.
    pub signature: String,
    /// The signing wallet.
    pub address: WalletAddress,
    /// Code of the user who referred this one, if any.
    #[serde(
        rename = "referralCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub referral_code: Option<String>,
}

/// Response of `POST /auth/verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub token: SessionToken,
    /// `true` if the endpoint created the account during this call.
    #[serde(default)]
    pub is_new_user: bool,
    pub user: UserRecord,
    /// `true` if the submitted referral code was credited.
    #[serde(default)]
    pub referral_applied: bool,
}

/// Response of `GET /auth/validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

/// Error body the hosted functions return alongside non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}
