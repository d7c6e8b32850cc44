//! The sign-in challenge: the text a wallet is asked to sign.
//!
//! The challenge is human-readable on purpose. Wallets show it verbatim
//! in their approval prompt, so the user can see which app is asking and
//! when. The nonce is the issue time in milliseconds. The auth endpoint
//! rejects stale or replayed messages by looking at it.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::WalletAddress;

/// Name shown in the first line of every challenge.
pub const APP_NAME: &str = "Banana";

/// A challenge message ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Milliseconds since the Unix epoch at issue time.
    pub nonce: i64,
    /// When the challenge was issued.
    pub issued_at: DateTime<Utc>,
    /// The full text to sign.
    pub message: String,
}

impl Challenge {
    /// Builds the challenge for `address` issued at `issued_at`.
    ///
    /// Pure so tests can pin the clock. Use [`Challenge::now`] in real code.
    pub fn new(address: &WalletAddress, issued_at: DateTime<Utc>) -> Self {
        let nonce = issued_at.timestamp_millis();
        let timestamp = issued_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let message = format!(
            "Welcome to {APP_NAME}!\n\n\
             Sign this message to prove you own this wallet. \
             It costs nothing and does not send a transaction.\n\n\
             Wallet: {address}\n\
             Nonce: {nonce}\n\
             Timestamp: {timestamp}"
        );

        Self {
            nonce,
            issued_at,
            message,
        }
    }

    /// Builds a challenge issued right now.
    pub fn now(address: &WalletAddress) -> Self {
        Self::new(address, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_challenge_embeds_nonce_timestamp_and_address() {
        let address = WalletAddress::parse("0xABC123").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let challenge = Challenge::new(&address, at);

        assert_eq!(challenge.nonce, 1_714_566_600_000);
        assert!(challenge.message.starts_with("Welcome to Banana!"));
        assert!(challenge.message.contains("Wallet: 0xabc123"));
        assert!(challenge.message.contains("Nonce: 1714566600000"));
        assert!(
            challenge.message.contains("Timestamp: 2024-05-01T12:30:00.000Z")
        );
    }

    #[test]
    fn test_challenge_now_differs_per_millisecond() {
        let address = WalletAddress::parse("0x1").unwrap();
        let a = Challenge::new(&address, Utc.timestamp_millis_opt(1).unwrap());
        let b = Challenge::new(&address, Utc.timestamp_millis_opt(2).unwrap());
        assert_ne!(a.message, b.message);
        assert_eq!(b.nonce - a.nonce, 1);
    }
}
