//! Referral code resolution.
//!
//! A referral code reaches sign-in from one of three places, first match
//! wins:
//!
//! 1. passed explicitly to `sign_in` (e.g. typed into a form),
//! 2. the `ref` query parameter of the page the user is on,
//! 3. a code captured from an earlier landing URL and kept in storage.

use url::Url;

use crate::store::{self, KeyValueStore};

/// Normalizes a candidate code: trimmed, and `None` if blank.
fn clean(code: &str) -> Option<String> {
    let trimmed = code.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Extracts the referral code from `url`'s query string.
pub fn referral_from_url(url: &Url, param: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == param)
        .and_then(|(_, value)| clean(&value))
}

/// Picks the referral code to send with a sign-in.
pub fn resolve_referral<S: KeyValueStore + ?Sized>(
    explicit: Option<&str>,
    page_url: Option<&Url>,
    param: &str,
    store: &S,
) -> Option<String> {
    explicit
        .and_then(clean)
        .or_else(|| page_url.and_then(|url| referral_from_url(url, param)))
        .or_else(|| store::load_referral(store))
}
