//! Signs a wallet in from the terminal.
//!
//! ```text
//! wallet-session <address> [page-url]
//! ```
//!
//! The challenge is printed and the signature is read back from stdin,
//! so any wallet that can sign a personal message works. Configuration
//! comes from the `BANANA_*` environment variables.

use banana::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use url::Url;

const LOG_FILTER: &str = "banana=info,wallet_session=info";

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Shows the challenge and takes the signature from a line of input.
struct LineSigner<R> {
    input: Mutex<R>,
}

impl<R> LineSigner<R> {
    fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl<R> WalletSigner for LineSigner<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn sign_message(
        &self,
        address: &WalletAddress,
        message: &str,
    ) -> Result<String, SessionError> {
        let prompt = format!(
            "\nSign this message with {address}:\n\n{message}\n\nPaste the signature (empty to decline): "
        );
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| SessionError::SignatureRejected(e.to_string()))?;
        stderr
            .flush()
            .await
            .map_err(|e| SessionError::SignatureRejected(e.to_string()))?;

        let mut line = String::new();
        self.input
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::SignatureRejected(e.to_string()))?;

        match line.trim() {
            "" => Err(SessionError::SignatureRejected("declined".into())),
            signature => Ok(signature.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    banana::init_tracing_with(LOG_FILTER);

    let mut args = std::env::args().skip(1);
    let Some(raw_address) = args.next() else {
        eprintln!("usage: wallet-session <address> [page-url]");
        std::process::exit(2);
    };
    let address = WalletAddress::parse(&raw_address)?;

    let client = BananaClientBuilder::new()
        .config(ClientConfig::from_env()?)
        .build(LineSigner::new(BufReader::new(tokio::io::stdin())))?;

    if let Some(page) = args.next() {
        if let Some(code) = client.set_page_url(Url::parse(&page)?) {
            tracing::info!(referral_code = %code, "referral code captured");
        }
    }

    let snapshot = client.connect(address).await;
    if snapshot.authenticated {
        eprintln!("already signed in");
        return Ok(());
    }

    match client.sign_in(None).await {
        SignInOutcome::SignedIn { is_new_user, .. } => {
            eprintln!("signed in{}", if is_new_user { " (new account)" } else { "" });
        }
        outcome => {
            eprintln!("sign-in did not complete: {outcome:?}");
            std::process::exit(1);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> WalletAddress {
        WalletAddress::parse("0xabc").unwrap()
    }

    #[tokio::test]
    async fn test_line_signer_returns_trimmed_signature() {
        let signer = LineSigner::new(&b"  0xsig \n"[..]);
        let signature = signer.sign_message(&addr(), "hello").await.unwrap();
        assert_eq!(signature, "0xsig");
    }

    #[tokio::test]
    async fn test_line_signer_empty_line_declines() {
        let signer = LineSigner::new(&b"\n"[..]);
        let result = signer.sign_message(&addr(), "hello").await;
        assert!(matches!(result, Err(SessionError::SignatureRejected(_))));
    }

    #[tokio::test]
    async fn test_line_signer_end_of_input_declines() {
        let signer = LineSigner::new(&b""[..]);
        let result = signer.sign_message(&addr(), "hello").await;
        assert!(matches!(result, Err(SessionError::SignatureRejected(_))));
    }
}
