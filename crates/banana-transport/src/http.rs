//! HTTP implementation of [`AuthEndpoint`] using `reqwest`.
//!
//! Talks to the hosted function API:
//!
//! - `POST {base}/auth/verify`: JSON [`VerifyRequest`] → [`VerifyResponse`]
//! - `GET {base}/auth/validate`: bearer token → [`ValidateResponse`]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use banana_protocol::{
    ApiErrorBody, SessionToken, ValidateResponse, VerifyRequest,
    VerifyResponse,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{AuthEndpoint, RequestId, TransportError};

/// Counter for generating unique request IDs.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

const VERIFY_PATH: &str = "auth/verify";
const VALIDATE_PATH: &str = "auth/validate";

/// An [`AuthEndpoint`] reached over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAuthEndpoint {
    client: Client,
    base: Url,
    anon_key: Option<String>,
}

impl HttpAuthEndpoint {
    /// Creates an endpoint rooted at `base_url`, e.g.
    /// `https://project.supabase.co/functions/v1`.
    ///
    /// A trailing slash is added if missing so relative paths join under
    /// the base instead of replacing its last segment.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url).map_err(|e| {
            TransportError::InvalidUrl(format!("{base_url}: {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base,
            anon_key: None,
        })
    }

    /// Sets the public API key sent as `apikey` on every request.
    pub fn with_anon_key(mut self, key: impl Into<String>) -> Self {
        self.anon_key = Some(key.into());
        self
    }

    /// Rebuilds the HTTP client with a per-request timeout.
    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        Ok(self)
    }

    /// The normalized base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))
    }

    fn with_api_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    /// Sends `request` and decodes a JSON body of type `T`.
    ///
    /// Non-2xx statuses become [`TransportError::Status`], preferring the
    /// `error` field of the body as the message.
    async fn send<T: DeserializeOwned>(
        &self,
        id: RequestId,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!(%id, error = %e, "request failed");
            TransportError::RequestFailed(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        tracing::debug!(%id, status = status.as_u16(), "response received");

        if !status.is_success() {
            let message = match serde_json::from_slice::<ApiErrorBody>(&body)
            {
                Ok(parsed) => parsed.error,
                Err(_) => {
                    let text = String::from_utf8_lossy(&body).trim().to_string();
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("").to_string()
                    } else {
                        text
                    }
                }
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))
    }
}

fn next_request_id() -> RequestId {
    RequestId::new(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

impl AuthEndpoint for HttpAuthEndpoint {
    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, TransportError> {
        let id = next_request_id();
        let url = self.url(VERIFY_PATH)?;
        tracing::debug!(%id, %url, address = %request.address, "POST verify");

        let mut builder = self.with_api_key(self.client.post(url).json(request));
        if let Some(key) = &self.anon_key {
            builder = builder.bearer_auth(key);
        }

        self.send(id, builder).await
    }

    async fn validate(
        &self,
        token: &SessionToken,
    ) -> Result<ValidateResponse, TransportError> {
        let id = next_request_id();
        let url = self.url(VALIDATE_PATH)?;
        tracing::debug!(%id, %url, "GET validate");

        let builder = self
            .with_api_key(self.client.get(url))
            .bearer_auth(token.as_str());

        self.send(id, builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_appends_trailing_slash() {
        let ep = HttpAuthEndpoint::new("https://x.supabase.co/functions/v1")
            .unwrap();
        assert_eq!(ep.base_url().as_str(), "https://x.supabase.co/functions/v1/");
        assert_eq!(
            ep.url(VERIFY_PATH).unwrap().as_str(),
            "https://x.supabase.co/functions/v1/auth/verify"
        );
    }

    #[test]
    fn test_new_keeps_existing_trailing_slash() {
        let ep = HttpAuthEndpoint::new("http://127.0.0.1:9000/").unwrap();
        assert_eq!(
            ep.url(VALIDATE_PATH).unwrap().as_str(),
            "http://127.0.0.1:9000/auth/validate"
        );
    }

    #[test]
    fn test_new_rejects_garbage_url() {
        assert!(matches!(
            HttpAuthEndpoint::new("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpAuthEndpoint::new("mailto:someone@example.com"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = next_request_id();
        let b = next_request_id();
        assert_ne!(a, b);
    }
}
