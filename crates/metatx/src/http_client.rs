//! HTTP client for a remote relayer.
//!
//! Mirrors the relayer's routes one to one and implements [`NonceSource`] so
//! a client can sign requests without any chain access of its own.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use url::Url;

use crate::hmac::{sign_body, RELAY_AUTH_HEADER};
use crate::response::{ErrorBody, ForwarderInfo, NonceResponse, RelayResponse};
use crate::signer::NonceSource;
use crate::{MetaTxError, SignedRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RelayClient {
    http: reqwest::Client,
    base: Url,
    shared_secret: Option<Vec<u8>>,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Result<Self, MetaTxError> {
        let base = Url::parse(base_url)
            .map_err(|e| MetaTxError::ConfigError(format!("invalid relayer url {base_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(MetaTxError::ConfigError(format!(
                "relayer url must be http(s), got {}",
                base.scheme()
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            shared_secret: None,
        })
    }

    /// Sign every `POST /relay` body with this secret.
    pub fn with_shared_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.shared_secret = Some(secret.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, MetaTxError> {
        self.base
            .join(path)
            .map_err(|e| MetaTxError::ConfigError(format!("invalid endpoint {path}: {e}")))
    }

    /// Submit a signed request. An inner revert is a successful response with
    /// `success == false`.
    pub async fn relay(&self, signed: &SignedRequest) -> Result<RelayResponse, MetaTxError> {
        let body = serde_json::to_vec(signed)?;
        let mut request = self
            .http
            .post(self.endpoint("relay")?)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT);

        if let Some(secret) = &self.shared_secret {
            request = request.header(RELAY_AUTH_HEADER, sign_body(secret, &body));
        }

        let resp = request
            .body(body)
            .send()
            .await
            .map_err(|e| MetaTxError::HttpError(format!("relay request failed: {e}")))?;
        Self::parse(resp).await
    }

    /// Forwarder nonce of `address` as seen by the relayer.
    pub async fn nonce(&self, address: Address) -> Result<U256, MetaTxError> {
        let resp = self.get(&format!("nonce/{address}")).await?;
        let body: NonceResponse = Self::parse(resp).await?;
        Ok(body.nonce)
    }

    /// Forwarder, registry and EIP-712 domain the relayer serves.
    pub async fn forwarder_info(&self) -> Result<ForwarderInfo, MetaTxError> {
        let resp = self.get("forwarder").await?;
        Self::parse(resp).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, MetaTxError> {
        self.http
            .get(self.endpoint(path)?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MetaTxError::HttpError(format!("GET {path} failed: {e}")))
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, MetaTxError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| MetaTxError::HttpError(format!("response parse failed: {e}")));
        }

        let body = resp.json::<ErrorBody>().await.ok();
        let message = body
            .map(|b| format!("{}: {}", b.error, b.message))
            .unwrap_or_else(|| "no error body".to_string());
        Err(MetaTxError::HttpError(format!("relayer returned {status}: {message}")))
    }
}

impl NonceSource for RelayClient {
    /// The relayer serves a single forwarder; asking about another one is an error.
    async fn nonce_of(&self, forwarder: Address, from: Address) -> Result<U256, MetaTxError> {
        let info = self.forwarder_info().await?;
        if info.forwarder != forwarder {
            return Err(MetaTxError::ConfigError(format!(
                "relayer serves forwarder {}, not {forwarder}",
                info.forwarder
            )));
        }
        self.nonce(from).await
    }

    async fn chain_id(&self) -> Result<u64, MetaTxError> {
        Ok(self.forwarder_info().await?.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(matches!(
            RelayClient::new("ftp://relayer.local"),
            Err(MetaTxError::ConfigError(_))
        ));
        assert!(RelayClient::new("not a url").is_err());
    }

    #[test]
    fn test_endpoints_join_base() {
        let client = RelayClient::new("http://127.0.0.1:4100/").unwrap();
        assert_eq!(
            client.endpoint("relay").unwrap().as_str(),
            "http://127.0.0.1:4100/relay"
        );
        let addr = Address::repeat_byte(0xab);
        assert_eq!(
            client.endpoint(&format!("nonce/{addr}")).unwrap().path(),
            format!("/nonce/{addr}")
        );
    }

    #[tokio::test]
    async fn test_unreachable_relayer_is_http_error() {
        // Port 9 (discard) is not served locally
        let client = RelayClient::new("http://127.0.0.1:9/").unwrap();
        let err = client.forwarder_info().await.unwrap_err();
        assert!(matches!(err, MetaTxError::HttpError(_)));
    }
}
