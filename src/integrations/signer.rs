//! Pluggable request signing
//!
//! The metrics store, the trace store, and the secret store all sit behind
//! credential-bearing endpoints (AWS SigV4 in the reference deployment).
//! Signing is a capability so a non-AWS backend can swap in a different
//! scheme — or none at all — without touching the callers.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use http::HeaderMap;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("No credentials available: {0}")]
    Credentials(String),
    #[error("Failed to build signing parameters: {0}")]
    Params(String),
    #[error("Signing failed: {0}")]
    Sign(String),
    #[error("Invalid request: {0}")]
    Request(String),
}

/// Attaches authentication headers to an outgoing HTTP request.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Produce the headers (including any `Authorization`) to send with the
    /// given request. `headers` are the caller's own headers that must be
    /// covered by the signature.
    async fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<HeaderMap, SignerError>;
}

/// Load AWS credentials once from the default provider chain (environment,
/// profile, instance metadata). Called at startup; signers clone from here.
pub async fn load_aws_credentials() -> Result<Credentials, SignerError> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let provider = config
        .credentials_provider()
        .ok_or_else(|| SignerError::Credentials("no credentials provider configured".into()))?;
    provider
        .provide_credentials()
        .await
        .map_err(|e| SignerError::Credentials(e.to_string()))
}

/// AWS SigV4 signer for one service/region pair.
#[derive(Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(credentials: Credentials, region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }
}

#[async_trait]
impl RequestSigner for SigV4Signer {
    async fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<HeaderMap, SignerError> {
        let identity = self.credentials.clone().into();
        let settings = SigningSettings::default();
        let params: aws_sigv4::http_request::SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| SignerError::Params(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            method,
            url,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            SignableBody::Bytes(body),
        )
        .map_err(|e| SignerError::Request(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| SignerError::Sign(e.to_string()))?
            .into_parts();

        let mut signed = HeaderMap::new();
        for (key, value) in headers {
            insert_header(&mut signed, key, value)?;
        }
        for (key, value) in instructions.headers() {
            insert_header(&mut signed, key, value)?;
        }

        Ok(signed)
    }
}

fn insert_header(map: &mut HeaderMap, key: &str, value: &str) -> Result<(), SignerError> {
    let name: http::header::HeaderName = key
        .parse()
        .map_err(|_| SignerError::Request(format!("invalid header name: {key}")))?;
    let value: http::header::HeaderValue = value
        .parse()
        .map_err(|_| SignerError::Request(format!("invalid header value for {key}")))?;
    map.insert(name, value);
    Ok(())
}

/// No-op signer for unauthenticated backends and tests.
pub struct NoopSigner;

#[async_trait]
impl RequestSigner for NoopSigner {
    async fn sign_request(
        &self,
        _method: &str,
        _url: &str,
        headers: &[(String, String)],
        _body: &[u8],
    ) -> Result<HeaderMap, SignerError> {
        let mut map = HeaderMap::new();
        for (key, value) in headers {
            insert_header(&mut map, key, value)?;
        }
        Ok(map)
    }
}
