use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::BearerSession;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Failures talking to the store's HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: StatusCode,
        message: String,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// HTTP status of an API-level rejection, if that is what this is.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Thin client over the store's `/v1` HTTP surface.
///
/// The client never holds a token; authorized calls take a [`BearerSession`].
#[derive(Debug, Clone)]
pub struct OpenBaoClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub initialized: Option<bool>,
    #[serde(default)]
    pub sealed: Option<bool>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
    #[serde(default)]
    pub t: Option<u32>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub initialized: Option<bool>,
}

/// Decoded `sys/init` response plus the body exactly as received.
#[derive(Deserialize, Clone)]
pub struct InitResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    pub root_token: String,
    #[serde(skip)]
    pub raw: String,
}

impl std::fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &self.keys.len())
            .field("keys_base64", &self.keys_base64.len())
            .field("root_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
pub struct LoginAuth {
    #[serde(default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub lease_duration: Option<u64>,
    #[serde(default)]
    pub policies: Vec<String>,
}

impl std::fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAuth")
            .field("lease_duration", &self.lease_duration)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct KvReadResponse {
    pub data: KvEnvelope,
}

#[derive(Debug, Deserialize)]
pub struct KvEnvelope {
    #[serde(default)]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub metadata: Option<KvMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct KvMetadata {
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueRequest {
    pub common_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alt_names: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_sans: String,
    pub ttl: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueResponse {
    pub data: IssuedCertificate,
}

#[derive(Deserialize)]
pub struct IssuedCertificate {
    #[serde(default)]
    pub certificate: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub issuing_ca: String,
    #[serde(default)]
    pub ca_chain: Vec<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

impl OpenBaoClient {
    /// Builds a client for the store at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.base_url
    }

    /// Queries `sys/health`. Any HTTP response is a success here; the status
    /// code only encodes initialized/sealed/standby, which the body repeats.
    ///
    /// # Errors
    /// Returns [`ApiError::Transport`] when no response arrives.
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let endpoint = "sys/health";
        let response = self
            .client
            .get(self.endpoint(endpoint))
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if the request fails or the body is not an init status.
    pub async fn init_status(&self) -> Result<InitStatus, ApiError> {
        self.get_json("sys/init", None).await
    }

    /// Requests `shares` key shares with reconstruction `threshold`.
    ///
    /// # Errors
    /// Returns an error if the store rejects the request or the body is malformed.
    pub async fn init(&self, shares: u8, threshold: u8) -> Result<InitResponse, ApiError> {
        #[derive(Serialize)]
        struct InitRequest {
            secret_shares: u8,
            secret_threshold: u8,
        }
        let endpoint = "sys/init";
        let response = self
            .client
            .post(self.endpoint(endpoint))
            .json(&InitRequest {
                secret_shares: shares,
                secret_threshold: threshold,
            })
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let raw = Self::read_success_body(endpoint, response).await?;
        let mut parsed: InitResponse =
            serde_json::from_str(&raw).map_err(|source| ApiError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;
        parsed.raw = raw;
        Ok(parsed)
    }

    /// # Errors
    /// Returns an error if the request fails or the body is not a seal status.
    pub async fn seal_status(&self) -> Result<SealStatus, ApiError> {
        self.get_json("sys/seal-status", None).await
    }

    /// Submits one unseal share.
    ///
    /// # Errors
    /// Returns an error if the store rejects the share.
    pub async fn unseal(&self, key: &str) -> Result<SealStatus, ApiError> {
        #[derive(Serialize)]
        struct UnsealRequest<'a> {
            key: &'a str,
        }
        self.post_json("sys/unseal", None, &UnsealRequest { key })
            .await
    }

    /// Exchanges an AppRole pair for a login response.
    ///
    /// # Errors
    /// Returns an error if the store rejects the pair.
    pub async fn login_approle(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> Result<LoginResponse, ApiError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            role_id: &'a str,
            secret_id: &'a str,
        }
        self.post_json(
            "auth/approle/login",
            None,
            &LoginRequest { role_id, secret_id },
        )
        .await
    }

    /// Reads a KV v2 entry.
    ///
    /// # Errors
    /// Returns an error if the entry is missing, forbidden or malformed.
    pub async fn read_kv(
        &self,
        session: &BearerSession,
        mount: &str,
        path: &str,
    ) -> Result<KvReadResponse, ApiError> {
        self.get_json(&format!("{mount}/data/{path}"), Some(session))
            .await
    }

    /// Issues a certificate from a PKI role.
    ///
    /// # Errors
    /// Returns an error if the role rejects the request.
    pub async fn issue_certificate(
        &self,
        session: &BearerSession,
        mount: &str,
        role: &str,
        request: &IssueRequest,
    ) -> Result<IssueResponse, ApiError> {
        self.post_json(&format!("{mount}/issue/{role}"), Some(session), request)
            .await
    }

    /// Fetches the PEM CA chain of a PKI mount. This endpoint is unauthenticated.
    ///
    /// # Errors
    /// Returns an error if the mount does not serve a chain.
    pub async fn ca_chain(&self, mount: &str) -> Result<String, ApiError> {
        let endpoint = format!("{mount}/ca_chain");
        let response = self
            .client
            .get(self.endpoint(&endpoint))
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        Self::read_success_body(&endpoint, response).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session: Option<&BearerSession>,
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(self.endpoint(path));
        if let Some(session) = session {
            request = request.header(VAULT_TOKEN_HEADER, session.token());
        }
        let response = request.send().await.map_err(|source| ApiError::Transport {
            endpoint: path.to_string(),
            source,
        })?;
        Self::parse_response(path, response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        session: Option<&BearerSession>,
        body: &B,
    ) -> Result<T, ApiError> {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(session) = session {
            request = request.header(VAULT_TOKEN_HEADER, session.token());
        }
        let response = request.send().await.map_err(|source| ApiError::Transport {
            endpoint: path.to_string(),
            source,
        })?;
        Self::parse_response(path, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = Self::read_success_body(endpoint, response).await?;
        let text = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str(text).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn read_success_body(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<String, ApiError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                message: error_message(&text),
            });
        }
        Ok(text)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => "empty response".to_string(),
        _ => body.trim().to_string(),
    }
}
