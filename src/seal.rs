use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{BootstrapError, Result};
use crate::openbao::{InitResponse, OpenBaoClient, SealStatus};

/// Decoded size of the unseal key when the cluster was created with a single share.
const WHOLE_KEY_BYTES: usize = 32;
/// Decoded size of one Shamir share of the unseal key.
const SHAMIR_SHARE_BYTES: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSealState {
    Uninitialized,
    Sealed,
    Unsealed,
}

impl ClusterSealState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterSealState::Uninitialized => "uninitialized",
            ClusterSealState::Sealed => "sealed",
            ClusterSealState::Unsealed => "unsealed",
        }
    }

    fn from_status(status: &SealStatus) -> Self {
        if status.initialized == Some(false) {
            ClusterSealState::Uninitialized
        } else if status.sealed {
            ClusterSealState::Sealed
        } else {
            ClusterSealState::Unsealed
        }
    }
}

impl fmt::Display for ClusterSealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key shares (and, when known, the root token) produced at initialization.
#[derive(Clone)]
pub struct KeyShareSet {
    shares: Vec<String>,
    root_token: Option<String>,
}

impl fmt::Debug for KeyShareSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShareSet")
            .field("shares", &self.shares.len())
            .field("root_token", &self.root_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Deserialize)]
struct KeysFile {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default, alias = "unseal_keys_b64")]
    keys_base64: Vec<String>,
    #[serde(default)]
    root_token: Option<String>,
}

impl KeyShareSet {
    #[must_use]
    pub fn new(shares: Vec<String>, root_token: Option<String>) -> Self {
        Self { shares, root_token }
    }

    #[must_use]
    pub fn from_init_response(response: &InitResponse) -> Self {
        let shares = if response.keys_base64.is_empty() {
            response.keys.clone()
        } else {
            response.keys_base64.clone()
        };
        Self {
            shares,
            root_token: Some(response.root_token.clone()),
        }
    }

    /// Loads shares from an existing keys file: either the JSON init response
    /// or one share per line.
    ///
    /// # Errors
    /// Returns [`BootstrapError::NotInitialized`] if the file is missing or
    /// holds no shares.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|err| {
            BootstrapError::not_initialized(format!(
                "cannot read keys file {}: {err}",
                path.display()
            ))
        })?;
        let set = Self::parse(&contents).map_err(|reason| {
            BootstrapError::not_initialized(format!("keys file {}: {reason}", path.display()))
        })?;
        if set.shares.is_empty() {
            return Err(BootstrapError::not_initialized(format!(
                "keys file {} contains no key shares",
                path.display()
            )));
        }
        Ok(set)
    }

    fn parse(contents: &str) -> std::result::Result<Self, String> {
        let trimmed = contents.trim();
        if trimmed.starts_with('{') {
            let parsed: KeysFile =
                serde_json::from_str(trimmed).map_err(|err| format!("invalid JSON: {err}"))?;
            let shares = if parsed.keys_base64.is_empty() {
                parsed.keys
            } else {
                parsed.keys_base64
            };
            return Ok(Self {
                shares,
                root_token: parsed.root_token.filter(|token| !token.trim().is_empty()),
            });
        }
        let shares = trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            shares,
            root_token: None,
        })
    }

    #[must_use]
    pub fn shares(&self) -> &[String] {
        &self.shares
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    #[must_use]
    pub fn root_token(&self) -> Option<&str> {
        self.root_token.as_deref()
    }

    /// Shares that pass the syntax check, in their original order.
    #[must_use]
    pub fn valid_shares(&self) -> Vec<&str> {
        self.shares
            .iter()
            .map(String::as_str)
            .filter(|share| is_valid_share(share))
            .collect()
    }
}

/// Checks the fixed-length shape of an unseal share: hex or base64 that
/// decodes to a whole 32-byte key or a 33-byte Shamir share.
#[must_use]
pub fn is_valid_share(share: &str) -> bool {
    let share = share.trim();
    let expected = |len: usize| len == WHOLE_KEY_BYTES || len == SHAMIR_SHARE_BYTES;
    let is_hex = share.len() % 2 == 0 && share.chars().all(|ch| ch.is_ascii_hexdigit());
    if is_hex && expected(share.len() / 2) {
        return true;
    }
    STANDARD
        .decode(share)
        .is_ok_and(|decoded| expected(decoded.len()))
}

/// Threshold to submit: the store's reported `t`, else the configured value.
fn resolve_required(reported: Option<u32>, configured: usize) -> usize {
    match reported.and_then(|t| usize::try_from(t).ok()).filter(|t| *t > 0) {
        Some(threshold) => {
            if threshold != configured {
                warn!(
                    "Store reports unseal threshold {threshold} but {configured} is configured; \
                     using the store's value"
                );
            }
            threshold
        }
        None => configured.max(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealOutcome {
    AlreadyUnsealed,
    Unsealed { submitted: usize },
}

/// Drives a store from sealed to unsealed with threshold shares.
#[derive(Debug, Clone, Copy)]
pub struct SealStateMachine<'a> {
    client: &'a OpenBaoClient,
}

impl<'a> SealStateMachine<'a> {
    #[must_use]
    pub fn new(client: &'a OpenBaoClient) -> Self {
        Self { client }
    }

    /// Reads the current seal state.
    ///
    /// # Errors
    /// Returns [`BootstrapError::UnsealFailed`] if the status cannot be read.
    pub async fn state(&self) -> Result<(ClusterSealState, SealStatus)> {
        let status = self.client.seal_status().await.map_err(|err| {
            BootstrapError::unseal_failed(format!("seal status unavailable: {err}"))
        })?;
        Ok((ClusterSealState::from_status(&status), status))
    }

    /// Submits exactly the threshold number of valid shares.
    ///
    /// `fallback_required` is used only when the store does not report its
    /// threshold.
    ///
    /// # Errors
    /// Returns [`BootstrapError::NotInitialized`] for an uninitialized store,
    /// [`BootstrapError::MissingShares`] before any submission when too few
    /// shares are valid, and [`BootstrapError::UnsealFailed`] if the store is
    /// still sealed afterwards.
    pub async fn unseal(
        &self,
        shares: &KeyShareSet,
        fallback_required: usize,
    ) -> Result<SealOutcome> {
        let (state, status) = self.state().await?;
        match state {
            ClusterSealState::Unsealed => {
                info!("Secret store already unsealed; nothing to do");
                return Ok(SealOutcome::AlreadyUnsealed);
            }
            ClusterSealState::Uninitialized => {
                return Err(BootstrapError::not_initialized(
                    "store reports no key shares yet; run `vaultboot init`",
                ));
            }
            ClusterSealState::Sealed => {}
        }

        let required = resolve_required(status.t, fallback_required);
        let valid = shares.valid_shares();
        if valid.len() < shares.len() {
            warn!(
                "Ignoring {} key share(s) with an invalid shape",
                shares.len() - valid.len()
            );
        }
        if valid.len() < required {
            return Err(BootstrapError::MissingShares {
                valid: valid.len(),
                required,
            });
        }

        let mut submitted = 0;
        for (index, share) in valid.iter().take(required).enumerate() {
            let progress = self.client.unseal(share).await.map_err(|err| {
                BootstrapError::unseal_failed(format!("share {} rejected: {err}", index + 1))
            })?;
            submitted += 1;
            info!("Submitted key share {}/{required}", index + 1);
            if !progress.sealed {
                break;
            }
        }

        let (state, status) = self.state().await?;
        if state != ClusterSealState::Unsealed {
            return Err(BootstrapError::unseal_failed(format!(
                "store still {state} after {submitted} share(s) (progress {}/{required})",
                status.progress.unwrap_or(0)
            )));
        }
        info!("Secret store unsealed with {submitted} share(s)");
        Ok(SealOutcome::Unsealed { submitted })
    }
}
