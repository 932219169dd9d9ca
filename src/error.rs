//! Error taxonomy for the bootstrap subsystem.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Errors raised by the bootstrap components.
///
/// Only [`BootstrapError::StoreUnreachable`] and [`BootstrapError::StoreNotReady`]
/// are the product of a retry loop; every other variant is returned on first
/// occurrence.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The store did not answer within the probe bound.
    #[error("secret store unreachable at {addr} after {attempts} attempt(s): {last}")]
    StoreUnreachable {
        addr: String,
        attempts: u32,
        last: String,
    },

    /// The store answered every time it was reached but never reported the
    /// state the caller waits for.
    #[error("secret store at {addr} not ready after {attempts} attempt(s): {state}")]
    StoreNotReady {
        addr: String,
        attempts: u32,
        state: String,
    },

    /// The cluster has no key shares yet, or the keys file is missing.
    #[error("secret store not initialized: {reason}")]
    NotInitialized { reason: String },

    /// Cluster initialization was rejected or could not be persisted.
    #[error("initialization failed: {reason}")]
    InitFailed { reason: String },

    /// Shares were submitted but the store is still sealed.
    #[error("unseal failed: {reason}")]
    UnsealFailed { reason: String },

    /// Not enough syntactically valid shares to reach the threshold.
    #[error("missing key shares: {valid} valid share(s) available, {required} required")]
    MissingShares { valid: usize, required: usize },

    /// A required credential input was absent or empty.
    #[error("missing credential: {label} ({})", path.display())]
    MissingCredential { label: String, path: PathBuf },

    /// A legacy credential file is readable by more than its owner.
    #[error("insecure permissions {mode:o} on {} (expected 600 or 400)", path.display())]
    InsecureCredentialFile { path: PathBuf, mode: u32 },

    /// The trust exchange did not yield a usable token.
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// The secret bundle could not be read.
    #[error("secret unavailable for {identity}: {reason}")]
    SecretUnavailable { identity: String, reason: String },

    /// The secret bundle was read but a field is unusable.
    #[error("invalid secret {identity}.{field}: {reason}")]
    InvalidSecret {
        identity: String,
        field: String,
        reason: String,
    },

    /// A certificate artifact is absent or unreadable.
    #[error("missing {artifact} at {}; {hint}", path.display())]
    CertMissing {
        artifact: CertArtifact,
        path: PathBuf,
        hint: String,
    },

    /// On-demand certificate issuance failed.
    #[error("certificate issuance failed for {common_name}: {reason}")]
    IssuanceFailed { common_name: String, reason: String },

    /// Writing a rendered artifact failed.
    #[error("failed to write {}: {reason}", path.display())]
    ConfigWrite { path: PathBuf, reason: String },

    /// Replacing the process with the service failed.
    #[error("failed to exec {program}: {reason}")]
    HandoffFailed { program: String, reason: String },
}

impl BootstrapError {
    pub fn not_initialized(reason: impl Into<String>) -> Self {
        Self::NotInitialized {
            reason: reason.into(),
        }
    }

    pub fn init_failed(reason: impl Into<String>) -> Self {
        Self::InitFailed {
            reason: reason.into(),
        }
    }

    pub fn unseal_failed(reason: impl Into<String>) -> Self {
        Self::UnsealFailed {
            reason: reason.into(),
        }
    }

    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn secret_unavailable(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SecretUnavailable {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_secret(
        identity: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSecret {
            identity: identity.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn issuance_failed(common_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IssuanceFailed {
            common_name: common_name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for certificate errors that an optional TLS policy may absorb.
    #[must_use]
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, Self::CertMissing { .. } | Self::IssuanceFailed { .. })
    }
}

/// One of the three files that make up a certificate bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertArtifact {
    Certificate,
    PrivateKey,
    CaChain,
}

impl CertArtifact {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CertArtifact::Certificate => "certificate",
            CertArtifact::PrivateKey => "private key",
            CertArtifact::CaChain => "CA chain",
        }
    }
}

impl fmt::Display for CertArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases of a single service bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WaitingForStore,
    Authenticating,
    FetchingSecrets,
    ValidatingCertificates,
    ConfiguringService,
    Handoff,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::WaitingForStore,
        Stage::Authenticating,
        Stage::FetchingSecrets,
        Stage::ValidatingCertificates,
        Stage::ConfiguringService,
        Stage::Handoff,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::WaitingForStore => "waiting-for-store",
            Stage::Authenticating => "authenticating",
            Stage::FetchingSecrets => "fetching-secrets",
            Stage::ValidatingCertificates => "validating-certificates",
            Stage::ConfiguringService => "configuring-service",
            Stage::Handoff => "handoff",
        }
    }

    /// The stage that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        let index = Stage::ALL.iter().position(|stage| *stage == self)?;
        Stage::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bootstrap failure labeled with the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: BootstrapError,
}

impl StageError {
    #[must_use]
    pub fn new(stage: Stage, source: BootstrapError) -> Self {
        Self { stage, source }
    }
}
