use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{info, warn};

use crate::error::{BootstrapError, Result};
use crate::openbao::OpenBaoClient;

/// Environment variable consulted by the legacy root-token path.
pub const ROOT_TOKEN_ENV: &str = "VAULT_TOKEN";

const ALLOWED_ROOT_TOKEN_MODES: [u32; 2] = [0o600, 0o400];

/// Short-lived token proving a prior login. Passed explicitly to every
/// authorized call and never written to disk.
#[derive(Clone)]
pub struct BearerSession {
    token: String,
    lease: Option<Duration>,
    policies: Vec<String>,
    kind: SessionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Issued by an AppRole login and bound to that role's policies.
    AppRole,
    /// A long-lived administrative token; carries full access.
    Root,
}

impl BearerSession {
    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn lease(&self) -> Option<Duration> {
        self.lease
    }

    #[must_use]
    pub fn policies(&self) -> &[String] {
        &self.policies
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Wraps an administrative token supplied by the operator.
    #[must_use]
    pub fn root(token: String) -> Self {
        Self {
            token,
            lease: None,
            policies: vec!["root".to_string()],
            kind: SessionKind::Root,
        }
    }
}

impl fmt::Debug for BearerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerSession")
            .field("token", &"<redacted>")
            .field("lease", &self.lease)
            .field("policies", &self.policies)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Pre-distributed AppRole pair for one service.
#[derive(Clone)]
pub struct AppRoleCredential {
    role_id: String,
    secret_id: String,
}

impl fmt::Debug for AppRoleCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRoleCredential")
            .field("role_id", &self.role_id)
            .field("secret_id", &"<redacted>")
            .finish()
    }
}

impl AppRoleCredential {
    /// Reads the role id and secret id from their separate files.
    ///
    /// # Errors
    /// Returns [`BootstrapError::MissingCredential`] when either file is
    /// missing, unreadable or blank.
    pub async fn from_files(role_id_path: &Path, secret_id_path: &Path) -> Result<Self> {
        let role_id = read_required_value(role_id_path, "AppRole role_id").await?;
        let secret_id = read_required_value(secret_id_path, "AppRole secret_id").await?;
        Ok(Self { role_id, secret_id })
    }

    #[must_use]
    pub fn role_id(&self) -> &str {
        &self.role_id
    }
}

/// Exchanges the AppRole pair for a [`BearerSession`].
///
/// Failures are never retried.
///
/// # Errors
/// Returns [`BootstrapError::AuthFailed`] when the store rejects the pair or
/// answers without a usable token.
pub async fn login(
    client: &OpenBaoClient,
    credential: &AppRoleCredential,
) -> Result<BearerSession> {
    let response = client
        .login_approle(&credential.role_id, &credential.secret_id)
        .await
        .map_err(|err| BootstrapError::auth_failed(err.to_string()))?;
    let auth = response
        .auth
        .ok_or_else(|| BootstrapError::auth_failed("login response has no auth block"))?;
    let token = auth
        .client_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty() && token != "null")
        .ok_or_else(|| BootstrapError::auth_failed("login response has an empty client token"))?;
    let session = BearerSession {
        token,
        lease: auth.lease_duration.map(Duration::from_secs),
        policies: auth.policies,
        kind: SessionKind::AppRole,
    };
    info!(
        "AppRole login succeeded (role_id={}, policies={:?}, lease={:?})",
        credential.role_id, session.policies, session.lease
    );
    Ok(session)
}

/// Where the legacy root token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootTokenSource {
    Environment,
    File(PathBuf),
}

/// Resolves the administrative root token: the environment first, then the
/// permission-checked file.
///
/// # Errors
/// Returns [`BootstrapError::InsecureCredentialFile`] if the file mode is not
/// 0600/0400, or [`BootstrapError::MissingCredential`] if neither source
/// yields a token.
pub async fn load_root_token(
    env_value: Option<String>,
    file: Option<&Path>,
) -> Result<(BearerSession, RootTokenSource)> {
    if let Some(token) = env_value.map(|value| value.trim().to_string())
        && !token.is_empty()
    {
        warn!("Using root token from {ROOT_TOKEN_ENV}; this credential has full access");
        return Ok((BearerSession::root(token), RootTokenSource::Environment));
    }
    let Some(path) = file else {
        return Err(BootstrapError::MissingCredential {
            label: format!("root token ({ROOT_TOKEN_ENV} unset and no root token file)"),
            path: PathBuf::new(),
        });
    };
    let token = read_root_token_file(path).await?;
    warn!(
        "Using root token from {}; this credential has full access",
        path.display()
    );
    Ok((
        BearerSession::root(token),
        RootTokenSource::File(path.to_path_buf()),
    ))
}

/// Reads a root token file after checking it is owner-only.
///
/// # Errors
/// Returns [`BootstrapError::InsecureCredentialFile`] on a loose mode and
/// [`BootstrapError::MissingCredential`] if the file is absent or blank.
pub async fn read_root_token_file(path: &Path) -> Result<String> {
    check_owner_only(path).await?;
    read_required_value(path, "root token").await
}

/// Fails unless `path` is mode 0600 or 0400.
///
/// # Errors
/// Returns [`BootstrapError::MissingCredential`] if the file is absent and
/// [`BootstrapError::InsecureCredentialFile`] on any other mode.
pub async fn check_owner_only(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|_| BootstrapError::MissingCredential {
            label: "credential file".to_string(),
            path: path.to_path_buf(),
        })?;
    let mode = metadata.permissions().mode() & 0o777;
    if !ALLOWED_ROOT_TOKEN_MODES.contains(&mode) {
        return Err(BootstrapError::InsecureCredentialFile {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

async fn read_required_value(path: &Path, label: &str) -> Result<String> {
    let missing = || BootstrapError::MissingCredential {
        label: label.to_string(),
        path: path.to_path_buf(),
    };
    let raw = fs::read_to_string(path).await.map_err(|_| missing())?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(missing());
    }
    Ok(trimmed.to_string())
}
