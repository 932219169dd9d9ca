use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{BootstrapError, Result};
use crate::fs_util;
use crate::openbao::OpenBaoClient;
use crate::seal::KeyShareSet;

/// Where the initializer persists its output.
#[derive(Debug, Clone)]
pub struct InitPaths {
    /// Full init response, verbatim.
    pub keys_file: PathBuf,
    /// Root token only.
    pub root_token_file: PathBuf,
}

#[derive(Debug)]
pub enum InitOutcome {
    /// The cluster was initialized by this call.
    Initialized(KeyShareSet),
    /// The cluster already had key shares; nothing was requested or written.
    AlreadyInitialized,
}

/// One-time cluster bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdInitializer<'a> {
    client: &'a OpenBaoClient,
}

impl<'a> ThresholdInitializer<'a> {
    #[must_use]
    pub fn new(client: &'a OpenBaoClient) -> Self {
        Self { client }
    }

    /// Requests `shares` key shares with reconstruction `threshold` unless the
    /// cluster is already initialized.
    ///
    /// # Errors
    /// Returns [`BootstrapError::InitFailed`] for invalid parameters, a
    /// rejected request, an incomplete response, or an existing output file.
    pub async fn initialize(
        &self,
        threshold: u8,
        shares: u8,
        paths: &InitPaths,
    ) -> Result<InitOutcome> {
        if threshold == 0 || threshold > shares {
            return Err(BootstrapError::init_failed(format!(
                "threshold must be between 1 and {shares} (got {threshold})"
            )));
        }
        let status = self.client.init_status().await.map_err(|err| {
            BootstrapError::init_failed(format!("init status unavailable: {err}"))
        })?;
        if status.initialized {
            info!("Secret store already initialized; skipping key share generation");
            return Ok(InitOutcome::AlreadyInitialized);
        }
        refuse_existing(&paths.keys_file)?;
        refuse_existing(&paths.root_token_file)?;

        info!("Initializing secret store with {shares} share(s), threshold {threshold}");
        let response = self
            .client
            .init(shares, threshold)
            .await
            .map_err(|err| BootstrapError::init_failed(err.to_string()))?;
        let returned = response.keys_base64.len().max(response.keys.len());
        if returned != usize::from(shares) {
            return Err(BootstrapError::init_failed(format!(
                "store returned {returned} key share(s), expected {shares}"
            )));
        }
        if response.root_token.trim().is_empty() {
            return Err(BootstrapError::init_failed(
                "store returned an empty root token",
            ));
        }

        persist(&paths.keys_file, response.raw.as_bytes()).await?;
        persist(&paths.root_token_file, response.root_token.trim().as_bytes()).await?;
        info!(
            "Persisted key shares to {} and root token to {}",
            paths.keys_file.display(),
            paths.root_token_file.display()
        );
        Ok(InitOutcome::Initialized(KeyShareSet::from_init_response(
            &response,
        )))
    }
}

fn refuse_existing(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(BootstrapError::init_failed(format!(
            "{} already exists; move it aside before initializing a new cluster",
            path.display()
        )));
    }
    Ok(())
}

async fn persist(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs_util::ensure_dir(parent, fs_util::SECRETS_DIR_MODE)
            .await
            .map_err(|err| BootstrapError::init_failed(format!("{err:#}")))?;
    }
    fs_util::create_owner_only(path, contents)
        .await
        .map_err(|err| BootstrapError::init_failed(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_initialize_rejects_threshold_above_shares() {
        let client =
            OpenBaoClient::new("http://127.0.0.1:9", Duration::from_millis(100)).expect("client");
        let dir = tempdir().expect("temp dir");
        let paths = InitPaths {
            keys_file: dir.path().join("keys.json"),
            root_token_file: dir.path().join("root-token"),
        };

        let err = ThresholdInitializer::new(&client)
            .initialize(6, 5, &paths)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("threshold must be between 1 and 5"));
        assert!(!paths.keys_file.exists());
    }

    #[test]
    fn test_refuse_existing_names_path() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "{}").expect("write");

        let err = refuse_existing(&path).unwrap_err();
        assert!(err.to_string().contains("keys.json already exists"));
    }
}
