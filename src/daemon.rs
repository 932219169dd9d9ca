use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{BootstrapError, Result};
use crate::health::{HealthProbe, ProbeTarget};
use crate::openbao::OpenBaoClient;
use crate::seal::{ClusterSealState, KeyShareSet, SealOutcome, SealStateMachine};

/// Inputs for the auto-unseal sidecar.
#[derive(Debug, Clone)]
pub struct AutoUnsealSettings {
    pub keys_file: PathBuf,
    pub required_shares: usize,
    pub probe_attempts: u32,
    pub probe_delay: Duration,
    pub park_interval: Duration,
}

/// Sidecar that unseals a restarted store from an existing keys file.
///
/// It never initializes a cluster. Once unsealed it parks; a later re-seal
/// needs a restart of the sidecar.
#[derive(Debug)]
pub struct AutoUnsealDaemon<'a> {
    client: &'a OpenBaoClient,
    settings: AutoUnsealSettings,
}

impl<'a> AutoUnsealDaemon<'a> {
    #[must_use]
    pub fn new(client: &'a OpenBaoClient, settings: AutoUnsealSettings) -> Self {
        Self { client, settings }
    }

    /// Loads the shares, waits for the store and unseals it.
    ///
    /// The keys file is read before any network call, so a missing file
    /// fails without touching the store.
    ///
    /// # Errors
    /// Returns [`BootstrapError::NotInitialized`] for a missing keys file or
    /// an uninitialized store, [`BootstrapError::StoreUnreachable`] when the
    /// probe is exhausted, and the unseal errors of [`SealStateMachine`].
    pub async fn recover(&self) -> Result<SealOutcome> {
        let shares = KeyShareSet::load(&self.settings.keys_file).await?;
        info!(
            "Loaded {} key share(s) from {}",
            shares.len(),
            self.settings.keys_file.display()
        );

        let report = HealthProbe::new(
            self.client,
            self.settings.probe_attempts,
            self.settings.probe_delay,
        )
        .poll(ProbeTarget::Reachable)
        .await?;
        if report.state() == Some(ClusterSealState::Uninitialized) {
            return Err(BootstrapError::not_initialized(
                "store is reachable but has never been initialized; the unsealer does not initialize",
            ));
        }

        SealStateMachine::new(self.client)
            .unseal(&shares, self.settings.required_shares)
            .await
    }

    /// Recovers, then parks until a termination signal arrives.
    ///
    /// # Errors
    /// Returns the recovery error, or an error if signal handlers cannot be
    /// installed.
    pub async fn run(&self) -> anyhow::Result<()> {
        log_outcome(&self.recover().await?);
        info!(
            "Parking; restart the unsealer to recover from a later re-seal (interval={:?})",
            self.settings.park_interval
        );
        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    if let Err(err) = result {
                        error!("Shutdown signal handler error: {err}");
                        return Err(err);
                    }
                    info!("Shutdown signal received. Exiting unsealer.");
                    return Ok(());
                }
                () = tokio::time::sleep(self.settings.park_interval) => {
                    debug!("Unsealer parked");
                }
            }
        }
    }
}

pub fn log_outcome(outcome: &SealOutcome) {
    match outcome {
        SealOutcome::AlreadyUnsealed => info!("Store was already unsealed"),
        SealOutcome::Unsealed { submitted } => {
            info!("Store unsealed ({submitted} share(s) submitted)");
        }
    }
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {e}"))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| anyhow::anyhow!("Failed to listen for Ctrl+C: {e}"))?;
        }
        _ = term.recv() => {}
    }
    Ok(())
}
