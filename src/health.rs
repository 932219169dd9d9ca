use std::cell::Cell;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{BootstrapError, Result};
use crate::openbao::{HealthStatus, OpenBaoClient};
use crate::seal::ClusterSealState;
use crate::utils::poll_with_fixed_delay;

/// What the probe waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    /// Any HTTP answer; uninitialized and sealed stores count.
    Reachable,
    /// An initialized, unsealed store.
    Unsealed,
}

/// Observation returned once the probe is satisfied.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub initialized: Option<bool>,
    pub sealed: Option<bool>,
    pub version: Option<String>,
    pub attempts: u32,
}

impl HealthReport {
    fn from_status(status: HealthStatus, attempts: u32) -> Self {
        Self {
            initialized: status.initialized,
            sealed: status.sealed,
            version: status.version,
            attempts,
        }
    }

    /// Seal state implied by the health body, when it said enough.
    #[must_use]
    pub fn state(&self) -> Option<ClusterSealState> {
        match (self.initialized, self.sealed) {
            (Some(false), _) => Some(ClusterSealState::Uninitialized),
            (_, Some(true)) => Some(ClusterSealState::Sealed),
            (Some(true), Some(false)) => Some(ClusterSealState::Unsealed),
            _ => None,
        }
    }
}

/// Bounded poller over `sys/health`.
#[derive(Debug, Clone)]
pub struct HealthProbe<'a> {
    client: &'a OpenBaoClient,
    attempts: u32,
    delay: Duration,
}

impl<'a> HealthProbe<'a> {
    #[must_use]
    pub fn new(client: &'a OpenBaoClient, attempts: u32, delay: Duration) -> Self {
        Self {
            client,
            attempts,
            delay,
        }
    }

    /// Polls until `target` is met.
    ///
    /// # Errors
    /// Once the attempt bound is exhausted, returns
    /// [`BootstrapError::StoreUnreachable`] if no attempt got an HTTP answer,
    /// [`BootstrapError::NotInitialized`] if the store last reported itself
    /// uninitialized, and [`BootstrapError::StoreNotReady`] otherwise.
    pub async fn poll(&self, target: ProbeTarget) -> Result<HealthReport> {
        self.poll_with_sleep(target, tokio::time::sleep).await
    }

    pub(crate) async fn poll_with_sleep<S, SFut>(
        &self,
        target: ProbeTarget,
        sleep_fn: S,
    ) -> Result<HealthReport>
    where
        S: FnMut(Duration) -> SFut,
        SFut: std::future::Future<Output = ()>,
    {
        info!(
            "Waiting for secret store at {} (target={target:?}, attempts={}, delay={:?})",
            self.client.addr(),
            self.attempts,
            self.delay
        );
        let attempts = self.attempts.max(1);
        // Last answered observation, kept across transport failures.
        let answered: Cell<Option<Option<ClusterSealState>>> = Cell::new(None);
        let answered_ref = &answered;
        let outcome = poll_with_fixed_delay(
            attempts,
            self.delay,
            |attempt| async move {
                match self.client.health().await {
                    Ok(status) => {
                        let report = HealthReport::from_status(status, attempt);
                        let ready = target == ProbeTarget::Reachable
                            || report.state() == Some(ClusterSealState::Unsealed);
                        if ready {
                            Ok(report)
                        } else {
                            answered_ref.set(Some(report.state()));
                            let observed = describe(&report);
                            debug!(
                                "Secret store not ready (attempt {attempt}/{attempts}): {observed}"
                            );
                            Err(observed)
                        }
                    }
                    Err(err) => {
                        debug!("Secret store probe failed (attempt {attempt}/{attempts}): {err}");
                        Err(err.to_string())
                    }
                }
            },
            sleep_fn,
        )
        .await;

        match outcome {
            Ok(report) => {
                info!(
                    "Secret store reachable after {} attempt(s) (state={})",
                    report.attempts,
                    describe(&report)
                );
                Ok(report)
            }
            Err(last) => {
                warn!("Secret store probe exhausted after {attempts} attempt(s)");
                let addr = self.client.addr().to_string();
                Err(match answered.get() {
                    None => BootstrapError::StoreUnreachable {
                        addr,
                        attempts,
                        last,
                    },
                    Some(Some(ClusterSealState::Uninitialized)) => {
                        BootstrapError::not_initialized(format!(
                            "store at {addr} still uninitialized after {attempts} attempt(s); \
                             run `vaultboot init`"
                        ))
                    }
                    Some(state) => BootstrapError::StoreNotReady {
                        addr,
                        attempts,
                        state: state.map_or_else(
                            || "unknown (health body not understood)".to_string(),
                            |state| state.as_str().to_string(),
                        ),
                    },
                })
            }
        }
    }
}

fn describe(report: &HealthReport) -> String {
    match report.state() {
        Some(state) => state.as_str().to_string(),
        None => "unknown (health body not understood)".to_string(),
    }
}
