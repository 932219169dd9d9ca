use anyhow::Result;
use tracing::warn;
use vaultboot::config::Settings;
use vaultboot::health::{HealthProbe, ProbeTarget};
use vaultboot::seal::SealStateMachine;

use crate::cli::output::print_status;
use crate::commands::build_client;

pub(crate) async fn run_status(settings: &Settings) -> Result<()> {
    let client = build_client(settings)?;
    // One look, no waiting.
    let report = HealthProbe::new(&client, 1, settings.probe_delay()?)
        .poll(ProbeTarget::Reachable)
        .await?;
    let seal = match SealStateMachine::new(&client).state().await {
        Ok(state) => Some(state),
        Err(err) => {
            warn!("Seal status unavailable: {err}");
            None
        }
    };
    print_status(client.addr(), &report, seal.as_ref());
    Ok(())
}
