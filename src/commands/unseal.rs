use std::path::Path;

use anyhow::Result;
use vaultboot::config::Settings;
use vaultboot::seal::{KeyShareSet, SealStateMachine};

use crate::cli::args::UnsealArgs;
use crate::cli::output::print_unseal_outcome;
use crate::commands::build_client;

pub(crate) async fn run_unseal(settings: &Settings, args: &UnsealArgs) -> Result<()> {
    let keys_file: &Path = args
        .keys_file
        .as_deref()
        .unwrap_or(&settings.unseal.keys_file);
    let shares = KeyShareSet::load(keys_file).await?;
    let client = build_client(settings)?;
    let outcome = SealStateMachine::new(&client)
        .unseal(&shares, usize::try_from(settings.unseal.required_shares)?)
        .await?;
    print_unseal_outcome(&outcome);
    Ok(())
}
