use anyhow::{Context, Result};
use tracing::info;
use vaultboot::config::Settings;
use vaultboot::health::{HealthProbe, ProbeTarget};
use vaultboot::init::{InitOutcome, InitPaths, ThresholdInitializer};
use vaultboot::seal::{KeyShareSet, SealStateMachine};

use crate::cli::args::InitArgs;
use crate::cli::output::{InitSummary, print_init_summary, print_unseal_outcome};
use crate::commands::build_client;

pub(crate) async fn run_init(settings: &Settings, args: &InitArgs) -> Result<()> {
    let shares = match args.secret_shares {
        Some(value) => value,
        None => u8::try_from(settings.init.secret_shares)
            .context("init.secret_shares must be at most 255")?,
    };
    let threshold = match args.secret_threshold {
        Some(value) => value,
        None => u8::try_from(settings.init.secret_threshold)
            .context("init.secret_threshold must be at most 255")?,
    };
    let paths = InitPaths {
        keys_file: args
            .keys_file
            .clone()
            .unwrap_or_else(|| settings.init.keys_file.clone()),
        root_token_file: args
            .root_token_file
            .clone()
            .unwrap_or_else(|| settings.init.root_token_file.clone()),
    };

    let client = build_client(settings)?;
    HealthProbe::new(&client, settings.probe.attempts, settings.probe_delay()?)
        .poll(ProbeTarget::Reachable)
        .await?;

    let shares_set = match ThresholdInitializer::new(&client)
        .initialize(threshold, shares, &paths)
        .await?
    {
        InitOutcome::Initialized(set) => {
            print_init_summary(&InitSummary {
                addr: client.addr(),
                shares: &set,
                threshold,
                keys_file: &paths.keys_file,
                root_token_file: &paths.root_token_file,
                show_secrets: args.show_secrets,
            });
            set
        }
        InitOutcome::AlreadyInitialized => {
            println!("Secret store at {} is already initialized", client.addr());
            if args.no_unseal {
                return Ok(());
            }
            if !paths.keys_file.exists() {
                println!(
                    "No keys file at {}; unseal manually with `vaultboot unseal --keys-file <path>`",
                    paths.keys_file.display()
                );
                return Ok(());
            }
            KeyShareSet::load(&paths.keys_file).await?
        }
    };
    if args.no_unseal {
        return Ok(());
    }

    info!("Unsealing with shares from {}", paths.keys_file.display());
    let outcome = SealStateMachine::new(&client)
        .unseal(&shares_set, usize::from(threshold))
        .await?;
    print_unseal_outcome(&outcome);
    Ok(())
}
