use anyhow::{Context, Result};
use clap::Parser;
use vaultboot::config::Settings;
use vaultboot::utils::init_tracing;

mod cli;
mod commands;

use crate::cli::args::{Cli, CliCommand};

fn main() {
    if let Err(err) = run() {
        eprintln!("vaultboot error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut settings = Settings::new(cli.config.clone())?;
    settings.merge_with_args(&cli.overrides());
    settings.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to initialize async runtime")?;
    runtime.block_on(async {
        match &cli.command {
            CliCommand::Init(args) => commands::init::run_init(&settings, args).await,
            CliCommand::Unseal(args) => commands::unseal::run_unseal(&settings, args).await,
            CliCommand::Status => commands::status::run_status(&settings).await,
            CliCommand::Token(args) => commands::token::run_token(&settings, args).await,
            CliCommand::ShowSecret(args) => {
                commands::secret::run_show_secret(&settings, args).await
            }
            CliCommand::CaCert => commands::cert::run_ca_cert(&settings).await,
            CliCommand::IssueCert(args) => commands::cert::run_issue_cert(&settings, args).await,
        }
    })
}
