use anyhow::Context;
use clap::Parser;
use vaultboot::UnsealerArgs;
use vaultboot::config::Settings;
use vaultboot::daemon::{AutoUnsealDaemon, AutoUnsealSettings, log_outcome};
use vaultboot::openbao::OpenBaoClient;
use vaultboot::utils::init_tracing;

fn main() {
    init_tracing();
    let args = UnsealerArgs::parse();
    if let Err(err) = run(&args) {
        eprintln!("vaultboot-unsealer error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &UnsealerArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to initialize async runtime")?;
    runtime.block_on(run_unsealer(args))
}

async fn run_unsealer(args: &UnsealerArgs) -> anyhow::Result<()> {
    let mut settings = Settings::new(args.config.clone())?;
    settings.merge_with_args(&args.overrides());
    settings.validate()?;

    let client = OpenBaoClient::new(&settings.openbao.addr, settings.request_timeout()?)?;
    let daemon = AutoUnsealDaemon::new(
        &client,
        AutoUnsealSettings {
            keys_file: settings.unseal.keys_file.clone(),
            required_shares: usize::try_from(settings.unseal.required_shares)?,
            probe_attempts: settings.probe.attempts,
            probe_delay: settings.probe_delay()?,
            park_interval: settings.park_interval()?,
        },
    );
    if args.oneshot {
        log_outcome(&daemon.recover().await?);
        return Ok(());
    }
    daemon.run().await
}
