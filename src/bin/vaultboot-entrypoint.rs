use anyhow::Context;
use clap::Parser;
use tracing::info;
use vaultboot::EntrypointArgs;
use vaultboot::auth::ROOT_TOKEN_ENV;
use vaultboot::config::Settings;
use vaultboot::openbao::OpenBaoClient;
use vaultboot::orchestrator::{BootstrapOrchestrator, HandoffPlan, exec_handoff};
use vaultboot::utils::init_tracing;

fn main() {
    init_tracing();
    let args = EntrypointArgs::parse();
    if let Err(err) = run(&args) {
        eprintln!("vaultboot-entrypoint error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &EntrypointArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to initialize async runtime")?;
    let plan = runtime.block_on(prepare(args))?;
    drop(runtime);
    Err(exec_handoff(&plan).into())
}

async fn prepare(args: &EntrypointArgs) -> anyhow::Result<HandoffPlan> {
    let mut settings = Settings::new(args.config.clone())?;
    settings.merge_with_args(&args.overrides());
    settings.validate_for_service()?;
    info!(
        "Bootstrapping {} ({:?}) against {}",
        settings.service.identity, settings.service.kind, settings.openbao.addr
    );

    let client = OpenBaoClient::new(&settings.openbao.addr, settings.request_timeout()?)?;
    let plan = BootstrapOrchestrator::new(&client, &settings)?
        .with_root_token_env(std::env::var(ROOT_TOKEN_ENV).ok())
        .prepare(&args.command)
        .await?;
    Ok(plan)
}
