use anyhow::Result;
use vaultboot::auth::read_root_token_file;
use vaultboot::config::Settings;

use crate::cli::args::TokenArgs;

pub(crate) async fn run_token(settings: &Settings, args: &TokenArgs) -> Result<()> {
    let path = args
        .root_token_file
        .as_deref()
        .unwrap_or(&settings.auth.root_token_file);
    let token = read_root_token_file(path).await?;
    println!("{token}");
    Ok(())
}
