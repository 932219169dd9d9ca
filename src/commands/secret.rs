use anyhow::Result;
use vaultboot::config::Settings;
use vaultboot::secrets::{self, SecretSchema};

use crate::cli::args::ShowSecretArgs;
use crate::cli::output::{display_secret, print_bundle};
use crate::commands::{build_client, open_session};

pub(crate) async fn run_show_secret(settings: &Settings, args: &ShowSecretArgs) -> Result<()> {
    let client = build_client(settings)?;
    let session = open_session(&client, settings, args.auth.auth_mode).await?;
    let required: Vec<String> = args.field.iter().cloned().collect();
    let bundle = secrets::fetch(
        &client,
        &session,
        &settings.openbao.kv_mount,
        &args.identity,
        &SecretSchema::new(required),
    )
    .await?;

    match &args.field {
        Some(field) => {
            let value = bundle
                .get(field)
                .ok_or_else(|| anyhow::anyhow!("{}.{field} is not set", args.identity))?;
            println!("{}", display_secret(value, args.show_secrets));
        }
        None => print_bundle(&bundle, args.show_secrets),
    }
    Ok(())
}
