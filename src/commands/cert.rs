use anyhow::Result;
use vaultboot::certs::{self, CertPaths};
use vaultboot::config::Settings;
use vaultboot::openbao::IssueRequest;

use crate::cli::args::IssueCertArgs;
use crate::commands::{build_client, open_session};

pub(crate) async fn run_ca_cert(settings: &Settings) -> Result<()> {
    let client = build_client(settings)?;
    let chain = client.ca_chain(&settings.openbao.pki_mount).await?;
    println!("{}", chain.trim_end());
    Ok(())
}

pub(crate) async fn run_issue_cert(settings: &Settings, args: &IssueCertArgs) -> Result<()> {
    let tls = &settings.tls;
    let paths = match &args.out_dir {
        Some(dir) => CertPaths::in_dir(dir, &tls.cert_file, &tls.key_file, &tls.ca_file),
        None => tls.cert_paths(&args.identity),
    };
    let alt_names = if args.alt_names.is_empty() {
        &tls.alt_names
    } else {
        &args.alt_names
    };
    let ip_sans = if args.ip_sans.is_empty() {
        &tls.ip_sans
    } else {
        &args.ip_sans
    };
    let request = IssueRequest {
        common_name: args
            .common_name
            .clone()
            .unwrap_or_else(|| tls.common_name_for(&args.identity).to_string()),
        alt_names: alt_names.join(","),
        ip_sans: ip_sans.join(","),
        ttl: args.ttl.clone().unwrap_or_else(|| tls.ttl.clone()),
    };

    let client = build_client(settings)?;
    let session = open_session(&client, settings, args.auth.auth_mode).await?;
    let bundle = certs::issue(
        &client,
        &session,
        &settings.openbao.pki_mount,
        &tls.pki_role,
        &request,
    )
    .await?;
    certs::persist(&bundle, &paths, &args.identity).await?;
    let validated = certs::validate_bundle(&paths, "re-run issue-cert").await?;

    println!("Issued certificate for {}", request.common_name);
    println!("  certificate: {}", paths.cert.display());
    println!("  private key: {}", paths.key.display());
    println!("  CA chain: {}", paths.ca.display());
    if let Some(not_after) = validated.not_after {
        println!("  expires: {not_after}");
    }
    if let Some(fingerprint) = validated.fingerprint {
        println!("  sha256: {fingerprint}");
    }
    Ok(())
}
