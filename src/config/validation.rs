use anyhow::Result;

use super::{ServiceSettings, Settings, TlsSettings};
use crate::utils::parse_duration;

/// Store limit on key shares.
const MAX_SECRET_SHARES: u32 = 255;

pub(crate) fn validate_settings(settings: &Settings) -> Result<()> {
    let addr = settings.openbao.addr.trim();
    if addr.is_empty() {
        anyhow::bail!("openbao.addr must not be empty");
    }
    if !addr.starts_with("http://") && !addr.starts_with("https://") {
        anyhow::bail!("openbao.addr must start with http:// or https://");
    }
    validate_mount(&settings.openbao.kv_mount, "openbao.kv_mount")?;
    validate_mount(&settings.openbao.pki_mount, "openbao.pki_mount")?;
    parse_duration(&settings.openbao.request_timeout, "openbao.request_timeout")?;
    if settings.probe.attempts == 0 {
        anyhow::bail!("probe.attempts must be greater than 0");
    }
    parse_duration(&settings.probe.delay, "probe.delay")?;
    validate_tls(&settings.tls)?;
    if settings.unseal.keys_file.as_os_str().is_empty() {
        anyhow::bail!("unseal.keys_file must not be empty");
    }
    if settings.unseal.required_shares == 0 {
        anyhow::bail!("unseal.required_shares must be greater than 0");
    }
    if parse_duration(&settings.unseal.park_interval, "unseal.park_interval")?.is_zero() {
        anyhow::bail!("unseal.park_interval must be greater than 0");
    }
    let init = &settings.init;
    if init.secret_shares == 0 || init.secret_shares > MAX_SECRET_SHARES {
        anyhow::bail!("init.secret_shares must be between 1 and {MAX_SECRET_SHARES}");
    }
    if init.secret_threshold == 0 || init.secret_threshold > init.secret_shares {
        anyhow::bail!("init.secret_threshold must be between 1 and init.secret_shares");
    }
    Ok(())
}

pub(crate) fn validate_service(service: &ServiceSettings) -> Result<()> {
    let identity = service.identity.trim();
    if identity.is_empty() {
        anyhow::bail!("service.identity must not be empty");
    }
    if identity.contains("..") || identity.starts_with('/') {
        anyhow::bail!("service.identity must be a relative path without '..'");
    }
    if service.config_dir.as_os_str().is_empty() {
        anyhow::bail!("service.config_dir must not be empty");
    }
    if service
        .required_fields
        .iter()
        .any(|field| field.trim().is_empty())
    {
        anyhow::bail!("service.required_fields entries must not be empty");
    }
    Ok(())
}

fn validate_tls(tls: &TlsSettings) -> Result<()> {
    if tls.cert_dir.as_os_str().is_empty() {
        anyhow::bail!("tls.cert_dir must not be empty");
    }
    for (value, label) in [
        (&tls.cert_file, "tls.cert_file"),
        (&tls.key_file, "tls.key_file"),
        (&tls.ca_file, "tls.ca_file"),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{label} must not be empty");
        }
    }
    if tls.pki_role.trim().is_empty() {
        anyhow::bail!("tls.pki_role must not be empty");
    }
    if let Some(common_name) = &tls.common_name
        && common_name.trim().is_empty()
    {
        anyhow::bail!("tls.common_name must not be empty when set");
    }
    if parse_duration(&tls.ttl, "tls.ttl")?.is_zero() {
        anyhow::bail!("tls.ttl must be greater than 0");
    }
    Ok(())
}

fn validate_mount(value: &str, label: &str) -> Result<()> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("{label} must not be empty");
    }
    if trimmed.contains("..") {
        anyhow::bail!("{label} must not contain '..'");
    }
    Ok(())
}
