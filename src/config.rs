use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::certs::CertPaths;
use crate::render::{ServiceKind, TlsRequirement};
use crate::utils::parse_duration;

mod defaults;
mod validation;

pub use defaults::DEFAULT_CONFIG_FILE;

const ENV_PREFIX: &str = "VAULTBOOT";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub openbao: OpenBaoSettings,
    pub probe: ProbeSettings,
    pub auth: AuthSettings,
    pub service: ServiceSettings,
    pub tls: TlsSettings,
    pub unseal: UnsealSettings,
    pub init: InitSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenBaoSettings {
    pub addr: String,
    pub kv_mount: String,
    pub pki_mount: String,
    pub request_timeout: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeSettings {
    pub attempts: u32,
    pub delay: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    #[serde(rename = "approle")]
    #[value(name = "approle")]
    AppRole,
    /// Full-access root token; kept for legacy deployments.
    RootToken,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub mode: AuthMode,
    pub role_id_file: PathBuf,
    pub secret_id_file: PathBuf,
    pub root_token_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSettings {
    /// Secret identity, e.g. `postgres` or `reference-api`.
    pub identity: String,
    pub kind: ServiceKind,
    pub config_dir: PathBuf,
    /// Fields required on top of the kind's own.
    pub required_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertSource {
    /// Certificates are mounted by the operator and only checked.
    Validate,
    /// Certificates are issued from the PKI mount at startup.
    Issue,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsSettings {
    pub requirement: TlsRequirement,
    pub source: CertSource,
    pub cert_dir: PathBuf,
    pub cert_file: String,
    pub key_file: String,
    pub ca_file: String,
    pub pki_role: String,
    pub common_name: Option<String>,
    pub alt_names: Vec<String>,
    pub ip_sans: Vec<String>,
    pub ttl: String,
}

impl TlsSettings {
    #[must_use]
    pub fn cert_paths(&self, identity: &str) -> CertPaths {
        CertPaths::in_dir(
            &self.cert_dir.join(identity),
            &self.cert_file,
            &self.key_file,
            &self.ca_file,
        )
    }

    /// Common name for issued certificates, the identity when unset.
    #[must_use]
    pub fn common_name_for<'a>(&'a self, identity: &'a str) -> &'a str {
        self.common_name.as_deref().unwrap_or(identity)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UnsealSettings {
    pub keys_file: PathBuf,
    /// Used when the store does not report its threshold.
    pub required_shares: u32,
    pub park_interval: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InitSettings {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    pub keys_file: PathBuf,
    pub root_token_file: PathBuf,
}

/// CLI values that take precedence over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub addr: Option<String>,
    pub identity: Option<String>,
    pub keys_file: Option<PathBuf>,
}

impl Settings {
    /// Loads defaults, then the TOML file, then `VAULTBOOT__*` variables.
    ///
    /// # Errors
    /// Returns error if configuration parsing fails (e.g. invalid format).
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let builder = defaults::apply_defaults(Config::builder())?;
        let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        builder
            .add_source(File::from(path).required(false))
            // e.g. VAULTBOOT__OPENBAO__ADDR, VAULTBOOT__SERVICE__IDENTITY
            .add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?
            .try_deserialize()
    }

    /// Merges CLI arguments into the settings, overriding values if present.
    pub fn merge_with_args(&mut self, overrides: &Overrides) {
        if let Some(addr) = &overrides.addr {
            addr.clone_into(&mut self.openbao.addr);
        }
        if let Some(identity) = &overrides.identity {
            identity.clone_into(&mut self.service.identity);
        }
        if let Some(keys_file) = &overrides.keys_file {
            keys_file.clone_into(&mut self.unseal.keys_file);
        }
    }

    /// Validates configuration values for correctness.
    ///
    /// # Errors
    /// Returns error if any setting is invalid or out of range.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }

    /// Like [`Settings::validate`], plus what the entrypoint needs.
    ///
    /// # Errors
    /// Returns error if the service section is incomplete.
    pub fn validate_for_service(&self) -> Result<()> {
        self.validate()?;
        validation::validate_service(&self.service)
    }

    /// # Errors
    /// Returns error if the duration does not parse.
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.openbao.request_timeout, "openbao.request_timeout")
    }

    /// # Errors
    /// Returns error if the duration does not parse.
    pub fn probe_delay(&self) -> Result<Duration> {
        parse_duration(&self.probe.delay, "probe.delay")
    }

    /// # Errors
    /// Returns error if the duration does not parse.
    pub fn park_interval(&self) -> Result<Duration> {
        parse_duration(&self.unseal.park_interval, "unseal.park_interval")
    }

    /// # Errors
    /// Returns error if the duration does not parse.
    pub fn cert_ttl(&self) -> Result<Duration> {
        parse_duration(&self.tls.ttl, "tls.ttl")
    }
}
