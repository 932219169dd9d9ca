use std::path::PathBuf;

use clap::Parser;

use crate::config::Overrides;

/// Bootstraps one service from the secret store, then execs it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct EntrypointArgs {
    /// Path to configuration file (default: vaultboot.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Secret store address
    #[arg(long, env = "VAULT_ADDR")]
    pub addr: Option<String>,

    /// Service identity to bootstrap (e.g. postgres)
    #[arg(long, env = "VAULTBOOT_IDENTITY")]
    pub identity: Option<String>,

    /// Service program and its arguments, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl EntrypointArgs {
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            addr: self.addr.clone(),
            identity: self.identity.clone(),
            keys_file: None,
        }
    }
}

/// Unseals a restarted secret store from its keys file and stays resident.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct UnsealerArgs {
    /// Path to configuration file (default: vaultboot.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Secret store address
    #[arg(long, env = "VAULT_ADDR")]
    pub addr: Option<String>,

    /// Keys file written at initialization
    #[arg(long)]
    pub keys_file: Option<PathBuf>,

    /// Unseal once and exit instead of parking
    #[arg(long)]
    pub oneshot: bool,
}

impl UnsealerArgs {
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            addr: self.addr.clone(),
            identity: None,
            keys_file: self.keys_file.clone(),
        }
    }
}
