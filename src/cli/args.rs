use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vaultboot::config::{AuthMode, Overrides};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Path to configuration file (default: vaultboot.toml)
    #[arg(long, short, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Secret store address
    #[arg(long, env = "VAULT_ADDR", global = true)]
    pub(crate) addr: Option<String>,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

impl Cli {
    pub(crate) fn overrides(&self) -> Overrides {
        Overrides {
            addr: self.addr.clone(),
            ..Overrides::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Initialize the store with threshold key shares, then unseal it
    Init(InitArgs),
    /// Unseal the store from the keys file
    Unseal(UnsealArgs),
    /// Show reachability and seal status
    Status,
    /// Print the root token from its owner-only file
    Token(TokenArgs),
    /// Read a service's secret bundle
    ShowSecret(ShowSecretArgs),
    /// Print the PKI CA chain
    CaCert,
    /// Issue a certificate bundle for a service and write it to disk
    IssueCert(IssueCertArgs),
}

#[derive(Args, Debug)]
pub(crate) struct InitArgs {
    /// Number of key shares (default: init.secret_shares)
    #[arg(long)]
    pub(crate) secret_shares: Option<u8>,

    /// Shares needed to unseal (default: init.secret_threshold)
    #[arg(long)]
    pub(crate) secret_threshold: Option<u8>,

    /// Where to write the init response
    #[arg(long)]
    pub(crate) keys_file: Option<PathBuf>,

    /// Where to write the root token
    #[arg(long)]
    pub(crate) root_token_file: Option<PathBuf>,

    /// Stop after initialization
    #[arg(long)]
    pub(crate) no_unseal: bool,

    /// Print key shares and root token unmasked
    #[arg(long)]
    pub(crate) show_secrets: bool,
}

#[derive(Args, Debug)]
pub(crate) struct UnsealArgs {
    /// Keys file written at initialization (default: unseal.keys_file)
    #[arg(long)]
    pub(crate) keys_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct TokenArgs {
    /// Root token file (default: auth.root_token_file)
    #[arg(long)]
    pub(crate) root_token_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AuthArgs {
    /// How to authenticate (default: auth.mode)
    #[arg(long, value_enum)]
    pub(crate) auth_mode: Option<AuthMode>,
}

#[derive(Args, Debug)]
pub(crate) struct ShowSecretArgs {
    /// Service identity, e.g. postgres
    pub(crate) identity: String,

    /// Print only this field
    #[arg(long)]
    pub(crate) field: Option<String>,

    /// Print values unmasked
    #[arg(long)]
    pub(crate) show_secrets: bool,

    #[command(flatten)]
    pub(crate) auth: AuthArgs,
}

#[derive(Args, Debug)]
pub(crate) struct IssueCertArgs {
    /// Service identity, e.g. postgres
    pub(crate) identity: String,

    /// Certificate common name (default: tls.common_name or the identity)
    #[arg(long)]
    pub(crate) common_name: Option<String>,

    /// Comma-separated DNS subject alternative names
    #[arg(long, value_delimiter = ',')]
    pub(crate) alt_names: Vec<String>,

    /// Comma-separated IP subject alternative names
    #[arg(long, value_delimiter = ',')]
    pub(crate) ip_sans: Vec<String>,

    /// Certificate lifetime (default: tls.ttl)
    #[arg(long)]
    pub(crate) ttl: Option<String>,

    /// Output directory (default: <tls.cert_dir>/<identity>)
    #[arg(long)]
    pub(crate) out_dir: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) auth: AuthArgs,
}
