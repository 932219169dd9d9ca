pub mod args;
pub mod auth;
pub mod certs;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fs_util;
pub mod health;
pub mod init;
pub mod openbao;
pub mod orchestrator;
pub mod render;
pub mod secrets;
pub mod seal;
pub mod utils;

pub use args::{EntrypointArgs, UnsealerArgs};
pub use error::{BootstrapError, Stage, StageError};
