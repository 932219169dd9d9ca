use anyhow::{Context, Result};
use vaultboot::auth::{self, AppRoleCredential, BearerSession, ROOT_TOKEN_ENV};
use vaultboot::config::{AuthMode, Settings};
use vaultboot::openbao::OpenBaoClient;

pub(crate) mod cert;
pub(crate) mod init;
pub(crate) mod secret;
pub(crate) mod status;
pub(crate) mod token;
pub(crate) mod unseal;

pub(crate) fn build_client(settings: &Settings) -> Result<OpenBaoClient> {
    OpenBaoClient::new(&settings.openbao.addr, settings.request_timeout()?)
        .with_context(|| format!("Failed to create client for {}", settings.openbao.addr))
}

/// Authenticates with the configured mode unless `mode` overrides it.
pub(crate) async fn open_session(
    client: &OpenBaoClient,
    settings: &Settings,
    mode: Option<AuthMode>,
) -> Result<BearerSession> {
    let auth = &settings.auth;
    let session = match mode.unwrap_or(auth.mode) {
        AuthMode::AppRole => {
            let credential =
                AppRoleCredential::from_files(&auth.role_id_file, &auth.secret_id_file).await?;
            auth::login(client, &credential).await?
        }
        AuthMode::RootToken => {
            let (session, _) = auth::load_root_token(
                std::env::var(ROOT_TOKEN_ENV).ok(),
                Some(&auth.root_token_file),
            )
            .await?;
            session
        }
    };
    Ok(session)
}
