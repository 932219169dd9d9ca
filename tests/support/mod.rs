// Helper functions are shared across multiple test crates; not every helper is
// referenced in each test module.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rcgen::{CertificateParams, DnType, KeyPair};
use serde_json::{Value, json};
use vaultboot::config::Settings;
use vaultboot::openbao::OpenBaoClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const ROOT_TOKEN: &str = "s.root-token";
pub(crate) const CLIENT_TOKEN: &str = "s.approle-token";
pub(crate) const ROLE_ID: &str = "role-123";
pub(crate) const SECRET_ID: &str = "secret-456";

/// Five well-formed 33-byte Shamir shares.
pub(crate) const SHARES: [&str; 5] = [
    "AQABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f",
    "AgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUm",
    "Aw4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYnKCkqKywt",
    "BBUWFxgZGhscHR4fICEiIyQlJicoKSorLC0uLzAxMjM0",
    "BRwdHh8gISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7",
];

pub(crate) fn client(server: &MockServer) -> OpenBaoClient {
    OpenBaoClient::new(&server.uri(), Duration::from_secs(5)).expect("client")
}

pub(crate) fn init_response(shares: &[&str]) -> Value {
    json!({
        "keys": shares,
        "keys_base64": shares,
        "root_token": ROOT_TOKEN,
    })
}

pub(crate) fn seal_status(sealed: bool, progress: u32) -> Value {
    seal_status_with(sealed, progress, 3, 5)
}

pub(crate) fn seal_status_with(
    sealed: bool,
    progress: u32,
    threshold: u32,
    shares: u32,
) -> Value {
    json!({
        "type": "shamir",
        "initialized": true,
        "sealed": sealed,
        "t": threshold,
        "n": shares,
        "progress": progress,
    })
}

pub(crate) async fn mount_health(server: &MockServer, initialized: bool, sealed: bool) {
    let status = match (initialized, sealed) {
        (false, _) => 501,
        (true, true) => 503,
        (true, false) => 200,
    };
    Mock::given(method("GET"))
        .and(path("/v1/sys/health"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "initialized": initialized,
            "sealed": sealed,
            "version": "2.1.0",
        })))
        .mount(server)
        .await;
}

pub(crate) async fn mount_approle_login(server: &MockServer, token: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {
                "client_token": token,
                "lease_duration": 3600,
                "policies": ["default", "service-read"],
            }
        })))
        .mount(server)
        .await;
}

pub(crate) fn write_approle_files(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let approle = dir.join("approle");
    fs::create_dir_all(&approle).context("Failed to create approle dir")?;
    let role = approle.join("role_id");
    let secret = approle.join("secret_id");
    fs::write(&role, format!("{ROLE_ID}\n")).context("Failed to write role_id")?;
    fs::write(&secret, format!("{SECRET_ID}\n")).context("Failed to write secret_id")?;
    Ok((role, secret))
}

pub(crate) fn write_owner_only(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).context("Failed to write file")?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .context("Failed to set permissions")?;
    Ok(())
}

/// Settings pointed at `server` with every path under `root` and a short probe.
pub(crate) fn settings_for(server: &MockServer, root: &Path, identity: &str) -> Result<Settings> {
    let mut settings = Settings::new(Some(root.join("absent.toml")))?;
    let (role, secret) = write_approle_files(root)?;
    settings.openbao.addr = server.uri();
    settings.probe.attempts = 3;
    settings.probe.delay = "10ms".to_string();
    settings.auth.role_id_file = role;
    settings.auth.secret_id_file = secret;
    settings.auth.root_token_file = root.join("root-token");
    settings.service.identity = identity.to_string();
    settings.service.config_dir = root.join("config");
    settings.tls.cert_dir = root.join("certs");
    settings.unseal.keys_file = root.join("init").join("keys.json");
    settings.init.keys_file = root.join("init").join("keys.json");
    settings.init.root_token_file = root.join("init").join("root-token");
    Ok(settings)
}

/// Self-signed certificate and key PEM for `common_name`.
pub(crate) fn self_signed(common_name: &str) -> Result<(String, String)> {
    let mut params = CertificateParams::new(vec![common_name.to_string()])
        .context("Failed to build certificate params")?;
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let key = KeyPair::generate().context("Failed to generate key")?;
    let cert = params
        .self_signed(&key)
        .context("Failed to self-sign certificate")?;
    Ok((cert.pem(), key.serialize_pem()))
}
