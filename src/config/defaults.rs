use config::{ConfigBuilder, ConfigError, builder::DefaultState};

pub const DEFAULT_CONFIG_FILE: &str = "vaultboot.toml";

const DEFAULT_OPENBAO_ADDR: &str = "http://127.0.0.1:8200";
const DEFAULT_KV_MOUNT: &str = "secret";
const DEFAULT_PKI_MOUNT: &str = "pki_int";
const DEFAULT_REQUEST_TIMEOUT: &str = "10s";
const DEFAULT_PROBE_ATTEMPTS: u32 = 60;
const DEFAULT_PROBE_DELAY: &str = "2s";
const DEFAULT_AUTH_MODE: &str = "approle";
const DEFAULT_ROLE_ID_FILE: &str = "/run/vaultboot/approle/role_id";
const DEFAULT_SECRET_ID_FILE: &str = "/run/vaultboot/approle/secret_id";
const DEFAULT_SERVICE_KIND: &str = "generic";
const DEFAULT_SERVICE_CONFIG_DIR: &str = "/run/vaultboot/config";
const DEFAULT_TLS_REQUIREMENT: &str = "required";
const DEFAULT_TLS_SOURCE: &str = "validate";
const DEFAULT_CERT_DIR: &str = "/run/vaultboot/certs";
const DEFAULT_CERT_FILE: &str = "cert.pem";
const DEFAULT_KEY_FILE: &str = "key.pem";
const DEFAULT_CA_FILE: &str = "ca.pem";
const DEFAULT_PKI_ROLE: &str = "service";
const DEFAULT_CERT_TTL: &str = "720h";
const DEFAULT_KEYS_FILE: &str = "/var/lib/vaultboot/init/keys.json";
const DEFAULT_ROOT_TOKEN_FILE: &str = "/var/lib/vaultboot/init/root-token";
const DEFAULT_REQUIRED_SHARES: u32 = 3;
const DEFAULT_PARK_INTERVAL: &str = "1h";
const DEFAULT_SECRET_SHARES: u32 = 5;
const DEFAULT_SECRET_THRESHOLD: u32 = 3;

pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("openbao.addr", DEFAULT_OPENBAO_ADDR)?
        .set_default("openbao.kv_mount", DEFAULT_KV_MOUNT)?
        .set_default("openbao.pki_mount", DEFAULT_PKI_MOUNT)?
        .set_default("openbao.request_timeout", DEFAULT_REQUEST_TIMEOUT)?
        .set_default("probe.attempts", DEFAULT_PROBE_ATTEMPTS)?
        .set_default("probe.delay", DEFAULT_PROBE_DELAY)?
        .set_default("auth.mode", DEFAULT_AUTH_MODE)?
        .set_default("auth.role_id_file", DEFAULT_ROLE_ID_FILE)?
        .set_default("auth.secret_id_file", DEFAULT_SECRET_ID_FILE)?
        .set_default("auth.root_token_file", DEFAULT_ROOT_TOKEN_FILE)?
        .set_default("service.identity", "")?
        .set_default("service.kind", DEFAULT_SERVICE_KIND)?
        .set_default("service.config_dir", DEFAULT_SERVICE_CONFIG_DIR)?
        .set_default("service.required_fields", Vec::<String>::new())?
        .set_default("tls.requirement", DEFAULT_TLS_REQUIREMENT)?
        .set_default("tls.source", DEFAULT_TLS_SOURCE)?
        .set_default("tls.cert_dir", DEFAULT_CERT_DIR)?
        .set_default("tls.cert_file", DEFAULT_CERT_FILE)?
        .set_default("tls.key_file", DEFAULT_KEY_FILE)?
        .set_default("tls.ca_file", DEFAULT_CA_FILE)?
        .set_default("tls.pki_role", DEFAULT_PKI_ROLE)?
        .set_default("tls.alt_names", Vec::<String>::new())?
        .set_default("tls.ip_sans", Vec::<String>::new())?
        .set_default("tls.ttl", DEFAULT_CERT_TTL)?
        .set_default("unseal.keys_file", DEFAULT_KEYS_FILE)?
        .set_default("unseal.required_shares", DEFAULT_REQUIRED_SHARES)?
        .set_default("unseal.park_interval", DEFAULT_PARK_INTERVAL)?
        .set_default("init.secret_shares", DEFAULT_SECRET_SHARES)?
        .set_default("init.secret_threshold", DEFAULT_SECRET_THRESHOLD)?
        .set_default("init.keys_file", DEFAULT_KEYS_FILE)?
        .set_default("init.root_token_file", DEFAULT_ROOT_TOKEN_FILE)
}
