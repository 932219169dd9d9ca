//! Pure rendering of a dependent service's credential and TLS configuration.
//!
//! Nothing here touches the filesystem; the orchestrator writes the
//! resulting [`ConfigArtifact`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::certs::CertPaths;
use crate::secrets::{FieldDefault, SecretBundle, SecretSchema, TLS_ENABLED_FIELD};

const REDIS_PORT: u16 = 6379;
const REDIS_TLS_PORT: u16 = 6380;
const RABBITMQ_PORT: u16 = 5672;
const RABBITMQ_TLS_PORT: u16 = 5671;
const MONGODB_PEM_NAME: &str = "mongodb.pem";
const POSTGRES_CONF_NAME: &str = "postgresql.tls.conf";
const POSTGRES_HBA_NAME: &str = "pg_hba.tls.conf";
const MYSQL_CONF_NAME: &str = "tls.cnf";
const MONGODB_CONF_NAME: &str = "mongod.tls.conf";
const REDIS_CONF_NAME: &str = "redis.conf";
const RABBITMQ_CONF_NAME: &str = "rabbitmq.tls.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Postgres,
    Mysql,
    Mongodb,
    Redis,
    Rabbitmq,
    /// A reference API or any other process configured through environment.
    Generic,
}

impl ServiceKind {
    #[must_use]
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Postgres | ServiceKind::Mongodb => &["user", "password", "database"],
            ServiceKind::Mysql => &["root_password", "user", "password", "database"],
            ServiceKind::Redis => &["password"],
            ServiceKind::Rabbitmq => &["user", "password"],
            ServiceKind::Generic => &[],
        }
    }

    /// Every file name the configurator may write into the config directory
    /// for this kind, whether or not TLS is on.
    #[must_use]
    pub fn rendered_file_names(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Postgres => &[POSTGRES_CONF_NAME, POSTGRES_HBA_NAME],
            ServiceKind::Mysql => &[MYSQL_CONF_NAME],
            ServiceKind::Mongodb => &[MONGODB_CONF_NAME, MONGODB_PEM_NAME],
            ServiceKind::Redis => &[REDIS_CONF_NAME],
            ServiceKind::Rabbitmq => &[RABBITMQ_CONF_NAME],
            ServiceKind::Generic => &[],
        }
    }

    /// Schema for this kind, extended with deployment-specific required fields.
    #[must_use]
    pub fn schema(self, extra_required: &[String]) -> SecretSchema {
        let mut required: Vec<String> = self
            .required_fields()
            .iter()
            .map(|field| (*field).to_string())
            .collect();
        for field in extra_required {
            if !required.contains(field) {
                required.push(field.clone());
            }
        }
        let schema = SecretSchema::new(required);
        match self {
            ServiceKind::Rabbitmq => {
                schema.with_default("vhost", FieldDefault::Text("/".to_string()))
            }
            _ => schema,
        }
    }
}

/// Whether TLS was requested and how strictly certificate problems are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsRequirement {
    Optional,
    Required,
}

/// Effective TLS mode for one bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Disabled,
    /// Certificate problems degrade to [`TlsMode::Disabled`] with a warning.
    Optional,
    /// Certificate problems are fatal.
    Required,
}

impl TlsMode {
    #[must_use]
    pub fn resolve(tls_enabled: bool, requirement: TlsRequirement) -> Self {
        match (tls_enabled, requirement) {
            (false, _) => TlsMode::Disabled,
            (true, TlsRequirement::Optional) => TlsMode::Optional,
            (true, TlsRequirement::Required) => TlsMode::Required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// One listener accepts both encrypted and plaintext clients.
    Optional,
}

impl TransportSecurity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TransportSecurity::Optional => "optional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

impl TlsVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TlsVersion::V1_2 => "TLSv1.2",
            TlsVersion::V1_3 => "TLSv1.3",
        }
    }
}

pub const MIN_TLS_VERSION: TlsVersion = TlsVersion::V1_2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsStanza {
    pub transport_security: TransportSecurity,
    pub min_protocol: TlsVersion,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub name: String,
    pub contents: String,
    /// Holds credentials or key material; written owner-only.
    pub secret: bool,
}

/// File built from existing files at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatFile {
    pub name: String,
    pub sources: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct ConfigArtifact {
    pub service: ServiceKind,
    pub tls: Option<TlsStanza>,
    pub env: BTreeMap<String, String>,
    pub files: Vec<RenderedFile>,
    pub concatenated: Vec<ConcatFile>,
}

impl std::fmt::Debug for ConfigArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigArtifact")
            .field("service", &self.service)
            .field("tls", &self.tls)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field(
                "files",
                &self.files.iter().map(|file| &file.name).collect::<Vec<_>>(),
            )
            .field("concatenated", &self.concatenated)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfigurator {
    kind: ServiceKind,
    config_dir: PathBuf,
}

impl ServiceConfigurator {
    #[must_use]
    pub fn new(kind: ServiceKind, config_dir: &Path) -> Self {
        Self {
            kind,
            config_dir: config_dir.to_path_buf(),
        }
    }

    /// Renders the artifact. `certs` is `None` when TLS is disabled or was
    /// dropped after an optional certificate failure.
    #[must_use]
    pub fn render(&self, bundle: &SecretBundle, certs: Option<&CertPaths>) -> ConfigArtifact {
        let tls = certs.map(|paths| TlsStanza {
            transport_security: TransportSecurity::Optional,
            min_protocol: MIN_TLS_VERSION,
            cert: paths.cert.clone(),
            key: paths.key.clone(),
            ca: paths.ca.clone(),
        });
        let mut artifact = ConfigArtifact {
            service: self.kind,
            tls: tls.clone(),
            env: credential_env(self.kind, bundle),
            files: Vec::new(),
            concatenated: Vec::new(),
        };
        match self.kind {
            ServiceKind::Postgres => render_postgres(&mut artifact, tls.as_ref()),
            ServiceKind::Mysql => render_mysql(&mut artifact, tls.as_ref()),
            ServiceKind::Mongodb => self.render_mongodb(&mut artifact, tls.as_ref()),
            ServiceKind::Redis => render_redis(&mut artifact, bundle, tls.as_ref()),
            ServiceKind::Rabbitmq => render_rabbitmq(&mut artifact, tls.as_ref()),
            ServiceKind::Generic => render_generic(&mut artifact, tls.as_ref()),
        }
        artifact
    }

    fn render_mongodb(&self, artifact: &mut ConfigArtifact, tls: Option<&TlsStanza>) {
        let Some(tls) = tls else {
            return;
        };
        // mongod wants certificate and key in one file.
        artifact.concatenated.push(ConcatFile {
            name: MONGODB_PEM_NAME.to_string(),
            sources: vec![tls.cert.clone(), tls.key.clone()],
        });
        let pem = self.config_dir.join(MONGODB_PEM_NAME);
        let mut conf = String::new();
        let _ = writeln!(conf, "net:");
        let _ = writeln!(conf, "  tls:");
        let _ = writeln!(conf, "    mode: preferTLS");
        let _ = writeln!(conf, "    certificateKeyFile: {}", pem.display());
        let _ = writeln!(conf, "    CAFile: {}", tls.ca.display());
        let _ = writeln!(conf, "    allowConnectionsWithoutCertificates: true");
        let _ = writeln!(conf, "    disabledProtocols: TLS1_0,TLS1_1");
        artifact.files.push(RenderedFile {
            name: MONGODB_CONF_NAME.to_string(),
            contents: conf,
            secret: false,
        });
    }
}

fn credential_env(kind: ServiceKind, bundle: &SecretBundle) -> BTreeMap<String, String> {
    let mapping: &[(&str, &str)] = match kind {
        ServiceKind::Postgres => &[
            ("POSTGRES_USER", "user"),
            ("POSTGRES_PASSWORD", "password"),
            ("POSTGRES_DB", "database"),
        ],
        ServiceKind::Mysql => &[
            ("MYSQL_ROOT_PASSWORD", "root_password"),
            ("MYSQL_USER", "user"),
            ("MYSQL_PASSWORD", "password"),
            ("MYSQL_DATABASE", "database"),
        ],
        ServiceKind::Mongodb => &[
            ("MONGO_INITDB_ROOT_USERNAME", "user"),
            ("MONGO_INITDB_ROOT_PASSWORD", "password"),
            ("MONGO_INITDB_DATABASE", "database"),
        ],
        ServiceKind::Redis => &[("REDIS_PASSWORD", "password")],
        ServiceKind::Rabbitmq => &[
            ("RABBITMQ_DEFAULT_USER", "user"),
            ("RABBITMQ_DEFAULT_PASS", "password"),
            ("RABBITMQ_DEFAULT_VHOST", "vhost"),
        ],
        ServiceKind::Generic => {
            return bundle
                .iter()
                .filter(|(field, _)| *field != TLS_ENABLED_FIELD)
                .map(|(field, value)| (env_name(field), value.to_string()))
                .collect();
        }
    };
    mapping
        .iter()
        .filter_map(|(env, field)| {
            bundle
                .get(field)
                .map(|value| ((*env).to_string(), value.to_string()))
        })
        .collect()
}

fn env_name(field: &str) -> String {
    field
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn render_postgres(artifact: &mut ConfigArtifact, tls: Option<&TlsStanza>) {
    let Some(tls) = tls else {
        return;
    };
    let mut conf = String::new();
    let _ = writeln!(conf, "ssl = on");
    let _ = writeln!(conf, "ssl_cert_file = '{}'", tls.cert.display());
    let _ = writeln!(conf, "ssl_key_file = '{}'", tls.key.display());
    let _ = writeln!(conf, "ssl_ca_file = '{}'", tls.ca.display());
    let _ = writeln!(
        conf,
        "ssl_min_protocol_version = '{}'",
        tls.min_protocol.as_str()
    );
    artifact.files.push(RenderedFile {
        name: POSTGRES_CONF_NAME.to_string(),
        contents: conf,
        secret: false,
    });
    // Both lines: TLS clients match hostssl, plaintext clients still match host.
    artifact.files.push(RenderedFile {
        name: POSTGRES_HBA_NAME.to_string(),
        contents: "hostssl all all all scram-sha-256\nhost    all all all scram-sha-256\n"
            .to_string(),
        secret: false,
    });
}

fn render_mysql(artifact: &mut ConfigArtifact, tls: Option<&TlsStanza>) {
    let Some(tls) = tls else {
        return;
    };
    let mut conf = String::new();
    let _ = writeln!(conf, "[mysqld]");
    let _ = writeln!(conf, "require_secure_transport = OFF");
    let _ = writeln!(conf, "ssl_ca = {}", tls.ca.display());
    let _ = writeln!(conf, "ssl_cert = {}", tls.cert.display());
    let _ = writeln!(conf, "ssl_key = {}", tls.key.display());
    let _ = writeln!(conf, "tls_version = {}", protocol_list(tls.min_protocol, ","));
    artifact.files.push(RenderedFile {
        name: MYSQL_CONF_NAME.to_string(),
        contents: conf,
        secret: false,
    });
}

fn render_redis(artifact: &mut ConfigArtifact, bundle: &SecretBundle, tls: Option<&TlsStanza>) {
    let mut conf = String::new();
    if let Some(password) = bundle.get("password") {
        let _ = writeln!(conf, "requirepass {}", redis_quote(password));
    }
    let _ = writeln!(conf, "port {REDIS_PORT}");
    if let Some(tls) = tls {
        let _ = writeln!(conf, "tls-port {REDIS_TLS_PORT}");
        let _ = writeln!(conf, "tls-cert-file {}", tls.cert.display());
        let _ = writeln!(conf, "tls-key-file {}", tls.key.display());
        let _ = writeln!(conf, "tls-ca-cert-file {}", tls.ca.display());
        let _ = writeln!(
            conf,
            "tls-auth-clients {}",
            tls.transport_security.as_str()
        );
        let _ = writeln!(
            conf,
            "tls-protocols \"{}\"",
            protocol_list(tls.min_protocol, " ")
        );
    }
    artifact.files.push(RenderedFile {
        name: REDIS_CONF_NAME.to_string(),
        contents: conf,
        secret: true,
    });
}

/// Double-quoted redis.conf argument; the value always stays on one line.
fn redis_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            ch if ch.is_control() && ch.is_ascii() => {
                let _ = write!(quoted, "\\x{:02x}", u32::from(ch));
            }
            ch => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

fn render_rabbitmq(artifact: &mut ConfigArtifact, tls: Option<&TlsStanza>) {
    let Some(tls) = tls else {
        return;
    };
    let mut conf = String::new();
    let _ = writeln!(conf, "listeners.tcp.default = {RABBITMQ_PORT}");
    let _ = writeln!(conf, "listeners.ssl.default = {RABBITMQ_TLS_PORT}");
    let _ = writeln!(conf, "ssl_options.cacertfile = {}", tls.ca.display());
    let _ = writeln!(conf, "ssl_options.certfile = {}", tls.cert.display());
    let _ = writeln!(conf, "ssl_options.keyfile = {}", tls.key.display());
    let _ = writeln!(conf, "ssl_options.verify = verify_peer");
    let _ = writeln!(conf, "ssl_options.fail_if_no_peer_cert = false");
    for (index, version) in supported_versions(tls.min_protocol).iter().enumerate() {
        let _ = writeln!(
            conf,
            "ssl_options.versions.{} = {}",
            index + 1,
            version.as_str().to_ascii_lowercase()
        );
    }
    artifact.files.push(RenderedFile {
        name: RABBITMQ_CONF_NAME.to_string(),
        contents: conf,
        secret: false,
    });
}

fn render_generic(artifact: &mut ConfigArtifact, tls: Option<&TlsStanza>) {
    let Some(tls) = tls else {
        return;
    };
    let env = &mut artifact.env;
    env.insert("ENABLE_TLS".to_string(), "true".to_string());
    env.insert(
        "TLS_MODE".to_string(),
        tls.transport_security.as_str().to_string(),
    );
    env.insert(
        "TLS_MIN_VERSION".to_string(),
        tls.min_protocol.as_str().to_string(),
    );
    env.insert("TLS_CERT_FILE".to_string(), tls.cert.display().to_string());
    env.insert("TLS_KEY_FILE".to_string(), tls.key.display().to_string());
    env.insert("TLS_CA_FILE".to_string(), tls.ca.display().to_string());
}

fn supported_versions(min: TlsVersion) -> Vec<TlsVersion> {
    [TlsVersion::V1_2, TlsVersion::V1_3]
        .into_iter()
        .filter(|version| *version >= min)
        .collect()
}

fn protocol_list(min: TlsVersion, separator: &str) -> String {
    supported_versions(min)
        .iter()
        .map(|version| version.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}
