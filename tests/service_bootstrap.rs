mod support;

use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use vaultboot::auth::{self, AppRoleCredential, SessionKind};
use vaultboot::config::CertSource;
use vaultboot::error::CertArtifact;
use vaultboot::init::{InitOutcome, InitPaths, ThresholdInitializer};
use vaultboot::orchestrator::BootstrapOrchestrator;
use vaultboot::render::{ServiceKind, TlsRequirement};
use vaultboot::seal::{SealOutcome, SealStateMachine};
use vaultboot::secrets::{self, SecretSchema};
use vaultboot::{BootstrapError, Stage};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{
    CLIENT_TOKEN, ROLE_ID, SECRET_ID, SHARES, client, init_response, mount_approle_login,
    mount_health, seal_status, self_signed, settings_for, write_approle_files,
};

async fn mount_kv(server: &MockServer, identity: &str, data: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/secret/data/{identity}")))
        .and(header("X-Vault-Token", CLIENT_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "data": data, "metadata": { "version": 2 } }
        })))
        .mount(server)
        .await;
}

fn command() -> Vec<String> {
    ["docker-entrypoint.sh", "postgres", "-c", "log_connections=on"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[tokio::test]
async fn login_sends_pair_and_returns_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .and(body_json(json!({ "role_id": ROLE_ID, "secret_id": SECRET_ID })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": { "client_token": CLIENT_TOKEN, "lease_duration": 600, "policies": ["svc"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().expect("temp dir");
    let (role, secret) = write_approle_files(dir.path()).expect("approle files");
    let credential = AppRoleCredential::from_files(&role, &secret)
        .await
        .expect("credential");
    let session = auth::login(&client(&server), &credential)
        .await
        .expect("login");

    assert_eq!(session.kind(), SessionKind::AppRole);
    assert_eq!(session.lease(), Some(std::time::Duration::from_secs(600)));
    assert_eq!(session.policies(), ["svc".to_string()]);
    assert!(!format!("{session:?}").contains(CLIENT_TOKEN));
}

#[tokio::test]
async fn login_with_empty_token_is_auth_failure() {
    for token in [json!(""), json!(null), json!("null")] {
        let server = MockServer::start().await;
        mount_approle_login(&server, token).await;

        let dir = tempdir().expect("temp dir");
        let (role, secret) = write_approle_files(dir.path()).expect("approle files");
        let credential = AppRoleCredential::from_files(&role, &secret)
            .await
            .expect("credential");
        let err = auth::login(&client(&server), &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::AuthFailed { .. }), "{err}");
    }
}

#[tokio::test]
async fn fetch_reports_missing_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/mysql"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
        .mount(&server)
        .await;

    let session = auth::BearerSession::root("token".to_string());
    let err = secrets::fetch(
        &client(&server),
        &session,
        "secret",
        "mysql",
        &SecretSchema::new(["password"]),
    )
    .await
    .unwrap_err();

    match err {
        BootstrapError::SecretUnavailable { identity, reason } => {
            assert_eq!(identity, "mysql");
            assert!(reason.contains("no entry found"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn fetch_normalizes_bundle() {
    let server = MockServer::start().await;
    mount_kv(
        &server,
        "rabbitmq",
        json!({ "user": "mq", "password": 99, "vhost": "null", "tls_enabled": "yes" }),
    )
    .await;

    let session = {
        mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
        let dir = tempdir().expect("temp dir");
        let (role, secret) = write_approle_files(dir.path()).expect("approle files");
        let credential = AppRoleCredential::from_files(&role, &secret)
            .await
            .expect("credential");
        auth::login(&client(&server), &credential)
            .await
            .expect("login")
    };
    let bundle = secrets::fetch(
        &client(&server),
        &session,
        "secret",
        "rabbitmq",
        &ServiceKind::Rabbitmq.schema(&[]),
    )
    .await
    .expect("bundle");

    assert_eq!(bundle.version(), Some(2));
    assert_eq!(bundle.get("password"), Some("99"));
    assert_eq!(bundle.get("vhost"), Some("/"));
    assert!(bundle.tls_enabled());
}

#[tokio::test]
async fn bootstrap_fails_at_certificate_stage_when_tls_material_is_missing() {
    let server = MockServer::start().await;
    // Fresh store: init, unseal, then the per-service bootstrap.
    Mock::given(method("GET"))
        .and(path("/v1/sys/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": false })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(init_response(&SHARES)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/seal-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(seal_status(true, 0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/seal-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(seal_status(false, 0)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/unseal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(seal_status(true, 1)))
        .expect(3)
        .mount(&server)
        .await;
    mount_health(&server, true, false).await;
    mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
    mount_kv(
        &server,
        "postgres",
        json!({ "user": "dev", "password": "pw", "database": "app", "tls_enabled": "true" }),
    )
    .await;

    let dir = tempdir().expect("temp dir");
    let settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    let mut settings = settings;
    settings.service.kind = ServiceKind::Postgres;
    let client = client(&server);

    let paths = InitPaths {
        keys_file: settings.init.keys_file.clone(),
        root_token_file: settings.init.root_token_file.clone(),
    };
    let InitOutcome::Initialized(shares) = ThresholdInitializer::new(&client)
        .initialize(3, 5, &paths)
        .await
        .expect("initialize")
    else {
        panic!("expected a fresh initialization");
    };
    let outcome = SealStateMachine::new(&client)
        .unseal(&shares, 3)
        .await
        .expect("unseal");
    assert_eq!(outcome, SealOutcome::Unsealed { submitted: 3 });

    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::ValidatingCertificates);
    match &err.source {
        BootstrapError::CertMissing { artifact, path, .. } => {
            assert_eq!(*artifact, CertArtifact::Certificate);
            assert!(path.ends_with("postgres/cert.pem"), "{}", path.display());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("validating-certificates: "));
    assert!(!settings.service.config_dir.exists());
}

#[tokio::test]
async fn bootstrap_without_tls_hands_off_plaintext() {
    let server = MockServer::start().await;
    mount_health(&server, true, false).await;
    mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
    mount_kv(
        &server,
        "postgres",
        json!({ "user": "dev", "password": "pw", "database": "app" }),
    )
    .await;

    let dir = tempdir().expect("temp dir");
    let mut settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    settings.service.kind = ServiceKind::Postgres;
    let client = client(&server);

    let plan = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .expect("plan");

    assert_eq!(plan.program, "docker-entrypoint.sh");
    assert_eq!(plan.args, ["postgres", "-c", "log_connections=on"]);
    assert_eq!(plan.env.get("POSTGRES_PASSWORD").map(String::as_str), Some("pw"));
    assert!(plan.artifact.tls.is_none());
    assert_eq!(plan.run.stage(), Stage::Handoff);
    assert_eq!(plan.run.completed(), &Stage::ALL[..5]);
    assert!(
        plan.run
            .notes()
            .iter()
            .any(|(stage, note)| *stage == Stage::ValidatingCertificates
                && note == "TLS not required")
    );
    assert!(!format!("{plan:?}").contains("\"pw\""));
}

#[tokio::test]
async fn bootstrap_with_optional_tls_degrades_to_plaintext() {
    let server = MockServer::start().await;
    mount_health(&server, true, false).await;
    mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
    mount_kv(&server, "redis", json!({ "password": "pw", "tls_enabled": true })).await;

    let dir = tempdir().expect("temp dir");
    let mut settings = settings_for(&server, dir.path(), "redis").expect("settings");
    settings.service.kind = ServiceKind::Redis;
    settings.tls.requirement = TlsRequirement::Optional;
    let client = client(&server);

    let plan = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&["redis-server".to_string()])
        .await
        .expect("plan");

    assert!(plan.artifact.tls.is_none());
    let redis_conf =
        std::fs::read_to_string(settings.service.config_dir.join("redis.conf")).expect("conf");
    assert!(redis_conf.contains("requirepass pw"));
    assert!(!redis_conf.contains("tls"));
}

#[tokio::test]
async fn bootstrap_issues_certificates_and_renders_dual_mode_tls() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed("postgres").expect("certificate");
    mount_health(&server, true, false).await;
    mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
    mount_kv(
        &server,
        "postgres",
        json!({ "user": "dev", "password": "pw", "database": "app", "tls_enabled": "true" }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/pki_int/issue/service"))
        .and(header("X-Vault-Token", CLIENT_TOKEN))
        .and(body_json(json!({
            "common_name": "postgres",
            "alt_names": "postgres,db.internal",
            "ttl": "720h",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "certificate": cert,
                "private_key": key,
                "issuing_ca": cert,
                "ca_chain": [cert],
                "serial_number": "01:02:03",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().expect("temp dir");
    let mut settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    settings.service.kind = ServiceKind::Postgres;
    settings.tls.source = CertSource::Issue;
    settings.tls.alt_names = vec!["postgres".to_string(), "db.internal".to_string()];
    let client = client(&server);

    let plan = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .expect("plan");

    let paths = settings.tls.cert_paths("postgres");
    let key_mode = vaultboot::fs_util::file_mode(&paths.key).await.expect("mode");
    assert_eq!(key_mode, 0o600);
    let tls = plan.artifact.tls.as_ref().expect("tls stanza");
    assert_eq!(tls.transport_security.as_str(), "optional");
    assert_eq!(tls.min_protocol.as_str(), "TLSv1.2");
    let conf = std::fs::read_to_string(settings.service.config_dir.join("postgresql.tls.conf"))
        .expect("tls conf");
    assert!(conf.contains("ssl = on"));
    assert!(conf.contains(&paths.key.display().to_string()));
}

#[tokio::test]
async fn bootstrap_reports_sealed_store_as_not_ready() {
    let server = MockServer::start().await;
    mount_health(&server, true, true).await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().expect("temp dir");
    let settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    let client = client(&server);

    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::WaitingForStore);
    match err.source {
        BootstrapError::StoreNotReady {
            addr,
            attempts,
            state,
        } => {
            assert_eq!(addr, server.uri());
            assert_eq!(attempts, 3);
            assert_eq!(state, "sealed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn bootstrap_reports_uninitialized_store_as_not_initialized() {
    let server = MockServer::start().await;
    mount_health(&server, false, true).await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().expect("temp dir");
    let settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    let client = client(&server);

    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::WaitingForStore);
    assert!(matches!(err.source, BootstrapError::NotInitialized { .. }));
    assert!(!err.to_string().contains("unreachable"));
}

#[tokio::test]
async fn bootstrap_reports_silent_store_as_unreachable() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("temp dir");
    let settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    let addr = server.uri();
    drop(server);

    let client = vaultboot::openbao::OpenBaoClient::new(&addr, Duration::from_millis(500))
        .expect("client");
    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::WaitingForStore);
    match err.source {
        BootstrapError::StoreUnreachable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn bootstrap_rejects_incomplete_bundle_at_fetch_stage() {
    let server = MockServer::start().await;
    mount_health(&server, true, false).await;
    mount_approle_login(&server, json!(CLIENT_TOKEN)).await;
    mount_kv(&server, "mysql", json!({ "user": "dev", "password": "" })).await;

    let dir = tempdir().expect("temp dir");
    let mut settings = settings_for(&server, dir.path(), "mysql").expect("settings");
    settings.service.kind = ServiceKind::Mysql;
    let client = client(&server);

    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::FetchingSecrets);
    assert!(matches!(err.source, BootstrapError::InvalidSecret { .. }));
}

#[tokio::test]
async fn bootstrap_with_missing_approle_file_never_logs_in() {
    let server = MockServer::start().await;
    mount_health(&server, true, false).await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().expect("temp dir");
    let mut settings = settings_for(&server, dir.path(), "postgres").expect("settings");
    std::fs::remove_file(&settings.auth.secret_id_file).expect("remove secret id");
    settings.service.kind = ServiceKind::Postgres;
    let client = client(&server);

    let err = BootstrapOrchestrator::new(&client, &settings)
        .expect("orchestrator")
        .prepare(&command())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Authenticating);
    assert!(matches!(
        err.source,
        BootstrapError::MissingCredential { .. }
    ));
}

#[test]
fn default_config_file_is_public() {
    assert_eq!(vaultboot::config::DEFAULT_CONFIG_FILE, "vaultboot.toml");
}
