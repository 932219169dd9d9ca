use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::{self, AppRoleCredential, BearerSession};
use crate::certs::{self, CertPaths};
use crate::config::{AuthMode, CertSource, Settings};
use crate::error::{BootstrapError, Result, Stage, StageError};
use crate::fs_util;
use crate::health::{HealthProbe, ProbeTarget};
use crate::openbao::{IssueRequest, OpenBaoClient};
use crate::render::{ConfigArtifact, ServiceConfigurator, TlsMode};
use crate::secrets::{self, SecretBundle};

/// Stage tracker for one bootstrap. Stages are entered strictly in order.
#[derive(Debug, Clone)]
pub struct InitializationRun {
    current: Stage,
    completed: Vec<Stage>,
    notes: Vec<(Stage, String)>,
}

impl Default for InitializationRun {
    fn default() -> Self {
        Self::new()
    }
}

impl InitializationRun {
    #[must_use]
    pub fn new() -> Self {
        info!("Entering stage {}", Stage::WaitingForStore);
        Self {
            current: Stage::WaitingForStore,
            completed: Vec::new(),
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.current
    }

    /// Stages finished so far, in order.
    #[must_use]
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    #[must_use]
    pub fn notes(&self) -> &[(Stage, String)] {
        &self.notes
    }

    /// Marks the current stage done and enters the next one.
    pub fn advance(&mut self) {
        self.completed.push(self.current);
        if let Some(next) = self.current.next() {
            info!("Entering stage {next}");
            self.current = next;
        }
    }

    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {message}", self.current);
        self.notes.push((self.current, message));
    }

    #[must_use]
    pub fn fail(&self, err: BootstrapError) -> StageError {
        StageError::new(self.current, err)
    }
}

/// Everything needed to replace this process with the service.
pub struct HandoffPlan {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub artifact: ConfigArtifact,
    pub run: InitializationRun,
}

impl std::fmt::Debug for HandoffPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffPlan")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

/// Per-service entrypoint: wait, authenticate, fetch, provision, configure,
/// then hand off.
pub struct BootstrapOrchestrator<'a> {
    client: &'a OpenBaoClient,
    settings: &'a Settings,
    probe_delay: Duration,
    root_token_env: Option<String>,
}

impl<'a> BootstrapOrchestrator<'a> {
    /// # Errors
    /// Returns error if the probe delay does not parse.
    pub fn new(client: &'a OpenBaoClient, settings: &'a Settings) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            settings,
            probe_delay: settings.probe_delay()?,
            root_token_env: None,
        })
    }

    /// Value of the root-token environment variable, used only in
    /// root-token auth mode.
    #[must_use]
    pub fn with_root_token_env(mut self, value: Option<String>) -> Self {
        self.root_token_env = value;
        self
    }

    /// Runs every stage up to the handoff. `command` is the service program
    /// followed by its arguments, forwarded verbatim.
    ///
    /// # Errors
    /// Returns the first failure labeled with the stage it happened in.
    pub async fn prepare(
        &self,
        command: &[String],
    ) -> std::result::Result<HandoffPlan, StageError> {
        let mut run = InitializationRun::new();
        let identity = self.settings.service.identity.as_str();

        let report = HealthProbe::new(self.client, self.settings.probe.attempts, self.probe_delay)
            .poll(ProbeTarget::Unsealed)
            .await
            .map_err(|err| run.fail(err))?;
        debug!("Store ready after {} attempt(s)", report.attempts);
        run.advance();

        let session = self.authenticate().await.map_err(|err| run.fail(err))?;
        run.advance();

        let schema = self
            .settings
            .service
            .kind
            .schema(&self.settings.service.required_fields);
        let bundle = secrets::fetch(
            self.client,
            &session,
            &self.settings.openbao.kv_mount,
            identity,
            &schema,
        )
        .await
        .map_err(|err| run.fail(err))?;
        run.advance();

        let tls_mode = TlsMode::resolve(bundle.tls_enabled(), self.settings.tls.requirement);
        let certs = self
            .provision_certificates(&mut run, &session, &bundle, tls_mode)
            .await
            .map_err(|err| run.fail(err))?;
        run.advance();

        let configurator =
            ServiceConfigurator::new(self.settings.service.kind, &self.settings.service.config_dir);
        let artifact = configurator.render(&bundle, certs.as_ref());
        write_artifact(&artifact, &self.settings.service.config_dir)
            .await
            .map_err(|err| run.fail(err))?;
        run.note(format!(
            "rendered {} file(s) and {} environment variable(s) (tls={})",
            artifact.files.len() + artifact.concatenated.len(),
            artifact.env.len(),
            if artifact.tls.is_some() { "optional" } else { "off" }
        ));
        run.advance();

        let Some((program, args)) = command.split_first() else {
            return Err(run.fail(BootstrapError::HandoffFailed {
                program: String::new(),
                reason: "no service command given".to_string(),
            }));
        };
        Ok(HandoffPlan {
            program: program.clone(),
            args: args.to_vec(),
            env: artifact.env.clone(),
            artifact,
            run,
        })
    }

    async fn authenticate(&self) -> Result<BearerSession> {
        let auth = &self.settings.auth;
        match auth.mode {
            AuthMode::AppRole => {
                let credential =
                    AppRoleCredential::from_files(&auth.role_id_file, &auth.secret_id_file)
                        .await?;
                auth::login(self.client, &credential).await
            }
            AuthMode::RootToken => {
                let (session, _) =
                    auth::load_root_token(self.root_token_env.clone(), Some(&auth.root_token_file))
                        .await?;
                Ok(session)
            }
        }
    }

    async fn provision_certificates(
        &self,
        run: &mut InitializationRun,
        session: &BearerSession,
        bundle: &SecretBundle,
        mode: TlsMode,
    ) -> Result<Option<CertPaths>> {
        if mode == TlsMode::Disabled {
            run.note("TLS not required");
            return Ok(None);
        }
        let identity = bundle.identity();
        let paths = self.settings.tls.cert_paths(identity);
        let result = match self.settings.tls.source {
            CertSource::Validate => {
                let hint = format!("run `vaultboot issue-cert {identity}` to generate it");
                certs::validate_bundle(&paths, &hint).await.map(|_| ())
            }
            CertSource::Issue => self.issue_certificates(session, identity, &paths).await,
        };
        match (result, mode) {
            (Ok(()), _) => {
                run.note(format!(
                    "certificates ready in {}",
                    paths.cert.parent().unwrap_or(Path::new(".")).display()
                ));
                Ok(Some(paths))
            }
            (Err(err), TlsMode::Optional) => {
                warn!("TLS requested but certificates are unusable; continuing without TLS: {err}");
                run.note("TLS optional and unavailable; continuing without TLS");
                Ok(None)
            }
            (Err(err), _) => Err(err),
        }
    }

    async fn issue_certificates(
        &self,
        session: &BearerSession,
        identity: &str,
        paths: &CertPaths,
    ) -> Result<()> {
        let tls = &self.settings.tls;
        let request = IssueRequest {
            common_name: tls.common_name_for(identity).to_string(),
            alt_names: tls.alt_names.join(","),
            ip_sans: tls.ip_sans.join(","),
            ttl: tls.ttl.trim().to_string(),
        };
        let bundle = certs::issue(
            self.client,
            session,
            &self.settings.openbao.pki_mount,
            &tls.pki_role,
            &request,
        )
        .await?;
        certs::persist(&bundle, paths, identity).await
    }
}

/// Writes rendered files into `config_dir`; secret files owner-only.
///
/// Files an earlier run rendered for this service kind that the current
/// artifact no longer carries are removed first.
///
/// # Errors
/// Returns [`BootstrapError::ConfigWrite`] naming the file that failed.
pub async fn write_artifact(artifact: &ConfigArtifact, config_dir: &Path) -> Result<()> {
    remove_stale_files(artifact, config_dir).await?;
    if artifact.files.is_empty() && artifact.concatenated.is_empty() {
        return Ok(());
    }
    fs_util::ensure_dir(config_dir, fs_util::SECRETS_DIR_MODE)
        .await
        .map_err(|err| config_write(config_dir, &err))?;
    for file in &artifact.files {
        let path = config_dir.join(&file.name);
        let written = if file.secret {
            fs_util::write_owner_only(&path, file.contents.as_bytes()).await
        } else {
            fs_util::write_public(&path, file.contents.as_bytes()).await
        };
        written.map_err(|err| config_write(&path, &err))?;
        debug!("Wrote {}", path.display());
    }
    for concat in &artifact.concatenated {
        let path = config_dir.join(&concat.name);
        let mut contents = Vec::new();
        for source in &concat.sources {
            let bytes = tokio::fs::read(source).await.map_err(|err| {
                BootstrapError::ConfigWrite {
                    path: path.clone(),
                    reason: format!("failed to read {}: {err}", source.display()),
                }
            })?;
            contents.extend_from_slice(&bytes);
            if !contents.ends_with(b"\n") {
                contents.push(b'\n');
            }
        }
        fs_util::write_owner_only(&path, &contents)
            .await
            .map_err(|err| config_write(&path, &err))?;
        debug!("Wrote {}", path.display());
    }
    Ok(())
}

async fn remove_stale_files(artifact: &ConfigArtifact, config_dir: &Path) -> Result<()> {
    let current: Vec<&str> = artifact
        .files
        .iter()
        .map(|file| file.name.as_str())
        .chain(artifact.concatenated.iter().map(|concat| concat.name.as_str()))
        .collect();
    for name in artifact.service.rendered_file_names() {
        if current.contains(name) {
            continue;
        }
        let path = config_dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Removed stale {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(BootstrapError::ConfigWrite {
                    path,
                    reason: format!("failed to remove stale file: {err}"),
                });
            }
        }
    }
    Ok(())
}

fn config_write(path: &Path, err: &anyhow::Error) -> BootstrapError {
    BootstrapError::ConfigWrite {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    }
}

/// Replaces the current process with the service. Only returns on failure.
#[must_use]
pub fn exec_handoff(plan: &HandoffPlan) -> StageError {
    use std::os::unix::process::CommandExt;

    info!(
        "Handing off to {} with {} argument(s)",
        plan.program,
        plan.args.len()
    );
    let err = std::process::Command::new(&plan.program)
        .args(&plan.args)
        .envs(&plan.env)
        .exec();
    plan.run.fail(BootstrapError::HandoffFailed {
        program: plan.program.clone(),
        reason: err.to_string(),
    })
}
