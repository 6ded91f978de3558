use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use coopmarket_config::AppConfig;
use coopmarket_marketplace::{
    schema, AuthService, CooperativeService, MemberService, SessionContext, VerificationService,
};
use coopmarket_remote::{DataService, MemoryDataService, RestDataService, Session};
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Keeps the signed-in session between runs of the command line client.
pub mod session_store {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use anyhow::{Context, Result};
    use coopmarket_remote::Session;
    use tracing::debug;

    pub const SESSION_FILE_ENV: &str = "COOPMARKET_SESSION_FILE";
    const DEFAULT_SESSION_FILE: &str = ".coopmarket-session.json";

    #[derive(Debug, Clone)]
    pub struct SessionStore {
        path: PathBuf,
    }

    impl SessionStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// `COOPMARKET_SESSION_FILE`, or a dotfile in the working directory.
        pub fn from_env() -> Self {
            let path = std::env::var(SESSION_FILE_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE));
            Self::new(path)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub fn load(&self) -> Result<Option<Session>> {
            let raw = match fs::read_to_string(&self.path) {
                Ok(raw) => raw,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("failed to read session file {}", self.path.display())
                    })
                }
            };
            let session = serde_json::from_str(&raw).with_context(|| {
                format!("session file {} is corrupt", self.path.display())
            })?;
            debug!(path = %self.path.display(), "session restored");
            Ok(Some(session))
        }

        pub fn save(&self, session: &Session) -> Result<()> {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create session directory {}", parent.display())
                })?;
            }
            let raw = serde_json::to_string_pretty(session)?;
            fs::write(&self.path, raw)
                .with_context(|| format!("failed to write session file {}", self.path.display()))
        }

        pub fn clear(&self) -> Result<()> {
            match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(error) => Err(error).with_context(|| {
                    format!("failed to remove session file {}", self.path.display())
                }),
            }
        }
    }
}

#[derive(Clone)]
pub struct ClientServices {
    pub remote: Arc<dyn DataService>,
    pub session: SessionContext,
    pub auth: Arc<AuthService>,
    pub cooperatives: Arc<CooperativeService>,
    pub members: Arc<MemberService>,
    pub verification: Arc<VerificationService>,
}

impl ClientServices {
    /// Connect to the hosted service, adopting a previously stored session.
    pub async fn initialise(config: &AppConfig, restored: Option<Session>) -> Result<Self> {
        ensure!(
            !config.remote.url.trim().is_empty(),
            "remote.url must be configured"
        );
        if config.remote.anon_key.is_empty() {
            warn!("remote.anon_key is empty, requests will be anonymous");
        }

        let rest = RestDataService::new(&config.remote, &config.realtime)
            .context("failed to build remote data service client")?;
        if let Some(session) = restored {
            rest.restore_session(session).await;
        }

        info!(url = %config.remote.url, "remote data service ready");
        Ok(Self::assemble(Arc::new(rest)).await)
    }

    /// Services over an in-memory store carrying the marketplace schema.
    pub async fn offline(memory: MemoryDataService) -> Self {
        schema::install(&memory).await;
        info!("using in-memory data service");
        Self::assemble(Arc::new(memory)).await
    }

    async fn assemble(remote: Arc<dyn DataService>) -> Self {
        let session = SessionContext::new();
        if let Some(current) = session.init_from(remote.as_ref()).await {
            info!(user = %current.user.id, "session restored");
        }

        Self {
            auth: Arc::new(AuthService::new(Arc::clone(&remote), session.clone())),
            cooperatives: Arc::new(CooperativeService::new(Arc::clone(&remote), session.clone())),
            members: Arc::new(MemberService::new(Arc::clone(&remote), session.clone())),
            verification: Arc::new(VerificationService::new(Arc::clone(&remote), session.clone())),
            remote,
            session,
        }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
