//! Resolved runtime context shared by all commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use restock_core::{config, Config};
use restock_sync::{EngineSettings, ReconciliationOrchestrator, SnapshotStore};

use crate::logging::init_tracing;
use crate::source::FileSource;
use crate::target::HttpTarget;

pub struct App {
    pub home: PathBuf,
    pub config: Config,
}

impl App {
    /// Load config (explicit path or `~/.restock/config.yaml`), apply
    /// `RESTOCK_*` overrides and start logging.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let mut config = match config_path {
            Some(path) => config::load_from(path),
            None => config::load_at(&home),
        }
        .context("failed to load configuration")?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        init_tracing(config.log_level.as_deref());
        Ok(Self { home, config })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir_at(&self.home)
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(self.state_dir())
    }

    pub fn source(&self) -> Result<FileSource> {
        let path = self.config.source.inventory_path.as_ref().with_context(|| {
            format!(
                "no inventory file configured; set source.inventory_path or {}",
                config::ENV_INVENTORY
            )
        })?;
        Ok(FileSource::new(path))
    }

    pub fn target(&self) -> Result<HttpTarget> {
        let target = &self.config.target;
        let base_url = target.base_url.as_ref().with_context(|| {
            format!(
                "no target system configured; set target.base_url or {}",
                config::ENV_TARGET_URL
            )
        })?;
        let token = std::env::var(&target.token_env).ok().filter(|t| !t.is_empty());
        Ok(HttpTarget::new(
            base_url.clone(),
            token,
            Duration::from_secs(target.timeout_secs),
        ))
    }

    pub fn orchestrator(&self) -> Result<ReconciliationOrchestrator> {
        let orchestrator = ReconciliationOrchestrator::new(
            self.store(),
            Arc::new(self.source()?),
            Arc::new(self.target()?),
            EngineSettings::from_config(&self.config),
        )?;
        Ok(orchestrator)
    }
}

/// Build a multi-thread runtime and drive `future` to completion.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
