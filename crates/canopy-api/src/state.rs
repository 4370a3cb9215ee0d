use std::sync::Arc;

use anyhow::{Context, Result};

use canopy_contract::ImportContract;
use canopy_pipeline::PipelineRunner;
use canopy_store::{ArtifactStore, LocalDirStore};

use crate::config::ApiConfig;

/// Shared per-process state: configuration, the artifact store, and the
/// shared runner every request invokes. No mutable state lives here; run
/// isolation comes from unique run ids on the filesystem.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn ArtifactStore>,
    pub runner: Arc<PipelineRunner>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let contract = match &config.contract_path {
            Some(path) => ImportContract::load(path)
                .with_context(|| format!("loading import contract from {}", path.display()))?,
            None => ImportContract::builtin(),
        };

        let store = Arc::new(LocalDirStore::new(config.outputs_dir.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            runner: Arc::new(PipelineRunner::new(contract)),
        })
    }
}
