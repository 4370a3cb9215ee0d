use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Server configuration, read once at startup and passed to the router.
///
/// The API token and the signing secret are distinct credentials: the token
/// gates the processing endpoint, the secret belongs to the session/signing
/// surface of a fronting UI.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub api_token: String,
    pub secret_key: String,
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub contract_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_token = std::env::var("CANOPY_API_TOKEN")
            .context("CANOPY_API_TOKEN must be set")?;
        if api_token.trim().is_empty() {
            anyhow::bail!("CANOPY_API_TOKEN must not be empty");
        }

        let secret_key = std::env::var("CANOPY_SECRET_KEY")
            .or_else(|_| std::env::var("SECRET_KEY"))
            .unwrap_or_else(|_| "dev-secret".to_string());
        if secret_key == "dev-secret" {
            warn!("CANOPY_SECRET_KEY not set; using the development default");
        }

        let port = match std::env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("PORT '{value}' is not a valid port number"))?,
            Err(_) => 8000,
        };

        let uploads_dir =
            PathBuf::from(std::env::var("CANOPY_UPLOADS_DIR").unwrap_or_else(|_| "uploads".into()));
        let outputs_dir =
            PathBuf::from(std::env::var("CANOPY_OUTPUTS_DIR").unwrap_or_else(|_| "outputs".into()));

        let allowed_origins = std::env::var("CANOPY_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let contract_path = std::env::var("CANOPY_CONTRACT_PATH").ok().map(PathBuf::from);

        let max_upload_bytes = match std::env::var("CANOPY_MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("CANOPY_MAX_UPLOAD_BYTES '{value}' is not a number"))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            port,
            api_token,
            secret_key,
            uploads_dir,
            outputs_dir,
            allowed_origins,
            contract_path,
            max_upload_bytes,
        })
    }
}
