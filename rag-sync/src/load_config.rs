/// `load_config` module: Loads a static YAML config file and layers environment overrides on top.
///
/// This module is the only place where untrusted YAML is parsed into the strongly-typed
/// [`rag_sync_core::config::Config`] plus the CLI-only `rag` section.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`]
/// - Apply `RAG_BASE_URL` / `RAG_PROFILE` overrides from the environment
/// - Surface clear diagnostics: any failure in loading must name the file and the cause
///
/// Secrets never live in the YAML: the API token is read from `RAG_API_TOKEN` by
/// [`crate::upload::RagClient::from_section`].
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use rag_sync_core::config::Config;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const ENV_BASE_URL: &str = "RAG_BASE_URL";
pub const ENV_PROFILE: &str = "RAG_PROFILE";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub sync: Config,
    #[serde(default)]
    pub rag: RagSection,
}

/// Upload destination. Both fields may come from the environment instead.
#[derive(Debug, Clone, Deserialize)]
pub struct RagSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RagSection {
    fn default() -> Self {
        RagSection {
            base_url: None,
            profile: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Loads a static YAML config file (no secrets) and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            e
        })
        .with_context(|| format!("Failed to read config file {path_ref:?}"))?;

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML {path_ref:?}: {e}"));
        }
    };

    if let Ok(base_url) = env::var(ENV_BASE_URL) {
        info!("Overriding rag.base_url from {ENV_BASE_URL}");
        config.rag.base_url = Some(base_url);
    }
    if let Ok(profile) = env::var(ENV_PROFILE) {
        info!("Overriding rag.profile from {ENV_PROFILE}");
        config.rag.profile = Some(profile);
    }

    config.sync.trace_loaded();
    Ok(config)
}
