use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolved runtime settings for the controller.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub storage_dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Wicket is not configured—create wicket.yaml with the API endpoint.")]
    Missing,
    #[error("Wicket configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing => {
                "Wicket is not configured—create wicket.yaml with the API endpoint.".to_string()
            }
            Self::Invalid(detail) => {
                format!("Wicket is not configured—{detail}. Update wicket.yaml.")
            }
        }
    }
}

impl RuntimeConfig {
    /// Loads settings from `wicket.yaml`, with `WICKET_API_URL` (environment
    /// or `.env`) taking precedence over the file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        if let Ok(url) = std::env::var("WICKET_API_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                return Ok(Self::with_base_url(trimmed));
            }
        }
        let path = locate_config_file().ok_or(ConfigError::Missing)?;
        let contents = fs::read_to_string(&path).map_err(|err| {
            ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: WicketConfig = serde_yaml::from_str(&contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid wicket.yaml: {err}")))?;
        let api = config
            .api
            .ok_or_else(|| ConfigError::Invalid("missing `api` section".to_string()))?;
        resolve_settings(api, config.storage)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            storage_dir: None,
        }
    }

    /// Directory the credential store persists under: the configured one, or
    /// the platform data dir.
    pub fn storage_root(&self) -> PathBuf {
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }
        BaseDirs::new()
            .map(|base| base.data_dir().join("wicket"))
            .unwrap_or_else(|| PathBuf::from(".wicket"))
    }
}

fn resolve_settings(
    api: ApiSection,
    storage: Option<StorageSection>,
) -> Result<RuntimeConfig, ConfigError> {
    let base_url = api.base_url.trim().to_string();
    if base_url.is_empty() {
        return Err(ConfigError::Invalid(
            "missing API base url in wicket.yaml".to_string(),
        ));
    }
    let request_timeout = Duration::from_secs(api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let storage_dir = storage
        .map(|section| section.dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);
    Ok(RuntimeConfig {
        api_base_url: base_url,
        request_timeout,
        storage_dir,
    })
}

fn locate_config_file() -> Option<PathBuf> {
    wicket_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn wicket_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("wicket");
        paths.push(config_dir.join("wicket.yaml"));
        paths.push(config_dir.join("wicket.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".wicket").join("wicket.yaml"));
        paths.push(home_dir.join(".wicket").join("wicket.yml"));
    } else {
        paths.push(PathBuf::from("wicket.yaml"));
        paths.push(PathBuf::from("wicket.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct WicketConfig {
    api: Option<ApiSection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    #[serde(default)]
    base_url: String,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    #[serde(default)]
    dir: String,
}
