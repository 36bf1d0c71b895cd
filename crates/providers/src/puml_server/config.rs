use anyhow::{bail, Context};
use directories::BaseDirs;
use puml_core::assist::{AssistCredentials, AssistError};
use puml_core::settings::Settings;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};
use tracing::warn;
use url::Url;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub api_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub ai_base_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub proxy: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
}

impl ServerConfig {
    /// Env beats `config.toml`, which beats the persisted settings.
    pub fn from_env_and_file(settings: &Settings) -> anyhow::Result<Self> {
        let mut file_cfg = ServerFileConfig::default();
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read config file: {}", path.display()))?;
                match toml::from_str::<ServerFileConfig>(&text) {
                    Ok(c) => file_cfg = c,
                    Err(e) => {
                        warn!(target: "providers::puml_server", "ignoring {}: {}", path.display(), e)
                    }
                }
            }
        }
        Self::resolve(settings, file_cfg, |k| env::var(k).ok())
    }

    pub fn resolve(
        settings: &Settings,
        file: ServerFileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let env = |k: &str| env(k).filter(|v| !v.trim().is_empty());

        let base_url = env("PUML_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| settings.api_url.clone());
        let base_url = validate_base_url(&base_url)
            .with_context(|| format!("invalid render service URL '{}'", base_url))?;

        let ai_base_url = env("PUML_AI_BASE_URL")
            .or(file.ai_base_url)
            .or_else(|| settings.ai.base_url());
        let ai_api_key = env("PUML_AI_API_KEY")
            .or(file.ai_api_key)
            .or_else(|| settings.ai.api_key.clone());
        let ai_model = env("PUML_AI_MODEL")
            .or(file.ai_model)
            .unwrap_or_else(|| settings.ai.model.clone());

        let proxy = env("HTTPS_PROXY").or_else(|| env("HTTP_PROXY"));

        Ok(ServerConfig {
            base_url,
            timeout: Duration::from_millis(file.timeout_ms.unwrap_or(30_000)),
            max_retries: file.max_retries.unwrap_or(3),
            proxy,
            ai_base_url,
            ai_api_key,
            ai_model,
        })
    }

    pub fn assist_credentials(&self) -> Result<AssistCredentials, AssistError> {
        AssistCredentials::new(
            self.ai_base_url.as_deref(),
            self.ai_api_key.as_deref(),
            &self.ai_model,
        )
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".puml").join("config.toml")
        } else {
            base.config_dir().join("puml").join("config.toml")
        };
        Some(p)
    }
}

pub fn validate_base_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported scheme '{}'", url.scheme());
    }
    Ok(trimmed.to_string())
}
