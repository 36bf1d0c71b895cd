//! User settings persisted one key per value next to the history.

use std::{
    fmt,
    str::FromStr,
    sync::{PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, StorageError};

pub const API_URL_KEY: &str = "@puml_viewer_api_url";
pub const AUTO_RENDER_KEY: &str = "@puml_viewer_auto_render";
pub const AI_PROVIDER_KEY: &str = "@puml_viewer_ai_provider";
pub const AI_BASE_URL_KEY: &str = "@puml_viewer_ai_base_url";
pub const AI_API_KEY_KEY: &str = "@puml_viewer_ai_api_key";
pub const AI_MODEL_KEY: &str = "@puml_viewer_ai_model";

pub const DEFAULT_API_URL: &str = "https://spuml.mewis.me";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenAi,
    OpenRouter,
    Custom,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "openai",
            AiProvider::OpenRouter => "openrouter",
            AiProvider::Custom => "custom",
        }
    }

    /// Known base URL; `None` for custom providers.
    pub fn base_url(&self) -> Option<&'static str> {
        match self {
            AiProvider::OpenAi => Some("https://api.openai.com/v1"),
            AiProvider::OpenRouter => Some("https://openrouter.ai/api/v1"),
            AiProvider::Custom => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "gpt-4o-mini",
            AiProvider::OpenRouter => "openai/gpt-4o-mini",
            AiProvider::Custom => "",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(AiProvider::OpenAi),
            "openrouter" => Ok(AiProvider::OpenRouter),
            "custom" => Ok(AiProvider::Custom),
            other => Err(SettingsError::Invalid(format!("unknown AI provider '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: AiProvider,
    pub custom_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
}

impl AiSettings {
    pub fn base_url(&self) -> Option<String> {
        match self.provider.base_url() {
            Some(url) => Some(url.to_string()),
            None => self.custom_base_url.clone(),
        }
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        let provider = AiProvider::default();
        Self {
            provider,
            custom_base_url: None,
            api_key: None,
            model: provider.default_model().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_url: String,
    pub auto_render: bool,
    pub ai: AiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auto_render: true,
            ai: AiSettings::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

pub struct SettingsStore<S> {
    storage: S,
    current: RwLock<Settings>,
    write: Mutex<()>,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub async fn open(storage: S) -> Self {
        let store = Self {
            storage,
            current: RwLock::new(Settings::default()),
            write: Mutex::new(()),
        };
        store.load().await;
        store
    }

    pub fn current(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Missing or unreadable values keep their defaults.
    pub async fn load(&self) {
        let _guard = self.write.lock().await;
        let mut s = Settings::default();
        if let Some(url) = self.read(API_URL_KEY).await {
            s.api_url = url;
        }
        if let Some(v) = self.read(AUTO_RENDER_KEY).await {
            s.auto_render = v == "true";
        }
        if let Some(p) = self.read(AI_PROVIDER_KEY).await {
            match p.parse::<AiProvider>() {
                Ok(p) => {
                    s.ai.provider = p;
                    s.ai.model = p.default_model().to_string();
                }
                Err(e) => warn!(target: "settings", "{}", e),
            }
        }
        s.ai.custom_base_url = self.read(AI_BASE_URL_KEY).await;
        s.ai.api_key = self.read(AI_API_KEY_KEY).await;
        if let Some(m) = self.read(AI_MODEL_KEY).await {
            s.ai.model = m;
        }
        debug!(target: "settings", "loaded settings api_url={} provider={}", s.api_url, s.ai.provider);
        self.replace(s);
    }

    pub async fn set_api_url(&self, url: &str) -> Result<(), SettingsError> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(SettingsError::Invalid("API URL must not be empty".into()));
        }
        self.update(API_URL_KEY, Some(url), |s| s.api_url = url.to_string())
            .await
    }

    pub async fn set_auto_render(&self, enabled: bool) -> Result<(), SettingsError> {
        let v = if enabled { "true" } else { "false" };
        self.update(AUTO_RENDER_KEY, Some(v), |s| s.auto_render = enabled)
            .await
    }

    /// Switching provider also resets the model to the provider's default.
    /// Both keys are written before either change is published; a failed
    /// model write puts the previous provider back.
    pub async fn set_ai_provider(&self, provider: AiProvider) -> Result<(), SettingsError> {
        let _guard = self.write.lock().await;
        let previous = self.current();
        let model = provider.default_model();
        self.storage.set(AI_PROVIDER_KEY, provider.as_str()).await?;
        if let Err(e) = self.storage.set(AI_MODEL_KEY, model).await {
            if let Err(restore) = self
                .storage
                .set(AI_PROVIDER_KEY, previous.ai.provider.as_str())
                .await
            {
                warn!(target: "settings", "failed to restore AI provider: {}", restore);
            }
            return Err(e.into());
        }
        let mut next = previous;
        next.ai.provider = provider;
        next.ai.model = model.to_string();
        self.replace(next);
        Ok(())
    }

    pub async fn set_ai_base_url(&self, url: Option<&str>) -> Result<(), SettingsError> {
        let url = non_empty(url);
        self.update(AI_BASE_URL_KEY, url, |s| {
            s.ai.custom_base_url = url.map(str::to_string)
        })
        .await
    }

    pub async fn set_ai_api_key(&self, key: Option<&str>) -> Result<(), SettingsError> {
        let key = non_empty(key);
        self.update(AI_API_KEY_KEY, key, |s| s.ai.api_key = key.map(str::to_string))
            .await
    }

    pub async fn set_ai_model(&self, model: &str) -> Result<(), SettingsError> {
        let model = model.trim();
        let stored = (!model.is_empty()).then_some(model);
        self.update(AI_MODEL_KEY, stored, |s| {
            s.ai.model = stored.unwrap_or(s.ai.provider.default_model()).to_string()
        })
        .await
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "settings", "failed to read {}: {}", key, e);
                None
            }
        }
    }

    // Persist first; memory only changes once the write went through.
    async fn update(
        &self,
        key: &str,
        value: Option<&str>,
        apply: impl FnOnce(&mut Settings),
    ) -> Result<(), SettingsError> {
        let _guard = self.write.lock().await;
        match value {
            Some(v) => self.storage.set(key, v).await?,
            None => self.storage.remove(key).await?,
        }
        let mut next = self.current();
        apply(&mut next);
        self.replace(next);
        Ok(())
    }

    fn replace(&self, s: Settings) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = s;
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|v| !v.is_empty())
}
