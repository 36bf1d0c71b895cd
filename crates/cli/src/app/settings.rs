use anyhow::{Context, Result};
use providers::puml_server::config::validate_base_url;
use puml_core::settings::AiProvider;

use super::App;
use crate::strings;

pub struct AiChanges<'a> {
    pub provider: Option<AiProvider>,
    pub base_url: Option<&'a str>,
    pub api_key: Option<&'a str>,
    pub model: Option<&'a str>,
}

impl App {
    pub fn settings_show(&self) -> Result<()> {
        let s = self.settings.current();
        if self.json {
            return self.print_json(&s);
        }
        println!("api url:      {}", s.api_url);
        println!("auto render:  {}", s.auto_render);
        println!("ai provider:  {}", s.ai.provider);
        println!(
            "ai base url:  {}",
            s.ai.base_url().unwrap_or_else(|| "(not set)".to_string())
        );
        println!("ai model:     {}", s.ai.model);
        println!("ai api key:   {}", strings::mask_secret(s.ai.api_key.as_deref()));
        Ok(())
    }

    pub async fn settings_set_api_url(&self, url: &str) -> Result<()> {
        let url = validate_base_url(url).with_context(|| format!("invalid API URL '{}'", url))?;
        self.settings.set_api_url(&url).await?;
        println!("[info] api url set to {}", url);
        Ok(())
    }

    pub async fn settings_set_auto_render(&self, enabled: bool) -> Result<()> {
        self.settings.set_auto_render(enabled).await?;
        println!("[info] auto render {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    pub async fn settings_set_ai(&self, changes: AiChanges<'_>) -> Result<()> {
        // provider first: it resets the model
        if let Some(p) = changes.provider {
            self.settings.set_ai_provider(p).await?;
        }
        if let Some(url) = changes.base_url {
            if !url.trim().is_empty() {
                validate_base_url(url).with_context(|| format!("invalid AI base URL '{}'", url))?;
            }
            self.settings.set_ai_base_url(Some(url)).await?;
        }
        if let Some(key) = changes.api_key {
            self.settings.set_ai_api_key(Some(key)).await?;
        }
        if let Some(m) = changes.model {
            self.settings.set_ai_model(m).await?;
        }
        self.settings_show()
    }
}
