use std::path::Path;

use anyhow::{bail, Context, Result};
use puml_core::assist::AssistClient;
use puml_core::render::RenderType;
use puml_core::source::strip_theme_plain;

use super::render::{render_and_record, share_and_record};
use super::{read_source, App};
use crate::strings;

impl App {
    pub async fn ai_generate(
        &self,
        prompt: &str,
        conversation: Option<&str>,
        render: bool,
    ) -> Result<()> {
        if prompt.trim().is_empty() {
            bail!(strings::EMPTY_PROMPT);
        }
        let client = self.client()?;
        let creds = client.config().assist_credentials()?;
        let generated = client
            .generate(&creds, prompt.trim(), conversation)
            .await
            .context("generate request failed")?;

        if self.json {
            self.print_json(&serde_json::json!({
                "content": generated.content,
                "puml": generated.puml,
                "conversationId": generated.conversation_id,
            }))?;
        } else {
            println!("{}", strings::wrap(&generated.content, self.width));
            if let Some(c) = &generated.conversation_id {
                println!("[info] conversation {} (pass --conversation to continue)", c);
            }
        }

        if render {
            match &generated.puml {
                Some(code) => {
                    let item = share_and_record(&self.history, &client, code).await?;
                    self.show_render(&client, &item, None).await?;
                }
                None => println!("{}", strings::NO_DIAGRAM_IN_REPLY),
            }
        }
        Ok(())
    }

    pub async fn ai_explain(&self, input: Option<&Path>, language: &str) -> Result<()> {
        let source = strip_theme_plain(&read_source(input).await?);
        if source.trim().is_empty() {
            bail!(strings::EMPTY_SOURCE);
        }
        let client = self.client()?;
        let creds = client.config().assist_credentials()?;
        let explanation = client
            .explain(&creds, &source, language)
            .await
            .context("explain request failed")?;
        if self.json {
            return self.print_json(&serde_json::json!({ "explanation": explanation }));
        }
        println!("{}", strings::wrap(&explanation, self.width));
        Ok(())
    }

    /// Optimized source is rendered as png when auto-render is on.
    pub async fn ai_optimize(&self, input: Option<&Path>) -> Result<()> {
        let source = strip_theme_plain(&read_source(input).await?);
        if source.trim().is_empty() {
            bail!(strings::EMPTY_SOURCE);
        }
        let client = self.client()?;
        let creds = client.config().assist_credentials()?;
        let optimized = client
            .optimize(&creds, &source)
            .await
            .context("optimize request failed")?;
        if self.json {
            self.print_json(&serde_json::json!({ "puml": optimized }))?;
        } else {
            println!("{}", optimized);
        }

        if self.settings.current().auto_render && !optimized.trim().is_empty() {
            let item =
                render_and_record(&self.history, &client, &optimized, RenderType::Png, None)
                    .await?;
            self.show_render(&client, &item, None).await?;
        }
        Ok(())
    }
}
