use std::path::Path;

use anyhow::{bail, Context, Result};
use puml_core::history::{HistoryItem, HistoryStore, NewHistoryItem};
use puml_core::render::{RenderClient, RenderType};
use puml_core::source::strip_theme_plain;
use puml_core::storage::KeyValueStore;
use tracing::info;

use super::{read_source, App};
use crate::strings;

impl App {
    pub async fn render(
        &self,
        input: Option<&Path>,
        kind: RenderType,
        title: Option<String>,
        output: Option<&Path>,
    ) -> Result<()> {
        let source = read_source(input).await?;
        let client = self.client()?;
        let item = render_and_record(&self.history, &client, &source, kind, title).await?;
        self.show_render(&client, &item, output).await
    }

    /// Load shared source by id; `save` records it like an opened share link.
    pub async fn fetch(&self, id: &str, save: bool, output: Option<&Path>) -> Result<()> {
        let client = self.client()?;
        let source = client
            .fetch_source(id)
            .await
            .with_context(|| format!("fetch diagram {}", id))?;
        if !save {
            println!("{}", source);
            return Ok(());
        }
        let item = record_shared(&self.history, &client, id, &source).await?;
        self.show_render(&client, &item, output).await
    }

    pub(crate) async fn show_render(
        &self,
        client: &impl RenderClient,
        item: &HistoryItem,
        output: Option<&Path>,
    ) -> Result<()> {
        if self.json {
            return self.print_json(item);
        }
        match (item.render_type, output) {
            (kind, Some(path)) => {
                let bytes = client.raw_bytes(kind, &item.render_id).await?;
                tokio::fs::write(path, &bytes)
                    .await
                    .with_context(|| format!("write {}", path.display()))?;
                println!("wrote {} bytes to {}", bytes.len(), path.display());
            }
            (RenderType::Text, None) => {
                println!("{}", client.raw_text(RenderType::Text, &item.render_id).await?);
            }
            (kind, None) => {
                let url = item
                    .preview_url
                    .clone()
                    .unwrap_or_else(|| client.raw_url(kind, &item.render_id));
                println!("{}", url);
            }
        }
        println!("{}", strings::render_recorded(item));
        Ok(())
    }
}

/// Submit source for rendering and record the result in history.
pub async fn render_and_record<S: KeyValueStore, C: RenderClient>(
    history: &HistoryStore<S>,
    client: &C,
    source: &str,
    kind: RenderType,
    title: Option<String>,
) -> Result<HistoryItem> {
    let cleaned = strip_theme_plain(source);
    if cleaned.trim().is_empty() {
        bail!(strings::EMPTY_SOURCE);
    }
    let render_id = client
        .render(kind, &cleaned)
        .await
        .context("render request failed")?;
    let preview_url = kind
        .has_preview_url()
        .then(|| client.raw_url(kind, &render_id));
    let item = history
        .add(NewHistoryItem {
            puml_code: cleaned,
            render_id,
            render_type: kind,
            preview_url,
            title,
        })
        .await
        .context("save history")?;
    info!(target: "cli", "rendered {} as {}", item.render_type, item.render_id);
    Ok(item)
}

/// Record a shared diagram id; the service renders those ids as png.
pub async fn record_shared<S: KeyValueStore, C: RenderClient>(
    history: &HistoryStore<S>,
    client: &C,
    id: &str,
    source: &str,
) -> Result<HistoryItem> {
    let item = history
        .add(NewHistoryItem {
            puml_code: strip_theme_plain(source),
            render_id: id.to_string(),
            render_type: RenderType::Png,
            preview_url: Some(client.raw_url(RenderType::Png, id)),
            title: None,
        })
        .await
        .context("save history")?;
    Ok(item)
}

/// Share source and record the returned id.
pub async fn share_and_record<S: KeyValueStore, C: RenderClient>(
    history: &HistoryStore<S>,
    client: &C,
    source: &str,
) -> Result<HistoryItem> {
    let cleaned = strip_theme_plain(source);
    if cleaned.trim().is_empty() {
        bail!(strings::EMPTY_SOURCE);
    }
    let id = client.share(&cleaned).await.context("share request failed")?;
    record_shared(history, client, &id, &cleaned).await
}
