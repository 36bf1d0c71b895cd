use std::path::Path;

use anyhow::{anyhow, bail, Result};
use puml_core::history::{HistoryFilter, HistoryItem, HistoryUpdate};
use puml_core::render::RenderType;

use super::render::render_and_record;
use super::App;
use crate::strings;

impl App {
    pub fn history_list(&self, filter: HistoryFilter, query: Option<&str>) -> Result<()> {
        let items = self.history.search(filter, query.unwrap_or(""));
        if self.json {
            return self.print_json(&items);
        }
        if items.is_empty() {
            let msg = if self.history.is_empty() {
                strings::EMPTY_HISTORY
            } else {
                strings::NO_MATCHES
            };
            println!("{}", msg);
            return Ok(());
        }
        for item in &items {
            println!("{}", strings::history_row(item, self.width));
        }
        Ok(())
    }

    pub fn history_show(&self, id: &str) -> Result<()> {
        let item = self.resolve_id(id)?;
        if self.json {
            return self.print_json(&item);
        }
        for line in strings::item_details(&item) {
            println!("{}", line);
        }
        println!();
        println!("{}", item.puml_code);
        Ok(())
    }

    pub async fn history_remove(&self, id: &str) -> Result<()> {
        let item = self.resolve_id(id)?;
        if self.history.remove(&item.id).await? {
            println!("[info] removed {}", strings::short_id(&item.id));
        }
        Ok(())
    }

    pub async fn history_clear(&self, confirmed: bool) -> Result<()> {
        if !confirmed {
            bail!(strings::CLEAR_NEEDS_CONFIRM);
        }
        let total = self.history.len();
        self.history.clear().await?;
        println!("[info] cleared {} entries", total);
        Ok(())
    }

    pub async fn history_favorite(&self, id: &str) -> Result<()> {
        let item = self.resolve_id(id)?;
        if let Some(fav) = self.history.toggle_favorite(&item.id).await? {
            let state = if fav { "added to" } else { "removed from" };
            println!("[info] {} {} favorites", strings::short_id(&item.id), state);
        }
        Ok(())
    }

    pub async fn history_rename(&self, id: &str, title: Option<&str>) -> Result<()> {
        let item = self.resolve_id(id)?;
        let update = match title {
            Some(t) => HistoryUpdate::title(t),
            None => HistoryUpdate::clear_title(),
        };
        if let Some(updated) = self.history.update(&item.id, update).await? {
            println!("{}", strings::history_row(&updated, self.width));
        }
        Ok(())
    }

    pub fn history_stats(&self) -> Result<()> {
        let stats = self.history.statistics();
        if self.json {
            return self.print_json(&stats);
        }
        for line in strings::statistics_lines(&stats) {
            println!("{}", line);
        }
        Ok(())
    }

    /// Render a recorded diagram again, optionally in another format.
    pub async fn history_rerender(
        &self,
        id: &str,
        kind: Option<RenderType>,
        output: Option<&Path>,
    ) -> Result<()> {
        let item = self.resolve_id(id)?;
        let client = self.client()?;
        let kind = kind.unwrap_or(item.render_type);
        let fresh =
            render_and_record(&self.history, &client, &item.puml_code, kind, item.title.clone())
                .await?;
        self.show_render(&client, &fresh, output).await
    }

    fn resolve_id(&self, needle: &str) -> Result<HistoryItem> {
        find_by_prefix(&self.history.history(), needle).cloned()
    }
}

/// Exact id match, else a unique id prefix.
pub fn find_by_prefix<'a>(items: &'a [HistoryItem], needle: &str) -> Result<&'a HistoryItem> {
    let needle = needle.trim();
    if needle.is_empty() {
        bail!("empty history id");
    }
    if let Some(exact) = items.iter().find(|h| h.id == needle) {
        return Ok(exact);
    }
    let mut matches = items.iter().filter(|h| h.id.starts_with(needle));
    match (matches.next(), matches.next()) {
        (Some(one), None) => Ok(one),
        (Some(_), Some(_)) => Err(anyhow!("history id '{}' is ambiguous", needle)),
        (None, _) => Err(anyhow!("no history entry matches '{}'", needle)),
    }
}
