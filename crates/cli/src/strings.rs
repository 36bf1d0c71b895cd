// Centralized CLI strings and listing layout. ASCII-friendly by default.

use chrono::{DateTime, Local};
use puml_core::history::{HistoryItem, Statistics};
use puml_core::render::RenderType;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

pub const EMPTY_HISTORY: &str = "No history yet. Render a diagram to get started.";
pub const NO_MATCHES: &str = "No history entries match.";
pub const EMPTY_SOURCE: &str = "please enter PlantUML code";
pub const EMPTY_PROMPT: &str = "please enter a prompt";
pub const NO_DIAGRAM_IN_REPLY: &str = "[info] reply contains no @startuml/@enduml block";
pub const CLEAR_NEEDS_CONFIRM: &str = "refusing to clear history without --yes";
pub const FAVORITE_MARK: &str = "*";

const ID_WIDTH: usize = 8;
const ELLIPSIS: &str = "...";

pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(100)
        .max(40)
}

pub fn format_timestamp(ms: u64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Cut `s` to at most `max` display columns, ending in "..." when shortened.
pub fn truncate_to_width(s: &str, max: usize) -> String {
    if UnicodeWidthStr::width(s) <= max {
        return s.to_string();
    }
    let budget = max.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0usize;
    for g in s.graphemes(true) {
        let w = UnicodeWidthStr::width(g);
        if used + w > budget {
            break;
        }
        out.push_str(g);
        used += w;
    }
    if max >= ELLIPSIS.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(ID_WIDTH) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

// Title when set, otherwise the first meaningful source line.
pub fn summary(item: &HistoryItem) -> String {
    if let Some(t) = &item.title {
        return t.clone();
    }
    item.puml_code
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.to_ascii_lowercase().starts_with("@startuml"))
        .unwrap_or("(empty diagram)")
        .to_string()
}

pub fn history_row(item: &HistoryItem, width: usize) -> String {
    let fav = if item.is_favorite { FAVORITE_MARK } else { " " };
    let head = format!(
        "{:<idw$}  {}  {:<4}  {}  ",
        short_id(&item.id),
        fav,
        item.render_type.as_str(),
        format_timestamp(item.created_at),
        idw = ID_WIDTH
    );
    let rest = width.saturating_sub(UnicodeWidthStr::width(head.as_str()));
    format!("{}{}", head, truncate_to_width(&summary(item), rest))
}

pub fn item_details(item: &HistoryItem) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", item.id),
        format!("render id: {}", item.render_id),
        format!("type:      {}", item.render_type),
        format!("created:   {}", format_timestamp(item.created_at)),
        format!("favorite:  {}", if item.is_favorite { "yes" } else { "no" }),
    ];
    if let Some(t) = &item.title {
        lines.push(format!("title:     {}", t));
    }
    if let Some(u) = &item.preview_url {
        lines.push(format!("preview:   {}", u));
    }
    lines
}

pub fn statistics_lines(stats: &Statistics) -> Vec<String> {
    vec![
        format!("Total:     {}", stats.total),
        format!(
            "By type:   {}",
            RenderType::ALL
                .iter()
                .map(|k| format!("{} {}", k, stats.by_type.get(*k)))
                .collect::<Vec<_>>()
                .join("  |  ")
        ),
        format!("Favorites: {}", stats.favorites),
    ]
}

pub fn render_recorded(item: &HistoryItem) -> String {
    format!(
        "[info] recorded {} render {} as {}",
        item.render_type,
        item.render_id,
        short_id(&item.id)
    )
}

pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 8 => "****".to_string(),
        Some(s) => {
            let tail: String = s.chars().skip(s.chars().count() - 4).collect();
            format!("****{}", tail)
        }
    }
}

pub fn wrap(text: &str, width: usize) -> String {
    textwrap::fill(text, width)
}
