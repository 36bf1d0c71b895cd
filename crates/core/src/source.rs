//! Helpers for diagram source text before submission and after AI replies.

const THEME: &str = "!theme";
const PLAIN: &str = "plain";
const START: &str = "@startuml";
const END: &str = "@enduml";

/// Remove `!theme plain` directives (any case, any spacing) together with the
/// whitespace that follows them.
pub fn strip_theme_plain(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0usize;
    while let Some(found) = lower[pos..].find(THEME) {
        let start = pos + found;
        let after_theme = start + THEME.len();
        let gap = skip_whitespace(text, after_theme);
        if gap > after_theme && lower[gap..].starts_with(PLAIN) {
            let end = skip_whitespace(text, gap + PLAIN.len());
            out.push_str(&text[pos..start]);
            pos = end;
        } else {
            out.push_str(&text[pos..after_theme]);
            pos = after_theme;
        }
    }
    out.push_str(&text[pos..]);
    out
}

/// Pull the first `@startuml ... @enduml` block out of free-form text.
pub fn extract_puml(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find(START)?;
    let end = start + lower[start..].find(END)? + END.len();
    Some(text[start..end].to_string())
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}
