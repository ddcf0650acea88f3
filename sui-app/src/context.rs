use serde::Deserialize;
use std::str::FromStr;
use sui_youtube::ChatMessage;

/// Messages kept before the triggering one.
pub const CONTEXT_LOOKBEHIND: usize = 8;
/// Hard cap applied again, independently, when the prompt is assembled.
pub const PROMPT_CONTEXT_MAX: usize = 10;

/// The historical behavior includes the triggering message and everything
/// after it in the fetched page. Whether that is intended is an open
/// question upstream, so both behaviors are selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextPolicy {
    #[default]
    IncludeTrailing,
    PrecedingOnly,
}

impl FromStr for ContextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include-trailing" => Ok(Self::IncludeTrailing),
            "preceding-only" => Ok(Self::PrecedingOnly),
            other => Err(format!(
                "unknown context policy {other:?}; expected include-trailing or preceding-only"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub who: String,
    pub text: String,
}

/// Window from `max(0, match_index - 8)` onward, chronological order.
/// `IncludeTrailing` runs through the end of the page; `PrecedingOnly`
/// stops at the triggering message itself.
pub fn build_context(
    messages: &[ChatMessage],
    match_index: usize,
    policy: ContextPolicy,
) -> Vec<ContextEntry> {
    let start = match_index.saturating_sub(CONTEXT_LOOKBEHIND);
    let end = match policy {
        ContextPolicy::IncludeTrailing => messages.len(),
        ContextPolicy::PrecedingOnly => (match_index + 1).min(messages.len()),
    };
    messages[start..end]
        .iter()
        .map(|m| ContextEntry {
            who: m.author.clone(),
            text: m.text.clone(),
        })
        .collect()
}

/// Most recent `PROMPT_CONTEXT_MAX` entries.
pub fn trim_for_prompt(entries: &[ContextEntry]) -> &[ContextEntry] {
    let start = entries.len().saturating_sub(PROMPT_CONTEXT_MAX);
    &entries[start..]
}
