//! Persona prompt assembly on top of the Gemini client.

use crate::context::{ContextEntry, trim_for_prompt};
use sui_llm::{GeminiClient, LlmError, PromptTurn};

/// Reply-generation seam for the run cycle; faked in cycle tests.
#[async_trait::async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        context: &[ContextEntry],
        target_user: &str,
        target_text: &str,
    ) -> Result<String, LlmError>;
}

pub struct GeminiReplyGenerator {
    client: GeminiClient,
    persona: String,
}

impl GeminiReplyGenerator {
    pub fn new(client: GeminiClient, bot_name: &str) -> Self {
        Self {
            client,
            persona: persona_instruction(bot_name),
        }
    }
}

#[async_trait::async_trait]
impl ReplyGenerator for GeminiReplyGenerator {
    #[tracing::instrument(level = "info", skip_all, fields(target_user = %target_user))]
    async fn generate_reply(
        &self,
        context: &[ContextEntry],
        target_user: &str,
        target_text: &str,
    ) -> Result<String, LlmError> {
        let prompt = build_prompt(context, target_user, target_text);
        self.client
            .generate(&self.persona, &[PromptTurn::user(prompt)])
            .await
    }
}

fn persona_instruction(bot_name: &str) -> String {
    format!(
        "You are {bot_name}, a friendly co-host hanging out in a YouTube live chat. \
         Keep replies to one or two short sentences, stay warm and casual, ask a \
         follow-up question now and then, and use at most one emoji."
    )
}

/// Recent chat as `who: text` lines (last 10 at most), then the target
/// viewer's message as the thing to answer.
fn build_prompt(context: &[ContextEntry], target_user: &str, target_text: &str) -> String {
    let mut prompt = String::from("Recent chat:\n");
    for entry in trim_for_prompt(context) {
        prompt.push_str(&entry.who);
        prompt.push_str(": ");
        prompt.push_str(&entry.text);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nReply to {target_user}, who just said: {target_text}"
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<ContextEntry> {
        (0..n)
            .map(|i| ContextEntry {
                who: format!("user{i}"),
                text: format!("line {i}"),
            })
            .collect()
    }

    #[test]
    fn prompt_names_the_target_user_and_message() {
        let prompt = build_prompt(&entries(3), "alice", "hey sui tell a story");
        assert!(prompt.contains("Reply to alice, who just said: hey sui tell a story"));
    }

    #[test]
    fn prompt_formats_context_as_who_text_lines() {
        let prompt = build_prompt(&entries(2), "bob", "hi");
        assert!(prompt.contains("user0: line 0\n"));
        assert!(prompt.contains("user1: line 1\n"));
    }

    #[test]
    fn oversized_context_is_trimmed_to_the_last_ten_lines() {
        let prompt = build_prompt(&entries(14), "bob", "hi");
        assert!(!prompt.contains("user3: line 3"));
        assert!(prompt.contains("user4: line 4"));
        assert!(prompt.contains("user13: line 13"));
    }

    #[test]
    fn persona_mentions_the_configured_bot_name() {
        assert!(persona_instruction("Sui Sui").starts_with("You are Sui Sui,"));
    }
}
