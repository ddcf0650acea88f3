//! One fetch → detect → dedupe → generate → post pass.

use crate::assistant::ReplyGenerator;
use crate::config::ChatSection;
use crate::context::build_context;
use crate::state::DedupStore;
use crate::trigger::find_latest_trigger;
use serde::Serialize;
use sui_llm::LlmError;
use sui_youtube::{ChatError, LiveChat, LiveChatId};
use thiserror::Error;

/// Terminal states of a cycle. `NoCommand` and `DuplicateSkipped` are
/// normal outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    Posted { reply: String },
    NoCommand,
    DuplicateSkipped,
}

impl RunOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            RunOutcome::Posted { .. } => "posted",
            RunOutcome::NoCommand => "no-command",
            RunOutcome::DuplicateSkipped => "duplicate-skipped",
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("completion returned no usable text")]
    EmptyReply,
}

impl From<ChatError> for CycleError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Config(msg) => Self::Config(msg),
            ChatError::Auth(msg) => Self::Auth(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<LlmError> for CycleError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::EmptyReply => Self::EmptyReply,
            other => Self::Generation(other.to_string()),
        }
    }
}

pub struct CycleDeps<'a> {
    pub chat: &'a dyn LiveChat,
    pub generator: &'a dyn ReplyGenerator,
    pub dedupe: &'a dyn DedupStore,
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn run_cycle(deps: CycleDeps<'_>, cfg: &ChatSection) -> Result<RunOutcome, CycleError> {
    if cfg.live_chat_id.trim().is_empty() {
        return Err(CycleError::Config(
            "no live chat configured; set LIVE_CHAT_ID (see /livechatid)".to_string(),
        ));
    }
    let chat_id = LiveChatId::new(cfg.live_chat_id.clone());

    let messages = deps
        .chat
        .fetch_recent(&chat_id, cfg.fetch_max_results)
        .await?;
    tracing::debug!(page_len = messages.len(), "fetched live chat page");

    let Some(m) = find_latest_trigger(&messages, &cfg.triggers) else {
        return Ok(RunOutcome::NoCommand);
    };
    let target = &messages[m.index];

    let last_replied = deps
        .dedupe
        .last_replied()
        .await
        .map_err(|e| CycleError::Upstream(format!("state store: {e}")))?;
    if last_replied.as_deref() == Some(target.id.as_str()) {
        tracing::info!(message_id = %target.id, "already replied to this message");
        return Ok(RunOutcome::DuplicateSkipped);
    }

    let context = build_context(&messages, m.index, cfg.context_policy);
    let reply = deps
        .generator
        .generate_reply(&context, &target.author, &target.text)
        .await?;

    let posted = deps.chat.post(&chat_id, &reply).await?;
    tracing::info!(message_id = %target.id, posted_id = %posted, "reply posted");

    // The post succeeded; a store failure here must not turn the outcome
    // into an error, or the caller would re-post on retry.
    if let Err(e) = deps.dedupe.record_replied(target.id.as_str()).await {
        tracing::warn!(%e, message_id = %target.id, "failed to record replied message id");
    }

    Ok(RunOutcome::Posted { reply })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextEntry;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sui_youtube::{ChatMessage, MessageId};

    struct FakeChat {
        page: Vec<ChatMessage>,
        posted: Mutex<Vec<String>>,
        fail_post: bool,
    }

    impl FakeChat {
        fn with_page(page: Vec<ChatMessage>) -> Self {
            Self {
                page,
                posted: Mutex::new(Vec::new()),
                fail_post: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl LiveChat for FakeChat {
        async fn fetch_recent(
            &self,
            _chat_id: &LiveChatId,
            _max_results: u32,
        ) -> Result<Vec<ChatMessage>, ChatError> {
            Ok(self.page.clone())
        }

        async fn post(&self, _chat_id: &LiveChatId, text: &str) -> Result<MessageId, ChatError> {
            if self.fail_post {
                return Err(ChatError::Upstream {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.posted.lock().expect("lock").push(text.to_string());
            Ok(MessageId::new("posted-1"))
        }
    }

    struct FakeGenerator {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReplyGenerator for FakeGenerator {
        async fn generate_reply(
            &self,
            _context: &[ContextEntry],
            _target_user: &str,
            _target_text: &str,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(LlmError::EmptyReply),
            }
        }
    }

    struct MemoryDedup {
        last: Mutex<Option<String>>,
    }

    impl MemoryDedup {
        fn empty() -> Self {
            Self {
                last: Mutex::new(None),
            }
        }

        fn with_last(id: &str) -> Self {
            Self {
                last: Mutex::new(Some(id.to_string())),
            }
        }
    }

    #[async_trait::async_trait]
    impl DedupStore for MemoryDedup {
        async fn last_replied(&self) -> anyhow::Result<Option<String>> {
            Ok(self.last.lock().expect("lock").clone())
        }

        async fn record_replied(&self, message_id: &str) -> anyhow::Result<()> {
            *self.last.lock().expect("lock") = Some(message_id.to_string());
            Ok(())
        }
    }

    fn msg(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            author: "viewer".to_string(),
            text: text.to_string(),
            published_at: Utc::now(),
        }
    }

    fn cfg() -> ChatSection {
        ChatSection {
            live_chat_id: "chat-1".to_string(),
            ..ChatSection::default()
        }
    }

    #[tokio::test]
    async fn no_trigger_reports_no_command_and_posts_nothing() {
        let chat = FakeChat::with_page(vec![msg("a", "hello"), msg("b", "nice stream")]);
        let generator = FakeGenerator::replying("unused");
        let dedupe = MemoryDedup::empty();

        let outcome = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &cfg(),
        )
        .await
        .expect("cycle");

        assert_eq!(outcome, RunOutcome::NoCommand);
        assert!(chat.posted.lock().expect("lock").is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_match_skips_without_calling_generation() {
        let chat = FakeChat::with_page(vec![msg("a", "hello"), msg("b", "sui sui hi")]);
        let generator = FakeGenerator::replying("unused");
        let dedupe = MemoryDedup::with_last("b");

        let outcome = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &cfg(),
        )
        .await
        .expect("cycle");

        assert_eq!(outcome, RunOutcome::DuplicateSkipped);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(chat.posted.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn fresh_trigger_posts_reply_and_records_dedup_id() {
        let chat = FakeChat::with_page(vec![msg("a", "hello"), msg("b", "sui sui hi")]);
        let generator = FakeGenerator::replying("hey there! 👋");
        let dedupe = MemoryDedup::with_last("older-message");

        let outcome = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &cfg(),
        )
        .await
        .expect("cycle");

        assert_eq!(
            outcome,
            RunOutcome::Posted {
                reply: "hey there! 👋".to_string()
            }
        );
        let posted = chat.posted.lock().expect("lock");
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0], "hey there! 👋");
        assert_eq!(
            dedupe.last.lock().expect("lock").as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn empty_reply_fails_without_posting_or_touching_dedup() {
        let chat = FakeChat::with_page(vec![msg("b", "sui sui hi")]);
        let generator = FakeGenerator::empty();
        let dedupe = MemoryDedup::with_last("older-message");

        let err = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &cfg(),
        )
        .await
        .expect_err("cycle should fail");

        assert!(matches!(err, CycleError::EmptyReply));
        assert!(chat.posted.lock().expect("lock").is_empty());
        assert_eq!(
            dedupe.last.lock().expect("lock").as_deref(),
            Some("older-message")
        );
    }

    #[tokio::test]
    async fn failed_post_keeps_dedup_id_for_a_later_retry() {
        let mut chat = FakeChat::with_page(vec![msg("b", "sui sui hi")]);
        chat.fail_post = true;
        let generator = FakeGenerator::replying("hey!");
        let dedupe = MemoryDedup::empty();

        let err = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &cfg(),
        )
        .await
        .expect_err("cycle should fail");

        assert!(matches!(err, CycleError::Upstream(_)));
        assert_eq!(dedupe.last.lock().expect("lock").as_deref(), None);
    }

    #[tokio::test]
    async fn missing_chat_id_is_a_config_error() {
        let chat = FakeChat::with_page(vec![]);
        let generator = FakeGenerator::replying("unused");
        let dedupe = MemoryDedup::empty();

        let err = run_cycle(
            CycleDeps {
                chat: &chat,
                generator: &generator,
                dedupe: &dedupe,
            },
            &ChatSection::default(),
        )
        .await
        .expect_err("cycle should fail");

        assert!(matches!(err, CycleError::Config(_)));
    }
}
