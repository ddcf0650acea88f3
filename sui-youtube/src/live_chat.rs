use crate::credentials::TokenManager;
use crate::error::ChatError;
use crate::types::{ChatMessage, LiveChatId, MessageId};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const MAX_PAGE_SIZE: u32 = 200;
const RETRY_BASE_MS: u64 = 500;
const RETRY_MAX_MS: u64 = 30_000;

/// Live-chat read/write seam consumed by the run cycle. Implemented by
/// `LiveChatClient`; faked in cycle tests.
#[async_trait::async_trait]
pub trait LiveChat: Send + Sync {
    /// Most recent page of messages, oldest-to-newest as the API returns them.
    async fn fetch_recent(
        &self,
        chat_id: &LiveChatId,
        max_results: u32,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    /// Post `text` to the chat, returning the new message's id.
    async fn post(&self, chat_id: &LiveChatId, text: &str) -> Result<MessageId, ChatError>;
}

/// Capped retry with doubling delay around each vendor call. `attempts`
/// counts retries after the first try; 0 preserves single-shot behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    pub attempts: u32,
}

pub struct LiveChatClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    retry: RetryPolicy,
}

impl LiveChatClient {
    pub fn new(tokens: Arc<TokenManager>, retry: RetryPolicy) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            http,
            tokens,
            retry,
        }
    }

    /// Chat id of the channel's currently active broadcast, if any.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn resolve_active_chat_id(&self) -> Result<Option<LiveChatId>, ChatError> {
        let token = self.tokens.access_token().await?;
        let body = self
            .execute("liveBroadcasts.list", || {
                self.http
                    .get(format!("{YOUTUBE_API_BASE}/liveBroadcasts"))
                    .bearer_auth(&token)
                    .query(&[
                        ("part", "snippet"),
                        ("broadcastStatus", "active"),
                        ("broadcastType", "all"),
                        ("mine", "true"),
                    ])
            })
            .await?;

        let parsed: BroadcastListResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Transport(format!("liveBroadcasts parse failed: {e}")))?;
        Ok(parsed
            .items
            .into_iter()
            .next()
            .and_then(|b| b.snippet.live_chat_id)
            .map(LiveChatId::new))
    }

    async fn execute<F>(&self, what: &str, build: F) -> Result<String, ChatError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let total = self.retry.attempts.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = build().send().await;
            let err = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(ChatError::from)?;
                    if status.is_success() {
                        return Ok(body);
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(ChatError::Auth(format!(
                            "{what} rejected the access token: body={body}"
                        )));
                    }
                    let err = ChatError::Upstream {
                        status: status.as_u16(),
                        body,
                    };
                    if !is_retryable_status(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => ChatError::from(e),
            };

            if attempt >= total {
                return Err(err);
            }
            let delay = retry_delay(attempt);
            tracing::warn!(%err, what, attempt, ?delay, "retryable upstream failure, backing off");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl LiveChat for LiveChatClient {
    #[tracing::instrument(level = "info", skip_all, fields(chat_id = %chat_id))]
    async fn fetch_recent(
        &self,
        chat_id: &LiveChatId,
        max_results: u32,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        if chat_id.as_str().trim().is_empty() {
            return Err(ChatError::Config("live chat id is empty".to_string()));
        }
        let token = self.tokens.access_token().await?;
        let max = clamp_page_size(max_results).to_string();

        let body = self
            .execute("liveChatMessages.list", || {
                self.http
                    .get(format!("{YOUTUBE_API_BASE}/liveChat/messages"))
                    .bearer_auth(&token)
                    .query(&[
                        ("liveChatId", chat_id.as_str()),
                        ("part", "snippet,authorDetails"),
                        ("maxResults", &max),
                    ])
            })
            .await?;

        let parsed: MessageListResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Transport(format!("liveChatMessages parse failed: {e}")))?;
        Ok(convert_page(parsed))
    }

    #[tracing::instrument(level = "info", skip_all, fields(chat_id = %chat_id))]
    async fn post(&self, chat_id: &LiveChatId, text: &str) -> Result<MessageId, ChatError> {
        if chat_id.as_str().trim().is_empty() {
            return Err(ChatError::Config("live chat id is empty".to_string()));
        }
        let token = self.tokens.access_token().await?;
        let payload = serde_json::json!({
            "snippet": {
                "liveChatId": chat_id.as_str(),
                "type": "textMessageEvent",
                "textMessageDetails": { "messageText": text },
            }
        });

        let body = self
            .execute("liveChatMessages.insert", || {
                self.http
                    .post(format!("{YOUTUBE_API_BASE}/liveChat/messages"))
                    .bearer_auth(&token)
                    .query(&[("part", "snippet")])
                    .json(&payload)
            })
            .await?;

        let parsed: InsertedMessage = serde_json::from_str(&body)
            .map_err(|e| ChatError::Transport(format!("insert response parse failed: {e}")))?;
        Ok(MessageId::new(parsed.id))
    }
}

fn clamp_page_size(max_results: u32) -> u32 {
    max_results.clamp(1, MAX_PAGE_SIZE)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = RETRY_BASE_MS.saturating_mul(1u64 << exp).min(RETRY_MAX_MS);
    Duration::from_millis(ms)
}

fn convert_page(page: MessageListResponse) -> Vec<ChatMessage> {
    page.items
        .into_iter()
        .filter_map(|item| {
            // Non-text events (super chats, membership notices) carry no
            // displayMessage; they cannot trigger and are dropped here.
            let text = item.snippet.display_message?;
            Some(ChatMessage {
                id: MessageId::new(item.id),
                author: item.author_details.display_name,
                text,
                published_at: item.snippet.published_at,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    items: Vec<MessageResource>,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    id: String,
    snippet: MessageSnippet,
    #[serde(rename = "authorDetails")]
    author_details: AuthorDetails,
}

#[derive(Debug, Deserialize)]
struct MessageSnippet {
    #[serde(rename = "displayMessage", default)]
    display_message: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AuthorDetails {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct InsertedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastListResponse {
    #[serde(default)]
    items: Vec<BroadcastResource>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResource {
    snippet: BroadcastSnippet,
}

#[derive(Debug, Deserialize)]
struct BroadcastSnippet {
    #[serde(rename = "liveChatId", default)]
    live_chat_id: Option<String>,
}
