//! Google OAuth2 and YouTube Data API v3 plumbing for suisui.
//!
//! This crate is pure I/O: consent URLs, token grants, live-chat message
//! list/insert. Policy (triggers, dedupe, persona) lives in the app crate.

mod credentials;
mod error;
mod live_chat;
mod oauth;
mod types;

pub use credentials::{CredentialStore, TokenManager};
pub use error::ChatError;
pub use live_chat::{LiveChat, LiveChatClient, RetryPolicy};
pub use oauth::{OAuthClient, TokenGrant, YOUTUBE_SCOPES};
pub use types::{ChatMessage, LiveChatId, MessageId};
