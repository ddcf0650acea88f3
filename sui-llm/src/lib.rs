//! BYO-key Gemini completion client for suisui.
//!
//! Pure HTTP client: no persona, no chat-platform knowledge.

mod error;
mod gemini;
mod types;

pub use error::{LlmError, Result};
pub use gemini::GeminiClient;
pub use types::{PromptTurn, Role};
