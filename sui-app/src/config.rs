//! suisui configuration loader.
//!
//! Optional TOML file, then environment overrides, then validation.
//! The bot is fully configurable from the environment alone.

use crate::context::ContextPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub oauth: OAuthSection,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthSection {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_output_tokens() -> u32 {
    256
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSection {
    #[serde(default)]
    pub live_chat_id: String,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Lower-cased at load; a message matches when it contains any entry.
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
    /// Pre-seeded credential, written to the state store only when the
    /// store holds no token yet.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_fetch_max_results")]
    pub fetch_max_results: u32,
    #[serde(default)]
    pub context_policy: ContextPolicy,
}

fn default_bot_name() -> String {
    "Sui Sui".to_string()
}

fn default_triggers() -> Vec<String> {
    vec![
        "sui sui".to_string(),
        "hey sui".to_string(),
        "@suisui".to_string(),
    ]
}

fn default_fetch_max_results() -> u32 {
    200
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            live_chat_id: String::new(),
            bot_name: default_bot_name(),
            triggers: default_triggers(),
            refresh_token: None,
            fetch_max_results: default_fetch_max_results(),
            context_policy: ContextPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_state_db")]
    pub state_db: String,
}

fn default_port() -> u16 {
    8080
}

fn default_state_db() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home)
        .join(".suisui")
        .join("state.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            state_db: default_state_db(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UpstreamSection {
    /// Extra attempts after the first on 429/5xx/transport failures.
    /// 0 keeps every vendor call single-shot.
    #[serde(default)]
    pub retry_attempts: u32,
}

impl BotConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
                toml::from_str(&contents)
                    .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?
            }
            None => {
                let path = default_config_path();
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => toml::from_str(&contents)
                        .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
                    Err(_) => BotConfig::default(),
                }
            }
        };

        cfg.apply_env_overrides();
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty("CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = env_nonempty("CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = env_nonempty("REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = env_nonempty("GEMINI_API_KEY") {
            self.gemini.api_key = v;
        }
        if let Some(v) = env_nonempty("GEMINI_MODEL") {
            self.gemini.model = v;
        }
        if let Some(v) = env_nonempty("LIVE_CHAT_ID") {
            self.chat.live_chat_id = v;
        }
        if let Some(v) = env_nonempty("BOT_NAME") {
            self.chat.bot_name = v;
        }
        if let Some(v) = env_nonempty("TRIGGERS") {
            self.chat.triggers = v.split(',').map(|s| s.to_string()).collect();
        }
        if let Some(v) = env_nonempty("REFRESH_TOKEN") {
            self.chat.refresh_token = Some(v);
        }
        if let Some(port) = env_nonempty("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = env_nonempty("SUISUI_STATE_DB") {
            self.server.state_db = v;
        }
        if let Some(n) = env_nonempty("SUISUI_RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.upstream.retry_attempts = n;
        }
        if let Some(policy) = env_nonempty("SUISUI_CONTEXT_POLICY").and_then(|v| v.parse().ok()) {
            self.chat.context_policy = policy;
        }
    }

    fn normalize(&mut self) {
        self.chat.triggers = self
            .chat
            .triggers
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if self.chat.triggers.is_empty() {
            self.chat.triggers = default_triggers();
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(anyhow::anyhow!("oauth.client_id (CLIENT_ID) is required"));
        }
        if self.oauth.client_secret.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "oauth.client_secret (CLIENT_SECRET) is required"
            ));
        }
        if self.oauth.redirect_uri.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "oauth.redirect_uri (REDIRECT_URI) is required"
            ));
        }
        if self.gemini.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("gemini.api_key (GEMINI_API_KEY) is required"));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(anyhow::anyhow!("gemini.model must not be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        if self.chat.fetch_max_results == 0 {
            return Err(anyhow::anyhow!("chat.fetch_max_results must be > 0"));
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".suisui").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(toml_str: &str) -> BotConfig {
        let mut cfg: BotConfig = toml::from_str(toml_str).expect("parse toml");
        cfg.normalize();
        cfg
    }

    #[test]
    fn triggers_are_lowercased_and_trimmed_at_load() {
        let cfg = parsed(
            r#"
            [chat]
            triggers = ["  Sui Sui ", "HEY SUI", ""]
            "#,
        );
        assert_eq!(cfg.chat.triggers, vec!["sui sui", "hey sui"]);
    }

    #[test]
    fn empty_trigger_list_falls_back_to_defaults() {
        let cfg = parsed(
            r#"
            [chat]
            triggers = ["   "]
            "#,
        );
        assert_eq!(cfg.chat.triggers.len(), 3);
    }

    #[test]
    fn defaults_cover_everything_but_secrets() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.chat.bot_name, "Sui Sui");
        assert_eq!(cfg.gemini.model, "gemini-2.0-flash");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.upstream.retry_attempts, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_oauth_and_gemini_settings() {
        let mut cfg = BotConfig::default();
        cfg.oauth.client_id = "cid".into();
        cfg.oauth.client_secret = "sec".into();
        cfg.oauth.redirect_uri = "https://example.com/oauth2/callback".into();
        assert!(cfg.validate().is_err());
        cfg.gemini.api_key = "key".into();
        assert!(cfg.validate().is_ok());
    }
}
