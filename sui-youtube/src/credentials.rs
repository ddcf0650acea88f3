use crate::error::ChatError;
use crate::oauth::OAuthClient;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Refresh tokens are left early when fewer than this much lifetime remains.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Durable home for the one secret this bot holds. Implemented by the
/// app's state store; faked in tests.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn refresh_token(&self) -> anyhow::Result<Option<String>>;
    async fn store_refresh_token(&self, token: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Exchanges the stored refresh token for short-lived access tokens and
/// caches them in memory until shortly before expiry.
pub struct TokenManager {
    oauth: OAuthClient,
    store: Arc<dyn CredentialStore>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(oauth: OAuthClient, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            oauth,
            store,
            cached: Mutex::new(None),
        }
    }

    /// Current access token, refreshing through the OAuth client if the
    /// cached one is missing or about to expire.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn access_token(&self) -> Result<String, ChatError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if cache_usable(c.expires_at, Instant::now()) {
                return Ok(c.token.clone());
            }
        }

        let refresh_token = self
            .store
            .refresh_token()
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?
            .ok_or_else(|| {
                ChatError::Auth(
                    "no refresh token stored; open /auth and complete the consent flow".to_string(),
                )
            })?;

        let grant = self.oauth.refresh_access_token(&refresh_token).await?;
        if let Some(rotated) = grant.refresh_token.as_deref() {
            // Google occasionally rotates the refresh token on refresh.
            self.store
                .store_refresh_token(rotated)
                .await
                .map_err(|e| ChatError::Storage(e.to_string()))?;
        }

        let expires_at = Instant::now() + Duration::from_secs(grant.expires_in);
        *cached = Some(CachedToken {
            token: grant.access_token.clone(),
            expires_at,
        });
        tracing::debug!(expires_in = grant.expires_in, "access token refreshed");
        Ok(grant.access_token)
    }
}

fn cache_usable(expires_at: Instant, now: Instant) -> bool {
    expires_at > now + EXPIRY_MARGIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_is_reused_until_expiry_margin() {
        let now = Instant::now();
        assert!(cache_usable(now + Duration::from_secs(3600), now));
        assert!(cache_usable(now + Duration::from_secs(61), now));
    }

    #[test]
    fn cached_token_inside_margin_is_not_reused() {
        let now = Instant::now();
        assert!(!cache_usable(now + Duration::from_secs(60), now));
        assert!(!cache_usable(now + Duration::from_secs(5), now));
        assert!(!cache_usable(now, now));
    }
}
