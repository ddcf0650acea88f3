use crate::error::ChatError;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested at consent time: posting needs force-ssl, broadcast
/// lookup only needs readonly.
pub const YOUTUBE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.force-ssl",
    "https://www.googleapis.com/auth/youtube.readonly",
];

#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

/// Result of a token-endpoint call. `refresh_token` is absent on repeat
/// consent and on the refresh grant itself; absence is not a failure.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

impl OAuthClient {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    /// Deterministic consent URL. `access_type=offline` plus
    /// `prompt=consent` is what makes Google issue a refresh token.
    pub fn consent_url(&self) -> Result<Url, ChatError> {
        let mut url = Url::parse(GOOGLE_AUTH_URL)
            .map_err(|e| ChatError::Config(format!("bad auth url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &YOUTUBE_SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ChatError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, ChatError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, ChatError> {
        let response = self.http.post(GOOGLE_TOKEN_URL).form(params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // 400/401 from the token endpoint means the code or refresh
            // token was rejected, not that Google is down.
            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err(ChatError::Auth(format!(
                    "token endpoint rejected request: status={status} body={body}"
                )));
            }
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ChatError::Transport(format!("token response parse failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_url_requests_offline_access_and_reconsent() {
        let oauth = OAuthClient::new("cid", "secret", "https://example.com/oauth2/callback");
        let url = oauth.consent_url().expect("consent url");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("client_id"), Some("cid"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        let scope = get("scope").expect("scope present");
        assert!(scope.contains("youtube.force-ssl"));
        assert!(scope.contains("youtube.readonly"));
    }

    #[test]
    fn token_grant_tolerates_missing_refresh_token() {
        let grant: TokenGrant =
            serde_json::from_str(r#"{"access_token":"at","expires_in":3599}"#).expect("parse");
        assert_eq!(grant.access_token, "at");
        assert!(grant.refresh_token.is_none());
        assert_eq!(grant.expires_in, 3599);
    }
}
