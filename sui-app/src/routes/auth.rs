use crate::server::AppState;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Extension;
use serde::Deserialize;
use std::sync::Arc;
use sui_youtube::CredentialStore;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/auth", get(start_auth))
        .route("/oauth2/callback", get(oauth_callback))
}

#[tracing::instrument(level = "info", skip_all)]
async fn start_auth(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.oauth.consent_url() {
        Ok(url) => Redirect::temporary(url.as_str()).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to build consent url: {e}"),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

#[tracing::instrument(level = "info", skip_all)]
async fn oauth_callback(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing ?code= parameter").into_response();
    };

    let grant = match state.oauth.exchange_code(&code).await {
        Ok(grant) => grant,
        Err(e) => {
            tracing::warn!(%e, "code exchange failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("code exchange failed: {e}"),
            )
                .into_response();
        }
    };

    // Repeat consent omits the refresh token; report that distinctly and
    // leave any previously stored token in place.
    match grant.refresh_token {
        Some(token) => {
            if let Err(e) = state.store.store_refresh_token(&token).await {
                tracing::error!(%e, "failed to persist refresh token");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to persist refresh token: {e}"),
                )
                    .into_response();
            }
            tracing::info!("refresh token stored");
            (StatusCode::OK, format!("refresh token: {token}")).into_response()
        }
        None => (StatusCode::OK, "refresh token: <not returned>").into_response(),
    }
}
