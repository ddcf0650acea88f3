//! HTTP server wiring: state construction, layers, lifecycle.

use crate::assistant::{GeminiReplyGenerator, ReplyGenerator};
use crate::config::BotConfig;
use crate::cycle::{run_cycle, CycleDeps};
use crate::routes;
use crate::state::SqliteStateStore;
use anyhow::Result;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::Extension;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sui_llm::GeminiClient;
use sui_youtube::{CredentialStore, LiveChatClient, OAuthClient, RetryPolicy, TokenManager};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const HTTP_MAX_IN_FLIGHT: usize = 32;
/// A run cycle makes up to three upstream calls, each with its own 30s
/// timeout plus optional retries.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AppState {
    pub cfg: BotConfig,
    pub oauth: OAuthClient,
    pub live_chat: Arc<LiveChatClient>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub store: Arc<SqliteStateStore>,
    pub run_lock: tokio::sync::Mutex<()>,
}

pub async fn build_state(cfg: BotConfig) -> Result<Arc<AppState>> {
    let store = Arc::new(SqliteStateStore::open(&cfg.server.state_db).await?);
    if let Some(token) = cfg.chat.refresh_token.as_deref() {
        if store.seed_refresh_token(token).await? {
            tracing::info!("seeded refresh token from configuration");
        }
    }

    let oauth = OAuthClient::new(
        &cfg.oauth.client_id,
        &cfg.oauth.client_secret,
        &cfg.oauth.redirect_uri,
    );
    let credentials: Arc<dyn CredentialStore> = store.clone();
    let tokens = Arc::new(TokenManager::new(oauth.clone(), credentials));
    let live_chat = Arc::new(LiveChatClient::new(
        tokens,
        RetryPolicy {
            attempts: cfg.upstream.retry_attempts,
        },
    ));
    let generator: Arc<dyn ReplyGenerator> = Arc::new(GeminiReplyGenerator::new(
        GeminiClient::new(
            &cfg.gemini.api_key,
            &cfg.gemini.model,
            cfg.gemini.temperature,
            cfg.gemini.max_output_tokens,
        ),
        &cfg.chat.bot_name,
    ));

    Ok(Arc::new(AppState {
        cfg,
        oauth,
        live_chat,
        generator,
        store,
        run_lock: tokio::sync::Mutex::new(()),
    }))
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BotConfig::load(config_path).await?;
    tracing::info!(
        port = cfg.server.port,
        model = %cfg.gemini.model,
        bot_name = %cfg.chat.bot_name,
        trigger_count = cfg.chat.triggers.len(),
        context_policy = ?cfg.chat.context_policy,
        retry_attempts = cfg.upstream.retry_attempts,
        live_chat_configured = !cfg.chat.live_chat_id.trim().is_empty(),
        state_db = %cfg.server.state_db,
        "server configuration loaded"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = preflight_bind_listener(addr).await?;
    let state = build_state(cfg).await?;

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(HTTP_MAX_IN_FLIGHT))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            HTTP_REQUEST_TIMEOUT,
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "suisui serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

/// Validate config and report the effective settings.
pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BotConfig::load(config_path).await?;
    tracing::info!(
        model = %cfg.gemini.model,
        bot_name = %cfg.chat.bot_name,
        triggers = ?cfg.chat.triggers,
        context_policy = ?cfg.chat.context_policy,
        live_chat_configured = !cfg.chat.live_chat_id.trim().is_empty(),
        refresh_token_seeded = cfg.chat.refresh_token.is_some(),
        state_db = %cfg.server.state_db,
        "config ok"
    );
    Ok(())
}

/// Execute one run cycle from the shell and print the structured outcome.
pub async fn run_once(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BotConfig::load(config_path).await?;
    let state = build_state(cfg).await?;

    let deps = CycleDeps {
        chat: state.live_chat.as_ref(),
        generator: state.generator.as_ref(),
        dedupe: state.store.as_ref(),
    };
    let outcome = run_cycle(deps, &state.cfg.chat)
        .await
        .map_err(|e| anyhow::anyhow!("run cycle failed: {e}"))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}
