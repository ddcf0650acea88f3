use crate::server::AppState;
use axum::routing::get;
use axum::Extension;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/", get(banner))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn banner(Extension(state): Extension<Arc<AppState>>) -> String {
    format!(
        "{} live-chat bot is running.\n\
         GET /auth connects a YouTube channel; GET /livechatid resolves the \
         active broadcast; POST /run executes one reply cycle.\n",
        state.cfg.chat.bot_name
    )
}
