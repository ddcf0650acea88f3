use crate::server::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Extension;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/livechatid", get(get_live_chat_id))
}

#[tracing::instrument(level = "info", skip_all)]
async fn get_live_chat_id(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.live_chat.resolve_active_chat_id().await {
        Ok(Some(id)) => (StatusCode::OK, id.into_inner()).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no active broadcast").into_response(),
        Err(e) => {
            tracing::warn!(%e, "live chat id resolution failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
