use crate::cycle::{run_cycle, CycleDeps};
use crate::server::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/run", post(run_once))
}

#[tracing::instrument(level = "info", skip_all)]
async fn run_once(Extension(state): Extension<Arc<AppState>>) -> Response {
    // One cycle at a time; overlapping invocations queue here.
    let _serialized = state.run_lock.lock().await;

    let deps = CycleDeps {
        chat: state.live_chat.as_ref(),
        generator: state.generator.as_ref(),
        dedupe: state.store.as_ref(),
    };
    match run_cycle(deps, &state.cfg.chat).await {
        Ok(outcome) => {
            tracing::info!(status = outcome.status_label(), "run cycle finished");
            Json(outcome).into_response()
        }
        Err(e) => {
            tracing::warn!(%e, "run cycle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
