pub mod auth;
pub mod broadcast;
pub mod root;
pub mod run;

use axum::Router;

pub fn router() -> Router {
    Router::new()
        .merge(root::router())
        .merge(auth::router())
        .merge(broadcast::router())
        .merge(run::router())
}
