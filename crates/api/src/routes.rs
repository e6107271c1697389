use crate::{handlers::*, AppState, ServeMode};
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_router(mode: &ServeMode) -> Router<AppState> {
    let router = Router::new().route("/metrics", get(metrics));
    match mode {
        // Matched by prefix in the handler so sub-paths and every method reach it.
        ServeMode::HttpTrigger { .. } => router.fallback(http_trigger),
        ServeMode::Api { path } => router.route(path, post(api_invoke)).fallback(not_found),
    }
}

pub fn build_router(state: AppState) -> Router {
    create_router(&state.mode).with_state(state)
}
