pub mod handlers;
pub mod http_params;
pub mod routes;
pub mod signature;
pub mod state;

pub use handlers::*;
pub use http_params::*;
pub use routes::*;
pub use state::*;

use axum::extract::DefaultBodyLimit;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub async fn start_server(
    bind: &str,
    port: u16,
    max_body_mb: u64,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let endpoint = state.mode.endpoint().to_string();
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max((max_body_mb as usize) * 1024 * 1024)),
    );

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    info!("HTTP server listening on {}:{}", bind, port);
    println!("function registered\n\turl: http://localhost:{port}{endpoint}/");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}
