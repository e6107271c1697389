use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A request the fake function server received.
#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Stand-in for a custom-container function server that only starts
/// listening after `delay`.
pub struct DelayedServer {
    pub port: u16,
    pub received: Arc<Mutex<Vec<ReceivedRequest>>>,
    pub handle: JoinHandle<()>,
}

impl Drop for DelayedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(
    received: &Arc<Mutex<Vec<ReceivedRequest>>>,
    path: &str,
    headers: HeaderMap,
    body: Bytes,
) {
    received.lock().await.push(ReceivedRequest {
        path: path.to_string(),
        headers,
        body,
    });
}

/// Reserves a free port, then binds it after `delay` and serves
/// `/initialize` and `/invoke`. Invoke echoes the body with status 201.
pub async fn spawn_delayed_server(delay: Duration) -> anyhow::Result<DelayedServer> {
    let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = reserved.local_addr()?.port();
    drop(reserved);

    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/initialize",
            post(
                |State(received): State<Arc<Mutex<Vec<ReceivedRequest>>>>,
                 headers: HeaderMap,
                 body: Bytes| async move {
                    record(&received, "/initialize", headers, body).await;
                    "initialized"
                },
            ),
        )
        .route(
            "/invoke",
            post(
                |State(received): State<Arc<Mutex<Vec<ReceivedRequest>>>>,
                 headers: HeaderMap,
                 body: Bytes| async move {
                    let request_id = headers
                        .get("x-fc-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    record(&received, "/invoke", headers, body.clone()).await;
                    (
                        StatusCode::CREATED,
                        [("x-echo-request-id", request_id)],
                        body,
                    )
                        .into_response()
                },
            ),
        )
        .with_state(received.clone());

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            let _ = axum::serve(listener, app).await;
        }
    });

    Ok(DelayedServer {
        port,
        received,
        handle,
    })
}
