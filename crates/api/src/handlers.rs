use crate::{signature, AppState, HttpParams, ServeMode};
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use fc_local_control::HttpInvocation;
use fc_local_models::HttpReply;
use std::net::SocketAddr;
use tracing::{debug, error, info, instrument, warn};

/// Headers the server recomputes for the body it actually sends.
const HOP_BY_HOP: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
];

pub fn reply_into_response(reply: HttpReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    for (name, value) in &reply.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    (status, headers, Body::from(reply.body)).into_response()
}

fn check_signature(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<(), Response> {
    if state.anonymous {
        return Ok(());
    }
    signature::verify(&state.credentials, method.as_str(), uri.path(), uri.query(), headers).map_err(
        |e| {
            warn!(path = %uri.path(), "{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    )
}

/// Every method under the trigger prefix, including sub-paths.
#[instrument(skip(state, headers, connect_info, body), fields(method = %method, path = %uri.path()))]
pub async fn http_trigger(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let ServeMode::HttpTrigger { prefix } = &state.mode else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !uri.path().starts_with(prefix.as_str()) {
        debug!("path outside trigger prefix");
        return StatusCode::NOT_FOUND.into_response();
    }
    if let Err(response) = check_signature(&state, &method, &uri, &headers) {
        return response;
    }

    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let params = HttpParams::from_request(&method, &uri, &headers, &client_ip, prefix);
    info!(client_ip = %client_ip, "http trigger request");

    let reply = state
        .invoker
        .invoke_http(HttpInvocation {
            http_params: Some(params.encode()),
            body,
        })
        .await;
    reply_into_response(reply)
}

#[instrument(skip(state, headers, body), fields(path = %uri.path()))]
pub async fn api_invoke(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = check_signature(&state, &method, &uri, &headers) {
        return response;
    }
    let reply = state
        .invoker
        .invoke_http(HttpInvocation {
            http_params: None,
            body,
        })
        .await;
    reply_into_response(reply)
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
