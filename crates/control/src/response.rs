//! Translation of decoded invocations into outer HTTP replies.

use base64::{engine::general_purpose::STANDARD, Engine};
use fc_local_models::{HttpReply, InvocationResult, LocalError};
use serde_json::Value;
use tracing::warn;

pub const HTTP_PARAMS_HEADER: &str = "x-fc-http-params";

const EXPOSE_HEADERS: &str = "Date,x-fc-request-id,x-fc-error-type,x-fc-code-checksum,x-fc-invocation-duration,x-fc-max-memory-usage,x-fc-log-result,x-fc-invocation-code-version";

/// Reply for the invocation API: the function's status and body plus
/// the platform's `x-fc-*` metadata headers.
pub fn api_reply(result: &InvocationResult) -> HttpReply {
    let content_type = if result.error_type.is_error() {
        "application/json"
    } else {
        "application/octet-stream"
    };
    let reply = HttpReply::new(result.status_code.unwrap_or(500)).header("content-type", content_type);

    let body = if result.error_type.is_error() {
        result.error_body()
    } else {
        result.body.clone()
    };
    invocation_headers(reply, result).body(body)
}

/// Appends the `x-fc-*` metadata known for an invocation; `x-fc-error-type`
/// only on an application error.
fn invocation_headers(mut reply: HttpReply, result: &InvocationResult) -> HttpReply {
    if let Some(request_id) = &result.request_id {
        reply = reply.header("x-fc-request-id", request_id.as_str());
    }
    if let Some(billed) = result.billed_time_ms {
        reply = reply.header("x-fc-invocation-duration", billed.to_string());
    }
    reply = reply.header("x-fc-invocation-service-version", "LATEST");
    if let Some(memory) = result.memory_usage_mb {
        reply = reply.header("x-fc-max-memory-usage", memory.to_string());
    }
    reply = reply.header("access-control-expose-headers", EXPOSE_HEADERS);
    if let Some(error_type) = result.error_type.header_value() {
        reply = reply.header("x-fc-error-type", error_type);
    }
    reply
}

/// Outer status and headers an HTTP-trigger function asked for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpTriggerParams {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

/// Decodes the base64 JSON carried in `x-fc-http-params`. `headersMap` wins
/// over `headers`; values may be a string or a list of strings.
pub fn parse_http_trigger_params(encoded: &str) -> Option<HttpTriggerParams> {
    let raw = STANDARD.decode(encoded.trim()).ok()?;
    let json: Value = serde_json::from_slice(&raw).ok()?;

    let status = json
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok());

    let map = json
        .get("headersMap")
        .filter(|v| v.is_object())
        .or_else(|| json.get("headers"))
        .and_then(Value::as_object);

    let mut headers = Vec::new();
    for (key, value) in map.into_iter().flatten() {
        let values: Vec<String> = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => {
                warn!(header = %key, "dropping header with unsupported value");
                continue;
            }
        };
        if !valid_header(key, &values) {
            warn!(header = %key, "dropping header with invalid characters");
            continue;
        }
        headers.extend(values.into_iter().map(|v| (key.clone(), v)));
    }

    Some(HttpTriggerParams { status, headers })
}

pub fn valid_header(key: &str, values: &[String]) -> bool {
    !key.trim().is_empty() && key.is_ascii() && values.iter().all(|v| v.is_ascii())
}

/// Reply for an HTTP trigger. A 2xx from the runtime means the function
/// ran; the real status and headers travel in `x-fc-http-params` and the
/// body passes through untouched. Anything else becomes a JSON error
/// envelope carrying the invocation metadata.
pub fn http_trigger_reply(result: &InvocationResult) -> HttpReply {
    let status = result.status_code.unwrap_or(500);

    if (200..300).contains(&status) {
        let params = result
            .header(HTTP_PARAMS_HEADER)
            .and_then(parse_http_trigger_params)
            .unwrap_or_default();
        if result.error_type.is_error() {
            warn!(request_id = ?result.request_id, "function wrote to stderr");
        }
        let mut reply = HttpReply::new(params.status.unwrap_or(status));
        reply.headers = params.headers;
        return reply.body(result.body.clone());
    }

    let reply = HttpReply::new(status).header("content-type", "application/json");
    invocation_headers(reply, result).body(result.error_body())
}

/// Reply for a failure that produced no usable response.
pub fn error_reply(error: &LocalError) -> HttpReply {
    HttpReply::json_error(error.http_status(), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fc_local_models::ErrorType;

    fn result(status: Option<u16>, headers: Vec<(String, String)>, body: &'static [u8]) -> InvocationResult {
        InvocationResult {
            status_code: status,
            status_message: None,
            headers,
            body: Bytes::from_static(body),
            request_id: Some("req-1".into()),
            billed_time_ms: Some(51),
            memory_limit_mb: Some(128),
            memory_usage_mb: Some(12),
            error_type: ErrorType::None,
        }
    }

    #[test]
    fn api_reply_headers() {
        let reply = api_reply(&result(Some(200), vec![], b"ok"));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header_value("content-type"), Some("application/octet-stream"));
        assert_eq!(reply.header_value("x-fc-request-id"), Some("req-1"));
        assert_eq!(reply.header_value("x-fc-invocation-duration"), Some("51"));
        assert_eq!(reply.header_value("x-fc-max-memory-usage"), Some("12"));
        assert_eq!(reply.header_value("x-fc-invocation-service-version"), Some("LATEST"));
        assert!(reply.header_value("x-fc-error-type").is_none());

        let mut failed = result(None, vec![], b"{\"errorMessage\":\"x\"}");
        failed.error_type = ErrorType::UnhandledInvocationError;
        let reply = api_reply(&failed);
        assert_eq!(reply.status, 500);
        assert_eq!(reply.header_value("content-type"), Some("application/json"));
        assert_eq!(reply.header_value("x-fc-error-type"), Some("UnhandledInvocationError"));
    }

    #[test]
    fn http_params_drive_trigger_reply() {
        // {"status":200,"headers":{"content-type":"application/json"},"headersMap":{"content-type":["application/json"]}}
        let encoded = "eyJzdGF0dXMiOjIwMCwiaGVhZGVycyI6eyJjb250ZW50LXR5cGUiOiJhcHBsaWNhdGlvbi9qc29uIn0sImhlYWRlcnNNYXAiOnsiY29udGVudC10eXBlIjpbImFwcGxpY2F0aW9uL2pzb24iXX19";
        let params = parse_http_trigger_params(encoded).unwrap();
        assert_eq!(params.status, Some(200));
        assert_eq!(
            params.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );

        let custom = STANDARD.encode(
            serde_json::json!({
                "status": 302,
                "headersMap": {
                    "location": ["/next"],
                    "set-cookie": ["a=1", "b=2"],
                    "x-bad": ["caf\u{e9}"],
                    " ": ["blank"]
                }
            })
            .to_string(),
        );
        let reply = http_trigger_reply(&result(
            Some(200),
            vec![(HTTP_PARAMS_HEADER.to_string(), custom)],
            b"moved",
        ));
        assert_eq!(reply.status, 302);
        assert_eq!(reply.header_value("location"), Some("/next"));
        assert_eq!(
            reply.headers.iter().filter(|(k, _)| k == "set-cookie").count(),
            2
        );
        assert!(reply.header_value("x-bad").is_none());
        assert_eq!(reply.headers.len(), 3);
        assert_eq!(&reply.body[..], b"moved");
    }

    #[test]
    fn non_2xx_trigger_reply_is_json() {
        let reply = http_trigger_reply(&result(Some(404), vec![], b"{\"errorMessage\":\"nope\"}"));
        assert_eq!(reply.status, 404);
        assert_eq!(reply.header_value("content-type"), Some("application/json"));

        let mut crashed = result(None, vec![], b"");
        crashed.error_type = ErrorType::UnhandledInvocationError;
        let reply = http_trigger_reply(&crashed);
        assert_eq!(reply.status, 500);
        assert_eq!(reply.header_value("x-fc-request-id"), Some("req-1"));
        assert_eq!(reply.header_value("x-fc-invocation-duration"), Some("51"));
        assert_eq!(reply.header_value("x-fc-max-memory-usage"), Some("12"));
        assert_eq!(reply.header_value("x-fc-error-type"), Some("UnhandledInvocationError"));
        let json: Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(
            json["errorMessage"],
            "Process exited unexpectedly before completing request (duration: 51ms, maxMemoryUsage: 12MB)"
        );
    }

    #[test]
    fn non_2xx_trigger_reply_without_error_omits_error_type() {
        let reply = http_trigger_reply(&result(Some(404), vec![], b"{}"));
        assert_eq!(reply.header_value("x-fc-request-id"), Some("req-1"));
        assert!(reply.header_value("x-fc-error-type").is_none());
    }

    #[test]
    fn stderr_on_successful_trigger_keeps_the_empty_body() {
        // {"status":200}
        let params = vec![(HTTP_PARAMS_HEADER.to_string(), "eyJzdGF0dXMiOjIwMH0=".to_string())];
        let mut warned = result(Some(200), params, b"");
        warned.error_type = ErrorType::UnhandledInvocationError;
        let reply = http_trigger_reply(&warned);
        assert_eq!(reply.status, 200);
        assert!(reply.body.is_empty());
        assert!(reply.header_value("x-fc-error-type").is_none());
    }

    #[test]
    fn error_reply_has_only_a_message() {
        let reply = error_reply(&LocalError::SignalKilled {
            code: 137,
            oom_killed: false,
        });
        assert_eq!(reply.status, 500);
        let json: Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert!(json["errorMessage"].as_str().unwrap().contains("137"));
    }
}
