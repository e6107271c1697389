use anyhow::Result;
use base64::Engine;
use fc_local_framing::EnvelopeBuilder;
use fc_local_models::{
    Credentials, ExecutionInfo, FunctionDefinition, FunctionSpec, Runtime, ServiceSpec,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Base64 encode bytes
pub fn b64<T: AsRef<[u8]>>(bytes: T) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Poll until a condition is met or timeout
pub async fn poll_until<F, Fut>(
    description: &str,
    timeout_duration: Duration,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = std::time::Instant::now();
    let poll_interval = Duration::from_millis(20);

    loop {
        if start.elapsed() >= timeout_duration {
            anyhow::bail!("Timeout waiting for: {}", description);
        }

        if condition().await? {
            return Ok(());
        }

        tokio::time::sleep(poll_interval).await;
    }
}

pub fn execution_info(request_id: &str) -> ExecutionInfo {
    ExecutionInfo {
        request_id: Some(request_id.to_string()),
        billed_time_ms: Some(100),
        memory_limit_mb: Some(128),
        memory_usage_mb: Some(20),
    }
}

/// Stdout of a mock invocation that answered with `status` and `body`.
pub fn response_envelope(
    status: u16,
    headers: &[(String, String)],
    body: &[u8],
    request_id: &str,
) -> Vec<u8> {
    EnvelopeBuilder::new()
        .log("FunctionCompute nodejs runtime inited.")
        .response(status, "OK", headers, body)
        .execution_info(&execution_info(request_id))
        .build()
}

/// Stdout of an HTTP-trigger invocation, carrying the outer status and
/// headers in `x-fc-http-params`.
pub fn http_trigger_envelope(
    status: u16,
    headers: serde_json::Value,
    body: &[u8],
    request_id: &str,
) -> Vec<u8> {
    let params = serde_json::json!({ "status": status, "headersMap": headers });
    let header = vec![("x-fc-http-params".to_string(), b64(params.to_string()))];
    response_envelope(200, &header, body, request_id)
}

pub fn sample_function(runtime: Runtime, code_uri: &Path) -> FunctionSpec {
    FunctionSpec {
        name: "hello".to_string(),
        runtime,
        handler: "index.handler".to_string(),
        initializer: None,
        timeout_seconds: Some(3),
        initialization_timeout_seconds: None,
        memory_mb: Some(128),
        environment_variables: BTreeMap::new(),
        code_uri: code_uri.to_path_buf(),
        ca_port: None,
        custom_container: None,
    }
}

pub fn sample_definition(runtime: Runtime, code_uri: &Path) -> FunctionDefinition {
    FunctionDefinition {
        service: ServiceSpec {
            name: "demo".to_string(),
            ..Default::default()
        },
        function: sample_function(runtime, code_uri),
    }
}

pub fn sample_credentials() -> Credentials {
    Credentials {
        account_id: "1234567890".to_string(),
        region: "cn-hangzhou".to_string(),
        access_key_id: "test-ak".to_string(),
        access_key_secret: "test-secret".to_string(),
        security_token: String::new(),
    }
}
