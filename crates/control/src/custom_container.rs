use crate::{error_reply, observe, EnvExtras, FunctionContext, HttpInvocation, HttpInvoker};
use async_trait::async_trait;
use bytes::Bytes;
use fc_local_invoker::{random_container_name, ContainerManager, RunningContainer};
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{ErrorType, HttpReply, InvocationResult, LocalError};
use fc_local_runtimes::custom_container_command;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct ServerState {
    container: RunningContainer,
    initialized: bool,
}

/// Drives a function packaged as its own HTTP server: start the container,
/// `/initialize` once, then `/invoke`, retrying while the server is not up.
pub struct CustomContainerInvoke {
    manager: Arc<ContainerManager>,
    context: Arc<FunctionContext>,
    metrics: Arc<MetricsService>,
    client: reqwest::Client,
    host: String,
    poll_interval: Duration,
    keep_warm: bool,
    state: Mutex<Option<ServerState>>,
}

impl CustomContainerInvoke {
    pub fn new(
        manager: Arc<ContainerManager>,
        context: Arc<FunctionContext>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            manager,
            context,
            metrics,
            client: reqwest::Client::new(),
            host: "localhost".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            keep_warm: false,
            state: Mutex::new(None),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Keep the container (and its initialized state) between calls.
    pub fn with_keep_warm(mut self, keep_warm: bool) -> Self {
        self.keep_warm = keep_warm;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.context.function.ca_port(), path)
    }

    #[instrument(skip(self, event), fields(function_name = %self.context.function_name()))]
    pub async fn invoke(&self, event: Bytes) -> Result<InvocationResult, LocalError> {
        let started = Instant::now();
        let mut state = self.state.lock().await;

        let cold = state.is_none();
        if cold {
            *state = Some(self.start_container().await?);
        }
        let container_id = state.as_ref().map(|s| s.container.id.clone());
        self.metrics.record_invocation(self.context.function_name(), cold);
        TracingService::log_invocation_started(self.context.function_name(), container_id.as_deref(), cold);

        let outcome = self.call_server(&mut state, event).await;

        if !self.keep_warm || outcome.is_err() {
            if let Some(server) = state.take() {
                self.exit_container(&server.container).await;
            }
        }

        observe(&self.metrics, self.context.function_name(), container_id.as_deref(), started, &outcome);
        outcome
    }

    async fn start_container(&self) -> Result<ServerState, LocalError> {
        let function = &self.context.function;
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        let prepared = self.context.plan(
            self.manager.settings().platform,
            random_container_name(),
            EnvExtras::default(),
        )?;
        let cmd = custom_container_command(function.custom_container.as_ref());
        let spec = prepared.plan.custom_container(cmd, function.ca_port());
        let container = self.manager.start_server(spec).await?;
        TracingService::log_container_created(&function.name, &container.id, &image, &container.name);

        Ok(ServerState {
            container,
            initialized: false,
        })
    }

    async fn call_server(
        &self,
        state: &mut Option<ServerState>,
        event: Bytes,
    ) -> Result<InvocationResult, LocalError> {
        let function = &self.context.function;
        let request_id = uuid::Uuid::new_v4().to_string();
        let headers = self.fc_headers(&request_id);

        let needs_init = state.as_ref().map(|s| !s.initialized).unwrap_or(false)
            && function.initializer.as_deref().is_some_and(|i| !i.is_empty());
        if needs_init {
            let timeout = Duration::from_secs(function.initialization_timeout_seconds());
            let response = self
                .post_until_ready("/initialize", headers.clone(), Bytes::new(), timeout)
                .await?;
            info!(status = %response.status(), "initializer finished");
            if let Some(s) = state.as_mut() {
                s.initialized = true;
            }
        }

        let mut invoke_headers = headers;
        invoke_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        let timeout = Duration::from_secs(function.timeout_seconds());
        let response = self
            .post_until_ready("/invoke", invoke_headers, event, timeout)
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| LocalError::Http {
            reason: format!("failed to read response body: {e}"),
        })?;

        Ok(InvocationResult {
            status_code: Some(status),
            status_message: None,
            headers,
            body,
            request_id: Some(request_id),
            billed_time_ms: None,
            memory_limit_mb: None,
            memory_usage_mb: None,
            error_type: ErrorType::None,
        })
    }

    fn fc_headers(&self, request_id: &str) -> HeaderMap {
        let function = &self.context.function;
        let creds = &self.context.credentials;
        let pairs = [
            ("x-fc-request-id", request_id.to_string()),
            ("x-fc-function-name", function.name.clone()),
            ("x-fc-function-handler", function.handler.clone()),
            ("x-fc-function-memory", function.memory_mb().to_string()),
            ("x-fc-function-timeout", function.timeout_seconds().to_string()),
            (
                "x-fc-initialization-timeout",
                function.initialization_timeout_seconds().to_string(),
            ),
            (
                "x-fc-function-initializer",
                function.initializer.clone().unwrap_or_default(),
            ),
            ("x-fc-access-key-id", creds.access_key_id.clone()),
            ("x-fc-access-key-secret", creds.access_key_secret.clone()),
            ("x-fc-security-token", creds.security_token.clone()),
            ("x-fc-account-id", creds.account_id.clone()),
            ("x-fc-region", creds.region.clone()),
            ("x-fc-service-name", self.context.service.name.clone()),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => warn!(header = name, "skipping header with invalid value"),
            }
        }
        headers
    }

    /// POSTs until the server answers. Only "not listening yet" failures
    /// are retried; the last one is reported once `timeout` runs out.
    async fn post_until_ready(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> Result<reqwest::Response, LocalError> {
        let url = self.url(path);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let sent = self
                .client
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .timeout(remaining.max(Duration::from_millis(1)))
                .send()
                .await;

            let last_error = match sent {
                Ok(response) => return Ok(response),
                Err(e) if is_not_ready(&e) => e.to_string(),
                Err(e) if e.is_timeout() => {
                    return Err(LocalError::ServerNotReady {
                        last_error: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(LocalError::Http {
                        reason: e.to_string(),
                    })
                }
            };

            if Instant::now() + self.poll_interval >= deadline {
                return Err(LocalError::ServerNotReady { last_error });
            }
            debug!(url = %url, "server not ready: {}", last_error);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn exit_container(&self, container: &RunningContainer) {
        if let Err(e) = self.manager.stop(&container.id).await {
            warn!(container_id = %container.id, "failed to stop custom container: {}", e);
        } else {
            TracingService::log_container_stopped(&container.id, "invocation finished");
        }
    }
}

/// Connection refused, reset or closed before a response.
fn is_not_ready(error: &reqwest::Error) -> bool {
    if error.is_connect() {
        return true;
    }
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if cause.to_string().contains("connection closed before message completed") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[async_trait]
impl HttpInvoker for CustomContainerInvoke {
    async fn invoke_http(&self, request: HttpInvocation) -> HttpReply {
        match self.invoke(request.body).await {
            Ok(result) => {
                let mut reply = HttpReply::new(result.status_code.unwrap_or(500));
                reply.headers = result.headers;
                reply.body(result.body)
            }
            Err(e) => error_reply(&e),
        }
    }
}
