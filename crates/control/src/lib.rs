pub mod api_invoke;
pub mod context;
pub mod custom_container;
pub mod http_trigger;
pub mod response;
pub mod shutdown;
pub mod standard;

pub use api_invoke::*;
pub use context::*;
pub use custom_container::*;
pub use http_trigger::*;
pub use response::*;
pub use shutdown::*;
pub use standard::*;

use async_trait::async_trait;
use bytes::Bytes;
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{HttpReply, InvocationResult, LocalError};
use std::time::Instant;

/// One inbound HTTP call, already read and validated by the server.
#[derive(Debug, Clone, Default)]
pub struct HttpInvocation {
    /// Base64 JSON handed to the runtime as `FC_HTTP_PARAMS`.
    pub http_params: Option<String>,
    pub body: Bytes,
}

/// An adapter that answers HTTP calls with a function's output.
#[async_trait]
pub trait HttpInvoker: Send + Sync {
    async fn invoke_http(&self, request: HttpInvocation) -> HttpReply;
}

pub(crate) fn observe(
    metrics: &MetricsService,
    function_name: &str,
    container_id: Option<&str>,
    started: Instant,
    outcome: &Result<InvocationResult, LocalError>,
) {
    let elapsed = started.elapsed().as_millis() as u64;
    metrics.record_outcome(outcome);
    metrics.record_duration(elapsed as f64);
    match outcome {
        Ok(result) => TracingService::log_invocation_completed(function_name, elapsed, result),
        Err(e) => TracingService::log_failure(function_name, container_id, e),
    }
}
