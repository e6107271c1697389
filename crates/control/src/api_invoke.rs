use crate::{
    api_reply, error_reply, observe, EnvExtras, FunctionContext, HttpInvocation, HttpInvoker,
};
use async_trait::async_trait;
use fc_local_framing::{ConsoleSink, FramingDecoder};
use fc_local_invoker::{random_container_name, ContainerManager};
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{HttpReply, InvocationResult, LocalError};
use fc_local_runtimes::{family_for, InvokeRequest};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Invocation API: every call is a fresh one-shot run in HTTP mode.
pub struct ApiInvoke {
    manager: Arc<ContainerManager>,
    context: Arc<FunctionContext>,
    metrics: Arc<MetricsService>,
}

impl ApiInvoke {
    pub fn new(
        manager: Arc<ContainerManager>,
        context: Arc<FunctionContext>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            manager,
            context,
            metrics,
        }
    }

    #[instrument(skip(self, request), fields(function_name = %self.context.function_name()))]
    pub async fn invoke(&self, request: HttpInvocation) -> Result<InvocationResult, LocalError> {
        let started = Instant::now();
        let function = &self.context.function;
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        let prepared = self.context.plan(
            self.manager.settings().platform,
            random_container_name(),
            EnvExtras::default(),
        )?;
        let cmd = family_for(function.runtime).build_invoke_command(function, &InvokeRequest::stdin(true));

        self.metrics.record_invocation(&function.name, true);
        TracingService::log_invocation_started(&function.name, None, true);

        let outcome = self
            .manager
            .run(
                prepared.plan.one_shot(cmd),
                request.body,
                FramingDecoder::new(Box::new(ConsoleSink)),
                CancellationToken::new(),
            )
            .await
            .and_then(|outcome| outcome.into_result());
        observe(&self.metrics, &function.name, None, started, &outcome);
        outcome
    }
}

#[async_trait]
impl HttpInvoker for ApiInvoke {
    async fn invoke_http(&self, request: HttpInvocation) -> HttpReply {
        match self.invoke(request).await {
            Ok(result) => api_reply(&result),
            Err(e) => error_reply(&e),
        }
    }
}
