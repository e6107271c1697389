use crate::{
    error_reply, http_trigger_reply, observe, print_debug_tips, EnvExtras, FunctionContext,
    HttpInvocation, HttpInvoker,
};
use async_trait::async_trait;
use fc_local_framing::{ConsoleSink, FramingDecoder};
use fc_local_invoker::{random_container_name, ContainerManager, ExecSpec, RunningContainer};
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{HttpReply, InvocationResult, LocalError};
use fc_local_runtimes::{family_for, mock_script, server_command, InvokeRequest};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Serves an HTTP trigger from a single long-lived runner container.
///
/// The runner is created on the first request. Every exec goes through the
/// same lock, so calls to one function are processed one at a time. A
/// process crash throws the runner away and the next request starts fresh.
/// Debug sessions never reuse a runner. Runners get unique names so they
/// never collide with a `start` server for the same function.
pub struct HttpTriggerInvoke {
    manager: Arc<ContainerManager>,
    context: Arc<FunctionContext>,
    metrics: Arc<MetricsService>,
    runner: Mutex<Option<RunningContainer>>,
}

impl HttpTriggerInvoke {
    pub fn new(
        manager: Arc<ContainerManager>,
        context: Arc<FunctionContext>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            manager,
            context,
            metrics,
            runner: Mutex::new(None),
        }
    }

    /// Current runner container id, if one is up.
    pub async fn runner_id(&self) -> Option<String> {
        self.runner.lock().await.as_ref().map(|r| r.id.clone())
    }

    #[instrument(skip(self, request), fields(function_name = %self.context.function_name()))]
    pub async fn invoke(&self, request: HttpInvocation) -> Result<InvocationResult, LocalError> {
        let started = Instant::now();
        let outcome = if self.context.is_debug() {
            self.invoke_once(&request).await
        } else {
            self.invoke_runner(&request).await
        };
        observe(&self.metrics, self.context.function_name(), None, started, &outcome);
        outcome
    }

    async fn create_runner(&self) -> Result<RunningContainer, LocalError> {
        let function = &self.context.function;
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        let prepared = self.context.plan(
            self.manager.settings().platform,
            random_container_name(),
            EnvExtras {
                http_params: None,
                http_trigger: true,
            },
        )?;
        let spec = prepared
            .plan
            .server(Some(mock_script(function.runtime)), server_command());
        let runner = self.manager.start_server(spec).await?;
        TracingService::log_container_created(&function.name, &runner.id, &image, &runner.name);
        Ok(runner)
    }

    async fn invoke_runner(&self, request: &HttpInvocation) -> Result<InvocationResult, LocalError> {
        let function = &self.context.function;
        let mut guard = self.runner.lock().await;

        let cold = guard.is_none();
        if cold {
            debug!("runner not created, creating one");
            *guard = Some(self.create_runner().await?);
        }
        let Some(runner) = guard.as_mut() else {
            return Err(LocalError::DockerError {
                message: "runner disappeared while locked".to_string(),
            });
        };

        self.metrics.record_invocation(&function.name, cold);
        TracingService::log_invocation_started(&function.name, Some(&runner.id), cold);

        let invoke = InvokeRequest {
            invoke_initializer: runner.lifecycle.needs_initializer(),
            ..InvokeRequest::stdin(true)
        };
        let mut cmd = vec![mock_script(function.runtime)];
        cmd.extend(family_for(function.runtime).build_invoke_command(function, &invoke));
        let env = request
            .http_params
            .iter()
            .map(|p| ("FC_HTTP_PARAMS".to_string(), p.clone()))
            .collect();
        let spec = ExecSpec {
            cmd,
            env,
            stdin: Some(request.body.clone()),
            working_dir: None,
        };

        let outcome = self
            .manager
            .exec(
                &runner.id,
                spec,
                FramingDecoder::new(Box::new(ConsoleSink)),
                CancellationToken::new(),
            )
            .await
            .and_then(|outcome| outcome.into_result());

        match outcome {
            Ok(result) => {
                if runner.lifecycle.needs_initializer() {
                    self.manager.promote(runner).await?;
                    TracingService::log_container_promoted(&function.name, &runner.id, &runner.name);
                }
                Ok(result)
            }
            Err(e) => {
                if e.is_process_failure() {
                    if let Some(dead) = guard.take() {
                        self.discard_runner(dead).await;
                    }
                }
                Err(e)
            }
        }
    }

    async fn invoke_once(&self, request: &HttpInvocation) -> Result<InvocationResult, LocalError> {
        let function = &self.context.function;
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        let prepared = self.context.plan(
            self.manager.settings().platform,
            random_container_name(),
            EnvExtras {
                http_params: request.http_params.as_deref(),
                http_trigger: true,
            },
        )?;
        print_debug_tips(prepared.debug.as_ref());

        let cmd = family_for(function.runtime).build_invoke_command(function, &InvokeRequest::stdin(true));
        self.metrics.record_invocation(&function.name, true);
        TracingService::log_invocation_started(&function.name, None, true);

        self.manager
            .run(
                prepared.plan.one_shot(cmd),
                request.body.clone(),
                FramingDecoder::new(Box::new(ConsoleSink)),
                CancellationToken::new(),
            )
            .await?
            .into_result()
    }

    async fn discard_runner(&self, runner: RunningContainer) {
        info!(container_id = %runner.id, "disabling runner after process failure");
        if let Err(e) = self.manager.stop(&runner.id).await {
            warn!(container_id = %runner.id, "failed to stop runner: {}", e);
        }
        TracingService::log_container_stopped(&runner.id, "process failure");
    }

    /// Drops the runner so the next request starts a new one. Safe to call
    /// any number of times.
    pub async fn disable_runner(&self) {
        let runner = self.runner.lock().await.take();
        if let Some(runner) = runner {
            self.discard_runner(runner).await;
        }
    }
}

#[async_trait]
impl HttpInvoker for HttpTriggerInvoke {
    async fn invoke_http(&self, request: HttpInvocation) -> HttpReply {
        match self.invoke(request).await {
            Ok(result) => http_trigger_reply(&result),
            Err(e) => error_reply(&e),
        }
    }
}
