use crate::{observe, print_debug_tips, CustomContainerInvoke, EnvExtras, FunctionContext};
use bytes::Bytes;
use fc_local_framing::{ConsoleSink, FramedOutput, FramingDecoder, OutputSink};
use fc_local_invoker::{random_container_name, ContainerManager, ExecSpec, RunningContainer};
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{InvocationResult, LocalError};
use fc_local_runtimes::{family_for, mock_script, server_command, InvokeRequest};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Invokes a function once for a non-HTTP event.
pub struct LocalInvoke {
    manager: Arc<ContainerManager>,
    context: Arc<FunctionContext>,
    metrics: Arc<MetricsService>,
    reuse: bool,
}

impl LocalInvoke {
    pub fn new(
        manager: Arc<ContainerManager>,
        context: Arc<FunctionContext>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            manager,
            context,
            metrics,
            reuse: true,
        }
    }

    /// Whether a container left running by `start` may serve the event.
    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    #[instrument(skip(self, event, sink, cancel), fields(function_name = %self.context.function_name()))]
    pub async fn invoke(
        &self,
        event: Bytes,
        sink: Box<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, LocalError> {
        if self.context.function.runtime.is_custom_container() {
            let adapter = CustomContainerInvoke::new(
                self.manager.clone(),
                self.context.clone(),
                self.metrics.clone(),
            );
            return adapter.invoke(event).await;
        }

        let started = Instant::now();
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        if self.reuse {
            if let Some(container) = self.manager.find_warm(&self.context.container_name()).await? {
                let container_id = container.id.clone();
                let outcome = self.invoke_warm(container, event, sink, cancel).await;
                observe(&self.metrics, self.context.function_name(), Some(&container_id), started, &outcome);
                return outcome;
            }
        }

        let outcome = self.invoke_once(event, sink, cancel).await;
        observe(&self.metrics, self.context.function_name(), None, started, &outcome);
        outcome
    }

    /// Execs the event in a running container, then marks it warm so the
    /// initializer is skipped from now on.
    async fn invoke_warm(
        &self,
        mut container: RunningContainer,
        event: Bytes,
        sink: Box<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, LocalError> {
        let function = &self.context.function;
        let request = InvokeRequest {
            http_mode: false,
            invoke_initializer: container.lifecycle.needs_initializer(),
            inline_event: Some(&event[..]),
        };
        let mut cmd = vec![mock_script(function.runtime)];
        cmd.extend(family_for(function.runtime).build_invoke_command(function, &request));

        self.metrics.record_invocation(&function.name, false);
        TracingService::log_invocation_started(&function.name, Some(&container.id), false);

        let spec = ExecSpec {
            cmd,
            ..Default::default()
        };
        let result = self
            .manager
            .exec(&container.id, spec, FramingDecoder::new(sink), cancel)
            .await?
            .into_result()?;

        if container.lifecycle.needs_initializer() {
            self.manager.promote(&mut container).await?;
            TracingService::log_container_promoted(&function.name, &container.id, &container.name);
        }
        Ok(result)
    }

    /// Fresh auto-removed container fed through stdin.
    async fn invoke_once(
        &self,
        event: Bytes,
        sink: Box<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, LocalError> {
        let function = &self.context.function;
        let settings = self.manager.settings();
        let prepared = self.context.plan(
            settings.platform,
            random_container_name(),
            EnvExtras::default(),
        )?;
        print_debug_tips(prepared.debug.as_ref());

        // without a reliable attach the event travels as an argument
        let inline = settings.attach_via_logs;
        let request = InvokeRequest {
            inline_event: inline.then_some(&event[..]),
            ..InvokeRequest::stdin(false)
        };
        let cmd = family_for(function.runtime).build_invoke_command(function, &request);
        let stdin = if inline { Bytes::new() } else { event.clone() };

        self.metrics.record_invocation(&function.name, true);
        TracingService::log_invocation_started(&function.name, None, true);

        self.manager
            .run(prepared.plan.one_shot(cmd), stdin, FramingDecoder::new(sink), cancel)
            .await?
            .into_result()
    }
}

/// A long-lived function container serving repeated execs.
pub struct StartedServer {
    pub container: RunningContainer,
    pub logs: JoinHandle<FramedOutput>,
}

/// Starts the persistent event server used by `invoke` warm reuse.
pub struct EventStart {
    manager: Arc<ContainerManager>,
    context: Arc<FunctionContext>,
}

impl EventStart {
    pub fn new(manager: Arc<ContainerManager>, context: Arc<FunctionContext>) -> Self {
        Self { manager, context }
    }

    #[instrument(skip(self, cancel), fields(function_name = %self.context.function_name()))]
    pub async fn start(&self, cancel: CancellationToken) -> Result<StartedServer, LocalError> {
        let function = &self.context.function;
        let image = self.context.image()?;
        self.manager.ensure_image(&image).await?;

        let name = self.context.container_name();
        for existing in self.manager.find_named(&name).await? {
            info!(container_id = %existing.id, container_name = %existing.name, "stopping previous container");
            if let Err(e) = self.manager.stop(&existing.id).await {
                warn!(container_id = %existing.id, "failed to stop previous container: {}", e);
            }
        }

        let prepared = self
            .context
            .plan(self.manager.settings().platform, name, EnvExtras::default())?;
        let spec = prepared
            .plan
            .server(Some(mock_script(function.runtime)), server_command());
        let container = self.manager.start_server(spec).await?;
        TracingService::log_container_created(&function.name, &container.id, &image, &container.name);

        let logs = self
            .manager
            .follow_logs(&container.id, Box::new(ConsoleSink), cancel)
            .await?;

        println!("local start succeeded.");
        print_debug_tips(prepared.debug.as_ref());

        Ok(StartedServer { container, logs })
    }
}
