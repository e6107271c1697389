use crate::{
    is_gone, translate_create_error, validate_mounts, warm_name, ContainerLifecycle,
    ContainerSummary, CreateSpec, DockerLike, ExecSpec, ExecState, HostPlatform, LiveContainers,
    RunningContainer,
};
use bytes::Bytes;
use fc_local_framing::{decode_streams, FramedOutput, FramingDecoder, OutputSink};
use fc_local_models::{Config, ExitStatus, InvocationResult, LocalError, PullPolicy};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub stop_timeout_secs: u64,
    pub exec_poll_interval: Duration,
    pub pull_policy: PullPolicy,
    pub platform: HostPlatform,
    /// Read output from the log endpoint instead of the attach stream.
    pub attach_via_logs: bool,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        let platform = HostPlatform::current();
        Self {
            stop_timeout_secs: config.invoke.stop_timeout_secs,
            exec_poll_interval: Duration::from_millis(config.invoke.exec_poll_interval_ms),
            pull_policy: config.docker.pull_policy,
            platform,
            attach_via_logs: platform == HostPlatform::Windows,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A process that ran to completion inside a container.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub container_id: String,
    pub entrypoint: String,
    pub exit: ExitStatus,
    pub output: FramedOutput,
}

impl ProcessOutcome {
    /// Only the exit status, for runs whose output is not framed.
    pub fn check_exit(&self) -> Result<(), LocalError> {
        self.exit.into_result(&self.entrypoint)
    }

    /// Kills win over whatever the process printed; a non-zero exit without
    /// any framing is reported as such rather than as a bare crash.
    pub fn into_result(self) -> Result<InvocationResult, LocalError> {
        if self.exit.is_signal_killed() {
            return Err(LocalError::SignalKilled {
                code: self.exit.code,
                oom_killed: self.exit.oom_killed,
            });
        }
        let success = self.exit.success();
        match self.output.into_result() {
            Err(LocalError::ProcessCrash { .. }) if !success => Err(LocalError::NonZeroExit {
                entrypoint: self.entrypoint,
                code: self.exit.code,
            }),
            other => other,
        }
    }
}

fn docker_err(e: anyhow::Error) -> LocalError {
    LocalError::DockerError {
        message: format!("{e:#}"),
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Creates, runs and tears down containers; every container it creates is
/// tracked in the shared live set until it stops.
pub struct ContainerManager {
    docker: Arc<dyn DockerLike>,
    live: Arc<LiveContainers>,
    settings: ManagerSettings,
}

impl ContainerManager {
    pub fn new(docker: Arc<dyn DockerLike>, live: Arc<LiveContainers>, settings: ManagerSettings) -> Self {
        Self {
            docker,
            live,
            settings,
        }
    }

    pub fn live(&self) -> &Arc<LiveContainers> {
        &self.live
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    #[instrument(skip(self))]
    pub async fn ensure_image(&self, image: &str) -> Result<(), LocalError> {
        let exists = self.docker.image_exists(image).await.map_err(docker_err)?;
        match (self.settings.pull_policy, exists) {
            (PullPolicy::Never, false) => Err(LocalError::ImageNotFound {
                image: image.to_string(),
            }),
            (PullPolicy::Never, true) | (PullPolicy::IfMissing, true) => {
                debug!("skip pulling image {}...", image);
                Ok(())
            }
            _ => {
                info!("pulling image {}, you can also use 'docker pull {}' to pull image by yourself.", image, image);
                self.docker.pull_image(image).await.map_err(docker_err)
            }
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    pub async fn create(&self, spec: CreateSpec) -> Result<RunningContainer, LocalError> {
        validate_mounts(self.settings.platform, &spec.mounts)?;
        let name = spec.name.clone();
        let id = self
            .docker
            .create(spec)
            .await
            .map_err(|e| translate_create_error(&e))?;
        self.live.insert(&id);
        info!(container_id = %id, container_name = %name, "container created");
        Ok(RunningContainer::new(id, name))
    }

    /// One-shot run: create, attach with the event on stdin, start, decode
    /// output until the process exits.
    #[instrument(skip(self, spec, event, decoder, cancel), fields(name = %spec.name))]
    pub async fn run(
        &self,
        spec: CreateSpec,
        event: Bytes,
        decoder: FramingDecoder,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, LocalError> {
        let container = self.create(spec).await?;
        let result = self.run_created(&container, event, decoder, cancel).await;
        if result.is_err() {
            self.discard(&container.id).await;
        }
        self.live.remove(&container.id);
        result
    }

    /// Force-removes a container that never ran to completion.
    async fn discard(&self, container_id: &str) {
        match self.docker.remove(container_id, true).await {
            Ok(()) => debug!(container_id = %container_id, "container removed"),
            Err(e) if is_gone(&e) => {}
            Err(e) => warn!(container_id = %container_id, "failed to remove container: {}", e),
        }
    }

    async fn run_created(
        &self,
        container: &RunningContainer,
        event: Bytes,
        decoder: FramingDecoder,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, LocalError> {
        let attached = self
            .docker
            .attach(&container.id, Some(event))
            .await
            .map_err(docker_err)?;

        // The wait request goes out on its first poll; start only after that
        // so a fast exit of an auto-removed container is not missed.
        let (registered_tx, registered_rx) = oneshot::channel();
        let mut waiter = {
            let docker = self.docker.clone();
            let id = container.id.clone();
            AbortOnDrop(tokio::spawn(async move {
                let mut wait = docker.wait(&id);
                let first = futures::poll!(&mut wait);
                let _ = registered_tx.send(());
                match first {
                    Poll::Ready(status) => status,
                    Poll::Pending => wait.await,
                }
            }))
        };
        let _ = registered_rx.await;

        self.docker.start(&container.id).await.map_err(docker_err)?;

        let streams = if self.settings.attach_via_logs {
            drop(attached);
            self.docker.logs(&container.id, 0).await.map_err(docker_err)?
        } else {
            attached
        };

        let output = decode_streams(streams, decoder, cancel).await;

        let exit = match (&mut waiter.0).await {
            Ok(Ok(status)) => status,
            // removed before the engine reported the exit; the framed output still decides
            Ok(Err(e)) if is_gone(&e) => {
                warn!(container_id = %container.id, "exit status lost: {}", e);
                ExitStatus::default()
            }
            Ok(Err(e)) => return Err(docker_err(e)),
            Err(e) => {
                return Err(LocalError::DockerError {
                    message: format!("waiting for container {} failed: {e}", container.id),
                })
            }
        };

        debug!(container_id = %container.id, code = exit.code, oom_killed = exit.oom_killed, "container exited");
        Ok(ProcessOutcome {
            container_id: container.id.clone(),
            entrypoint: container.name.clone(),
            exit,
            output,
        })
    }

    /// Creates and starts a long-lived container.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn start_server(&self, spec: CreateSpec) -> Result<RunningContainer, LocalError> {
        let container = self.create(spec).await?;
        if let Err(e) = self.docker.start(&container.id).await {
            self.discard(&container.id).await;
            self.live.remove(&container.id);
            return Err(docker_err(e));
        }
        info!(container_id = %container.id, "container started");
        Ok(container)
    }

    /// Follows a running container's log endpoint from now on, feeding `sink`.
    pub async fn follow_logs(
        &self,
        container_id: &str,
        sink: Box<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<FramedOutput>, LocalError> {
        let since = chrono::Utc::now().timestamp();
        let streams = self
            .docker
            .logs(container_id, since)
            .await
            .map_err(docker_err)?;
        Ok(tokio::spawn(decode_streams(
            streams,
            FramingDecoder::new(sink),
            cancel,
        )))
    }

    /// Runs a command in a started container and waits for it by polling the
    /// engine, since the end of the output stream is not a reliable signal.
    #[instrument(skip(self, spec, decoder, cancel))]
    pub async fn exec(
        &self,
        container_id: &str,
        spec: ExecSpec,
        decoder: FramingDecoder,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, LocalError> {
        debug!(cmd = ?spec.cmd, "docker exec");
        let session = self
            .docker
            .exec(container_id, spec)
            .await
            .map_err(docker_err)?;

        let output = decode_streams(session.output, decoder, cancel).await;
        let state = self.wait_exec(&session.exec_id).await?;

        Ok(ProcessOutcome {
            container_id: container_id.to_string(),
            entrypoint: state.entrypoint,
            exit: ExitStatus {
                code: state.exit_code.unwrap_or(-1),
                oom_killed: false,
            },
            output,
        })
    }

    async fn wait_exec(&self, exec_id: &str) -> Result<ExecState, LocalError> {
        loop {
            let state = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(docker_err)?;
            if !state.running {
                return Ok(state);
            }
            tokio::time::sleep(self.settings.exec_poll_interval).await;
        }
    }

    /// Stops a container. Already stopped or unknown containers are fine;
    /// the id leaves the live set either way.
    #[instrument(skip(self))]
    pub async fn stop(&self, container_id: &str) -> Result<(), LocalError> {
        let result = self
            .docker
            .stop(container_id, self.settings.stop_timeout_secs)
            .await;
        self.live.remove(container_id);
        match result {
            Ok(()) => {
                info!(container_id = %container_id, "container stopped");
                Ok(())
            }
            Err(e) if is_gone(&e) => {
                debug!(container_id = %container_id, "container already stopped: {}", e);
                Ok(())
            }
            Err(e) => {
                warn!(container_id = %container_id, "failed to stop container: {}", e);
                Err(docker_err(e))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn kill(&self, container_id: &str) -> Result<(), LocalError> {
        let result = self.docker.kill(container_id).await;
        self.live.remove(container_id);
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(docker_err(e)),
        }
    }

    /// Running containers carrying the deterministic name, warm ones first.
    pub async fn find_named(&self, base_name: &str) -> Result<Vec<ContainerSummary>, LocalError> {
        let mut found = self
            .docker
            .list_by_name(&warm_name(base_name))
            .await
            .map_err(docker_err)?;
        found.extend(
            self.docker
                .list_by_name(base_name)
                .await
                .map_err(docker_err)?,
        );
        found.retain(|c| {
            let running = c.is_running();
            if !running {
                debug!(container_id = %c.id, state = ?c.state, "skipping container that is not running");
            }
            running
        });
        Ok(found)
    }

    /// Looks up a reusable container, preferring one whose initializer already ran.
    #[instrument(skip(self))]
    pub async fn find_warm(&self, base_name: &str) -> Result<Option<RunningContainer>, LocalError> {
        let found = self
            .find_named(base_name)
            .await?
            .into_iter()
            .next()
            .map(|c| RunningContainer::new(c.id, c.name));
        if let Some(container) = &found {
            debug!(container_id = %container.id, lifecycle = ?container.lifecycle, "found reusable container");
        }
        Ok(found)
    }

    /// Cold to warm, recorded by renaming the container.
    #[instrument(skip(self, container), fields(container_id = %container.id))]
    pub async fn promote(&self, container: &mut RunningContainer) -> Result<(), LocalError> {
        if container.lifecycle == ContainerLifecycle::Warm {
            return Ok(());
        }
        let new_name = ContainerLifecycle::Warm.container_name(container.base_name());
        self.docker
            .rename(&container.id, &new_name)
            .await
            .map_err(docker_err)?;
        info!(from = %container.name, to = %new_name, "container promoted to warm");
        container.name = new_name;
        container.lifecycle = ContainerLifecycle::Warm;
        Ok(())
    }
}
