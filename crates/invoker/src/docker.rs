use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, KillContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::Docker;

use async_trait::async_trait;
use bytes::Bytes;
use fc_local_framing::{output_channel, OutputStreams, OutputWriters};
use fc_local_models::{ExitStatus, LocalError, MountSpec, PortPublish};
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Buffered chunks per output stream before the demux task applies backpressure.
const STREAM_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct CreateSpec {
    pub image: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub cmd: Vec<String>,
    /// Overrides the image entrypoint when set.
    pub entrypoint: Option<Vec<String>>,
    pub user: Option<String>,
    pub mounts: Vec<MountSpec>,
    pub ports: Vec<PortPublish>,
    /// `OpenStdin`, `StdinOnce` and `AttachStdin`, for one-shot runs fed through stdin.
    pub open_stdin: bool,
    pub tty: bool,
    pub auto_remove: bool,
    pub labels: Vec<(String, String)>,
}

impl Default for CreateSpec {
    fn default() -> Self {
        Self {
            image: "test:latest".to_string(),
            name: "test-container".to_string(),
            env: vec![],
            cmd: vec![],
            entrypoint: None,
            user: None,
            mounts: vec![],
            ports: vec![],
            open_stdin: false,
            tty: false,
            auto_remove: true,
            labels: vec![],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Written to the process and then half-closed.
    pub stdin: Option<Bytes>,
    pub working_dir: Option<String>,
}

pub struct ExecSession {
    pub exec_id: String,
    pub output: OutputStreams,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecState {
    pub running: bool,
    pub exit_code: Option<i64>,
    pub entrypoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: Option<String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.as_deref() == Some("running")
    }
}

/// Container engine capabilities the lifecycle manager relies on.
#[async_trait]
pub trait DockerLike: Send + Sync + 'static {
    async fn create(&self, spec: CreateSpec) -> anyhow::Result<String>; // returns container_id
    async fn start(&self, container_id: &str) -> anyhow::Result<()>;
    /// Attaches to a created container. `stdin` is written and the stream half-closed.
    async fn attach(&self, container_id: &str, stdin: Option<Bytes>) -> anyhow::Result<OutputStreams>;
    /// Follows the container log endpoint from `since` (unix seconds).
    async fn logs(&self, container_id: &str, since: i64) -> anyhow::Result<OutputStreams>;
    /// Resolves when the container's next exit happens.
    async fn wait(&self, container_id: &str) -> anyhow::Result<ExitStatus>;
    async fn exec(&self, container_id: &str, spec: ExecSpec) -> anyhow::Result<ExecSession>;
    async fn inspect_exec(&self, exec_id: &str) -> anyhow::Result<ExecState>;
    async fn stop(&self, container_id: &str, timeout_secs: u64) -> anyhow::Result<()>;
    async fn kill(&self, container_id: &str) -> anyhow::Result<()>;
    async fn remove(&self, container_id: &str, force: bool) -> anyhow::Result<()>;
    /// Containers, running or not, whose name is exactly `name`.
    async fn list_by_name(&self, name: &str) -> anyhow::Result<Vec<ContainerSummary>>;
    async fn rename(&self, container_id: &str, new_name: &str) -> anyhow::Result<()>;
    async fn image_exists(&self, image: &str) -> anyhow::Result<bool>;
    async fn pull_image(&self, image: &str) -> anyhow::Result<()>;
}

/// True for engine errors meaning the container is already stopped or gone.
pub fn is_gone(err: &anyhow::Error) -> bool {
    if let Some(BollardError::DockerResponseServerError { status_code, .. }) =
        err.downcast_ref::<BollardError>()
    {
        return *status_code == 304 || *status_code == 404;
    }
    let message = err.to_string().to_ascii_lowercase();
    message.contains("no such container")
        || message.contains("is not running")
        || message.contains("already stopped")
}

pub struct Invoker {
    docker: Docker,
}

impl Invoker {
    /// Connects using `host` when set, then `DOCKER_HOST`, then the local socket.
    pub fn new(host: &str) -> Result<Self, LocalError> {
        let docker_host = if host.is_empty() {
            std::env::var("DOCKER_HOST").ok()
        } else {
            Some(host.to_string())
        };

        let docker = match docker_host {
            Some(docker_host) if docker_host.starts_with("tcp://") => {
                Docker::connect_with_http(&docker_host, 120, bollard::API_DEFAULT_VERSION)
                    .map_err(|e| LocalError::DockerError {
                        message: format!("Failed to connect to Docker at {docker_host}: {e}"),
                    })?
            }
            Some(docker_host) if docker_host.starts_with("unix://") => {
                Docker::connect_with_unix(&docker_host, 120, bollard::API_DEFAULT_VERSION)
                    .map_err(|e| LocalError::DockerError {
                        message: format!("Failed to connect to Docker at {docker_host}: {e}"),
                    })?
            }
            _ => Docker::connect_with_local_defaults().map_err(|e| LocalError::DockerError {
                message: e.to_string(),
            })?,
        };

        Ok(Self { docker })
    }

    fn container_config(spec: &CreateSpec) -> Config<String> {
        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        let exposed_ports = spec
            .ports
            .iter()
            .map(|p| (p.exposed_key(), HashMap::new()))
            .collect::<HashMap<_, _>>();

        let port_bindings = spec
            .ports
            .iter()
            .map(|p| {
                (
                    p.exposed_key(),
                    Some(vec![PortBinding {
                        host_ip: Some(String::new()),
                        host_port: Some(p.host_port.to_string()),
                    }]),
                )
            })
            .collect::<HashMap<_, _>>();

        Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            entrypoint: spec.entrypoint.clone(),
            user: spec.user.clone(),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            stdin_once: Some(spec.open_stdin),
            attach_stdin: Some(spec.open_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            labels: Some(spec.labels.iter().cloned().collect()),
            host_config: Some(HostConfig {
                auto_remove: Some(spec.auto_remove),
                mounts: Some(mounts),
                port_bindings: if port_bindings.is_empty() {
                    None
                } else {
                    Some(port_bindings)
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Splits an engine log stream into the stdout and stderr channels.
fn forward_output<S>(stream: S, writers: OutputWriters)
where
    S: Stream<Item = Result<LogOutput, BollardError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        while let Some(item) = stream.next().await {
            let sent = match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    writers.stdout.send(message).await
                }
                Ok(LogOutput::StdErr { message }) => writers.stderr.send(message).await,
                Ok(LogOutput::StdIn { .. }) => Ok(()),
                Err(e) => {
                    warn!("Error reading container output: {}", e);
                    break;
                }
            };
            if sent.is_err() {
                debug!("output consumer dropped, stopping demux");
                break;
            }
        }
    });
}

#[async_trait]
impl DockerLike for Invoker {
    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    async fn create(&self, spec: CreateSpec) -> anyhow::Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), Self::container_config(&spec))
            .await?;

        for warning in &response.warnings {
            warn!("docker create warning: {}", warning);
        }
        info!("Created container: {} with ID: {}", spec.name, response.id);
        Ok(response.id)
    }

    async fn start(&self, container_id: &str) -> anyhow::Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn attach(&self, container_id: &str, stdin: Option<Bytes>) -> anyhow::Result<OutputStreams> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(stdin.is_some()),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(false),
            detach_keys: None,
        };
        let AttachContainerResults { output, mut input } =
            self.docker.attach_container(container_id, Some(options)).await?;

        if let Some(event) = stdin {
            tokio::spawn(async move {
                if let Err(e) = input.write_all(&event).await {
                    warn!("failed to write event to container stdin: {}", e);
                }
                if let Err(e) = input.shutdown().await {
                    debug!("stdin shutdown: {}", e);
                }
            });
        }

        let (writers, streams) = output_channel(STREAM_CAPACITY);
        forward_output(output, writers);
        Ok(streams)
    }

    async fn logs(&self, container_id: &str, since: i64) -> anyhow::Result<OutputStreams> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            since,
            ..Default::default()
        };
        let (writers, streams) = output_channel(STREAM_CAPACITY);
        forward_output(self.docker.logs(container_id, Some(options)), writers);
        Ok(streams)
    }

    async fn wait(&self, container_id: &str) -> anyhow::Result<ExitStatus> {
        let options = WaitContainerOptions {
            condition: "next-exit",
        };
        let mut stream = Box::pin(self.docker.wait_container(container_id, Some(options)));

        let code = match stream.next().await {
            Some(Ok(response)) => response.status_code,
            // non-zero exits surface as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(e.into()),
            None => anyhow::bail!("wait stream for container {container_id} ended without status"),
        };

        // Auto-removed containers may already be gone; the code alone still classifies kills.
        let oom_killed = match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(_) => false,
        };

        Ok(ExitStatus { code, oom_killed })
    }

    async fn exec(&self, container_id: &str, spec: ExecSpec) -> anyhow::Result<ExecSession> {
        let options = CreateExecOptions::<String> {
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            attach_stdin: Some(spec.stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            working_dir: spec.working_dir.clone(),
            ..Default::default()
        };
        let exec = self.docker.create_exec(container_id, options).await?;

        let started = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await?;

        let (writers, streams) = output_channel(STREAM_CAPACITY);
        match started {
            StartExecResults::Attached { output, mut input } => {
                if let Some(event) = spec.stdin {
                    tokio::spawn(async move {
                        if let Err(e) = input.write_all(&event).await {
                            warn!("failed to write event to exec stdin: {}", e);
                        }
                        if let Err(e) = input.shutdown().await {
                            debug!("exec stdin shutdown: {}", e);
                        }
                    });
                }
                forward_output(output, writers);
            }
            StartExecResults::Detached => {
                debug!(exec_id = %exec.id, "exec started detached, no output to read");
            }
        }

        Ok(ExecSession {
            exec_id: exec.id,
            output: streams,
        })
    }

    async fn inspect_exec(&self, exec_id: &str) -> anyhow::Result<ExecState> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        Ok(ExecState {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
            entrypoint: inspect
                .process_config
                .and_then(|p| p.entrypoint)
                .unwrap_or_default(),
        })
    }

    async fn stop(&self, container_id: &str, timeout_secs: u64) -> anyhow::Result<()> {
        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };
        self.docker
            .stop_container(container_id, Some(options))
            .await?;
        Ok(())
    }

    async fn kill(&self, container_id: &str) -> anyhow::Result<()> {
        self.docker
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str, force: bool) -> anyhow::Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await?;
        Ok(())
    }

    async fn list_by_name(&self, name: &str) -> anyhow::Result<Vec<ContainerSummary>> {
        // the engine's name filter is a regex over "/name"
        let filters = HashMap::from([("name".to_string(), vec![format!("^/{name}$")])]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(ContainerSummary {
                    id,
                    name,
                    state: c.state,
                })
            })
            .collect())
    }

    async fn rename(&self, container_id: &str, new_name: &str) -> anyhow::Result<()> {
        self.docker
            .rename_container(
                container_id,
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> anyhow::Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> anyhow::Result<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = Box::pin(self.docker.create_image(Some(options), None, None));

        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(error) = progress.error {
                anyhow::bail!("pulling {image} failed: {error}");
            }
            if let Some(status) = progress.status {
                debug!(
                    image = %image,
                    progress = progress.progress.as_deref().unwrap_or(""),
                    "{}", status
                );
            }
        }

        info!("Pulled image: {}", image);
        Ok(())
    }
}
